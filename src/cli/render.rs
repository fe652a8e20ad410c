use clap::Args;
use polyglot::{render, Dialect, Mode, RenderOptions};

#[derive(Args)]
pub struct RenderArgs {
    /// Comprehension to transform, e.g. "[x*x for x in range(10)]"
    #[arg(long)]
    pub code: String,
    /// Target backend: rust, ts, go, csharp, julia, or sql
    #[arg(long, default_value = "rust")]
    pub target: String,
    /// Request parallel emission (unsafe shapes fall back to sequential)
    #[arg(long)]
    pub parallel: bool,
    /// SQL dialect: sqlite or postgresql
    #[arg(long)]
    pub dialect: Option<String>,
    /// Julia lowering mode: loops or broadcast (heuristic when omitted)
    #[arg(long)]
    pub mode: Option<String>,
    /// Integer type for the Rust backend (default: i32)
    #[arg(long, value_name = "TYPE")]
    pub int_type: Option<String>,
    /// Enable Julia @inbounds (an explicit memory-safety trade-off)
    #[arg(long = "unsafe")]
    pub unchecked: bool,
    /// Thread-count hint recorded in Julia output
    #[arg(long)]
    pub threads: Option<u32>,
    /// Disable explanatory comments in generated code
    #[arg(long)]
    pub no_explain: bool,
    /// Name of the emitted function
    #[arg(long)]
    pub fn_name: Option<String>,
}

pub fn run(args: &RenderArgs) -> i32 {
    let mode = match args.mode.as_deref() {
        None => None,
        Some(name) => match Mode::from_name(name) {
            Some(mode) => Some(mode),
            None => {
                eprintln!("error: unknown mode '{}'; expected loops or broadcast", name);
                return 1;
            }
        },
    };
    let dialect = match args.dialect.as_deref() {
        None => None,
        Some(name) => match Dialect::from_name(name) {
            Some(dialect) => Some(dialect),
            None => {
                eprintln!(
                    "error: unknown dialect '{}'; expected sqlite or postgresql",
                    name
                );
                return 1;
            }
        },
    };

    let ir = super::parse_or_exit(&args.code);
    let options = RenderOptions {
        fn_name: args.fn_name.clone(),
        parallel: args.parallel.then_some(true),
        int_type: args.int_type.clone(),
        mode,
        unchecked: args.unchecked.then_some(true),
        explain: args.no_explain.then_some(false),
        threads: args.threads,
        dialect,
    };

    match render(&args.target, &ir, &options) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(err) => {
            eprintln!("error: {}", err);
            1
        }
    }
}
