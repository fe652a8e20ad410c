use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

mod cli;

#[derive(Parser)]
#[command(
    name = "pcs",
    version,
    about = "Polyglot comprehension sampler: one IR, six target languages"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a comprehension for one target language
    Render(cli::render::RenderArgs),
    /// Parse a comprehension and print its IR as JSON
    Ir {
        /// Comprehension to parse
        #[arg(long)]
        code: String,
    },
    /// List backends and the options each accepts
    Targets,
    /// Regenerate the golden output corpus across all targets
    Golden {
        /// Output directory
        #[arg(long, default_value = "golden")]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let status = match cli.command {
        Command::Render(args) => cli::render::run(&args),
        Command::Ir { code } => cli::ir::run(&code),
        Command::Targets => cli::targets::run(),
        Command::Golden { out } => cli::golden::run(&out),
    };
    process::exit(status);
}
