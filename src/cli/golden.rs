use std::fs;
use std::path::Path;

use rayon::prelude::*;

use polyglot::codegen::backend::ALL;
use polyglot::{render, Backend, RenderOptions};

/// The reference corpus. Checked-in outputs are byte-exact compatibility
/// contracts: regenerate and diff to catch unintended emission changes.
const CASES: &[(&str, &str)] = &[
    ("list_even_squares", "[x*x for x in range(10) if x % 2 == 0]"),
    ("dict_odd_squares", "{i: i*i for i in range(1, 6) if i % 2 == 1}"),
    ("set_mod_classes", "{x % 3 for x in range(20)}"),
    ("sum_even_squares", "sum(i*i for i in range(1, 100) if i % 2 == 0)"),
    ("max_products", "max(i*j for i in range(1, 5) for j in range(1, 4))"),
    ("any_large_square", "any(x*x > 50 for x in range(10))"),
    ("all_nonnegative", "all(x >= 0 for x in range(10))"),
    ("count_multiples", "count(x for x in range(100) if x % 7 == 0)"),
    ("nested_pairs", "[(i, j) for i in range(4) for j in range(4) if i != j]"),
    ("stepped_squares", "[i*i for i in range(0, 20, 3)]"),
    ("bounded_window", "[x for x in range(100) if 10 <= x < 20]"),
];

pub fn run(out: &Path) -> i32 {
    if let Err(err) = fs::create_dir_all(out) {
        eprintln!("error: cannot create '{}': {}", out.display(), err);
        return 1;
    }

    let jobs: Vec<(&str, &str, Backend)> = CASES
        .iter()
        .flat_map(|(name, code)| ALL.iter().map(move |backend| (*name, *code, *backend)))
        .collect();

    let outcomes: Vec<Result<usize, String>> = jobs
        .par_iter()
        .map(|(name, code, backend)| write_case(out, name, code, *backend))
        .collect();

    let mut written = 0;
    let mut failed = 0;
    for outcome in outcomes {
        match outcome {
            Ok(count) => written += count,
            Err(message) => {
                eprintln!("error: {}", message);
                failed += 1;
            }
        }
    }

    println!("wrote {} golden files to {}", written, out.display());
    if failed > 0 {
        1
    } else {
        0
    }
}

/// One case × backend: the sequential emission and the parallel-requested
/// emission (identical text whenever the shape is unsafe).
fn write_case(out: &Path, name: &str, code: &str, backend: Backend) -> Result<usize, String> {
    let ir = polyglot::parse_source(code)
        .map_err(|_| format!("golden case '{}' failed to parse", name))?;

    let sequential = render(backend.name(), &ir, &RenderOptions::default())
        .map_err(|err| format!("{}/{}: {}", name, backend.name(), err))?;
    let seq_path = out.join(format!("{}.{}.txt", name, backend.name()));
    fs::write(&seq_path, &sequential)
        .map_err(|err| format!("cannot write '{}': {}", seq_path.display(), err))?;

    let parallel_options = RenderOptions {
        parallel: Some(true),
        ..Default::default()
    };
    let parallel = render(backend.name(), &ir, &parallel_options)
        .map_err(|err| format!("{}/{}: {}", name, backend.name(), err))?;
    let par_path = out.join(format!("{}.{}.par.txt", name, backend.name()));
    fs::write(&par_path, &parallel)
        .map_err(|err| format!("cannot write '{}': {}", par_path.display(), err))?;

    Ok(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_parses_and_renders_everywhere() {
        for (name, code) in CASES {
            let ir = polyglot::parse_source(code)
                .unwrap_or_else(|e| panic!("case '{}' failed to parse: {:?}", name, e));
            for backend in ALL {
                render(backend.name(), &ir, &RenderOptions::default())
                    .unwrap_or_else(|e| panic!("case '{}' on {}: {}", name, backend.name(), e));
            }
        }
    }

    #[test]
    fn golden_run_writes_every_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert_eq!(run(dir.path()), 0);
        let count = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, CASES.len() * ALL.len() * 2);
    }

    #[test]
    fn golden_files_are_stable_across_runs() {
        let first = tempfile::tempdir().expect("temp dir");
        let second = tempfile::tempdir().expect("temp dir");
        assert_eq!(run(first.path()), 0);
        assert_eq!(run(second.path()), 0);

        let probe = "sum_even_squares.julia.par.txt";
        let a = fs::read_to_string(first.path().join(probe)).unwrap();
        let b = fs::read_to_string(second.path().join(probe)).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("parts[threadid()]"));
    }
}
