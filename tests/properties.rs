//! Cross-backend properties of the renderer contract: option filtering,
//! fallback identity, determinism, and the documented scenarios.

use polyglot::codegen::backend::ALL;
use polyglot::{classify, parse_source, render, Dialect, Mode, Reason, RenderError, RenderOptions};

const SHAPES: &[&str] = &[
    "[x*x for x in range(10) if x % 2 == 0]",
    "{x % 3 for x in range(20)}",
    "{i: i*i for i in range(1, 6)}",
    "sum(i*i for i in range(100))",
    "count(i for i in range(50) if i % 3 == 0)",
    "max(i*j for i in range(1, 5) for j in range(1, 4))",
    "min(x*x for x in range(1, 6))",
    "any(x % 2 == 1 for x in range(1, 10))",
    "all(x % 2 == 0 for x in range(2, 10))",
    "[x + 1 for x in data]",
    "[(i, j) for i in range(4) for j in range(4) if i != j]",
];

/// An intentionally over-full option set no single backend accepts whole.
fn over_full_options() -> RenderOptions {
    RenderOptions {
        fn_name: Some("sample".into()),
        parallel: Some(true),
        int_type: Some("i64".into()),
        mode: Some(Mode::Loops),
        unchecked: Some(true),
        explain: Some(true),
        threads: Some(8),
        dialect: Some(Dialect::Postgresql),
    }
}

#[test]
fn adapter_tolerates_over_full_option_sets() {
    let options = over_full_options();
    for code in SHAPES {
        let ir = parse_source(code).expect("valid shape");
        for backend in ALL {
            let out = render(backend.name(), &ir, &options)
                .unwrap_or_else(|e| panic!("{} on '{}': {}", backend.name(), code, e));
            assert!(!out.is_empty(), "{} produced empty output", backend.name());
        }
    }
}

#[test]
fn adapter_raises_only_for_unknown_targets() {
    let ir = parse_source(SHAPES[0]).unwrap();
    match render("cobol", &ir, &RenderOptions::default()) {
        Err(RenderError::UnknownBackend { target }) => assert_eq!(target, "cobol"),
        other => panic!("expected UnknownBackend, got {:?}", other),
    }
    for backend in ALL {
        assert!(render(backend.name(), &ir, &RenderOptions::default()).is_ok());
    }
}

#[test]
fn rendering_is_deterministic() {
    let options = over_full_options();
    for code in SHAPES {
        let ir = parse_source(code).expect("valid shape");
        for backend in ALL {
            let first = render(backend.name(), &ir, &options).unwrap();
            let second = render(backend.name(), &ir, &options).unwrap();
            assert_eq!(first, second, "{} emission drifted for '{}'", backend.name(), code);
        }
    }
}

/// An unsafe shape must degrade silently and completely: requesting
/// parallel changes nothing, not even a comment.
#[test]
fn fallback_identity_for_nested_generators() {
    let code = "[(i, j) for i in range(1000) for j in range(1000) if i*j > 500]";
    let ir = parse_source(code).unwrap();
    assert_eq!(classify(&ir, true).reason, Reason::NestedGenerators);

    let parallel = RenderOptions {
        parallel: Some(true),
        ..Default::default()
    };
    for backend in ALL {
        let with_flag = render(backend.name(), &ir, &parallel).unwrap();
        let without = render(backend.name(), &ir, &RenderOptions::default()).unwrap();
        assert_eq!(with_flag, without, "{} leaked the parallel request", backend.name());
    }
}

#[test]
fn fallback_identity_for_opaque_sources() {
    let ir = parse_source("[x + 1 for x in data]").unwrap();
    assert_eq!(classify(&ir, true).reason, Reason::OpaqueSource);

    let parallel = RenderOptions {
        parallel: Some(true),
        ..Default::default()
    };
    for backend in ALL {
        let with_flag = render(backend.name(), &ir, &parallel).unwrap();
        let without = render(backend.name(), &ir, &RenderOptions::default()).unwrap();
        assert_eq!(with_flag, without, "{} leaked the parallel request", backend.name());
    }
}

/// Safe shapes, by contrast, must actually exploit the plan everywhere a
/// backend has real concurrency to offer.
#[test]
fn safe_shapes_change_emission_for_concurrent_backends() {
    let ir = parse_source("sum(i*i for i in range(1000))").unwrap();
    let parallel = RenderOptions {
        parallel: Some(true),
        mode: Some(Mode::Loops),
        ..Default::default()
    };
    let sequential = RenderOptions {
        mode: Some(Mode::Loops),
        ..Default::default()
    };
    for backend in ALL {
        let with_flag = render(backend.name(), &ir, &parallel).unwrap();
        let without = render(backend.name(), &ir, &sequential).unwrap();
        if backend.name() == "sql" {
            // No user-visible concurrency in the declarative backend
            assert_eq!(with_flag, without);
        } else {
            assert_ne!(with_flag, without, "{} ignored a safe plan", backend.name());
        }
    }
}

#[test]
fn scenario_even_squares_rust_parallel() {
    let ir = parse_source("[x*x for x in range(10) if x % 2 == 0]").unwrap();
    let plan = classify(&ir, true);
    assert!(plan.safe);
    assert_eq!(plan.reason, Reason::SingleRangeGenerator);

    let out = render(
        "rust",
        &ir,
        &RenderOptions {
            parallel: Some(true),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(out.contains("(0..10)"));
    assert!(out.contains(".into_par_iter()"));
    assert!(out.contains(".filter(|&x| x % 2 == 0)"));
    assert!(out.contains(".map(|x| x * x)"));
    assert!(out.contains(".collect()"));
}

#[test]
fn scenario_sum_of_even_squares_julia_loops() {
    let ir = parse_source("sum(i*i for i in range(1, 1000000) if i % 2 == 0)").unwrap();
    let out = render(
        "julia",
        &ir,
        &RenderOptions {
            parallel: Some(true),
            mode: Some(Mode::Loops),
            ..Default::default()
        },
    )
    .unwrap();
    // Per-thread accumulation over the evens, one serial fold at the end
    assert!(out.contains("parts = fill(0, nthreads())"));
    assert!(out.contains("@threads :static for i in 1:999999"));
    assert!(out.contains("parts[threadid()] += i * i"));
    assert!(out.contains("return sum(parts)"));
}

#[test]
fn scenario_nested_pairs_go_stays_sequential() {
    let ir = parse_source("[(i, j) for i in range(1000) for j in range(1000) if i*j > 500]").unwrap();
    let plan = classify(&ir, true);
    assert!(!plan.safe);
    assert_eq!(plan.reason, Reason::NestedGenerators);

    let out = render(
        "go",
        &ir,
        &RenderOptions {
            parallel: Some(true),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(out.contains("for i := 0; i < 1000; i += 1 {"));
    assert!(out.contains("for j := 0; j < 1000; j += 1 {"));
    assert!(!out.contains("go func"), "no worker pool for an unsafe shape");
    assert!(!out.contains("sync.WaitGroup"));
    assert!(!out.contains("chan "));
}

#[test]
fn one_ir_renders_to_six_distinct_targets() {
    let ir = parse_source("{i: i*i for i in range(1, 6) if i % 2 == 1}").unwrap();
    let mut outputs = Vec::new();
    for backend in ALL {
        outputs.push(render(backend.name(), &ir, &RenderOptions::default()).unwrap());
    }
    for (i, a) in outputs.iter().enumerate() {
        for b in outputs.iter().skip(i + 1) {
            assert_ne!(a, b, "two backends emitted identical text");
        }
    }
}
