//! Golden emission snapshots: small, byte-exact reference outputs.
//! Any unintended change in emitted text for these tuples is a
//! compatibility regression.

use polyglot::{parse_source, render, Dialect, RenderOptions};

fn emit(code: &str, target: &str, options: RenderOptions) -> String {
    let ir = parse_source(code).expect("valid code");
    render(target, &ir, &options).expect("render succeeds")
}

#[test]
fn rust_sequential_even_squares() {
    let out = emit(
        "[x*x for x in range(10) if x % 2 == 0]",
        "rust",
        RenderOptions::default(),
    );
    insta::assert_snapshot!(out, @r###"
pub fn program() -> Vec<i32> {
    (0..10)
        .filter(|&x| x % 2 == 0)
        .map(|x| x * x)
        .collect()
}
"###);
}

#[test]
fn sql_postgres_even_squares() {
    let out = emit(
        "[x*x for x in range(10) if x % 2 == 0]",
        "sql",
        RenderOptions {
            dialect: Some(Dialect::Postgresql),
            ..Default::default()
        },
    );
    insta::assert_snapshot!(out, @r###"
SELECT x * x
FROM generate_series(0, 9) AS x
WHERE x % 2 = 0
"###);
}

#[test]
fn julia_auto_broadcast_sum() {
    let out = emit("sum(x*x for x in range(100))", "julia", RenderOptions::default());
    insta::assert_snapshot!(out, @r###"
# NOTE: auto-selected broadcast mode for small N=100

function program()::Int
    x = 0:99
    return sum(x .* x)
end
"###);
}

#[test]
fn ts_sequential_even_squares() {
    let out = emit(
        "[x*x for x in range(10) if x % 2 == 0]",
        "ts",
        RenderOptions::default(),
    );
    insta::assert_snapshot!(out, @r###"
function program(): number[] {
    const result = Array.from({length: 10}, (_, i) => i)
        .filter(x => x % 2 === 0)
        .map(x => x * x);
    return result;
}
"###);
}
