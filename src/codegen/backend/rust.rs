//! Rust backend: iterator chains, Rayon when the plan allows it.

use crate::classify::Plan;
use crate::codegen::exprs::{print_expr, ExprStyle};
use crate::codegen::shard::Accumulator;
use crate::codegen::{RenderError, RenderOptions, Writer};
use crate::ir::{Comprehension, Expr, Generator, ReduceOp, ResultKind, Source};

struct RustStyle;

impl ExprStyle for RustStyle {
    fn pow(&self, base: &str, exponent: &str) -> String {
        if exponent.chars().all(|c| c.is_ascii_digit()) {
            format!("{}.pow({})", base, exponent)
        } else {
            format!("{}.pow({} as u32)", base, exponent)
        }
    }

    // Method-call pow still needs a grouped receiver: `(x + 1).pow(2)`.
    fn pow_is_call(&self) -> bool {
        false
    }
}

pub(crate) fn emit(
    ir: &Comprehension,
    plan: &Plan,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    super::validate(ir)?;
    let fn_name = options.fn_name.as_deref().unwrap_or("program");
    let int_type = options.int_type.as_deref().unwrap_or("i32");
    let style = RustStyle;

    let mut w = Writer::new();

    let mut imports: Vec<String> = Vec::new();
    match ir.kind {
        ResultKind::Set => imports.push("use std::collections::HashSet;".into()),
        ResultKind::Dict => imports.push("use std::collections::HashMap;".into()),
        _ => {}
    }
    if plan.safe {
        imports.push("use rayon::prelude::*;".into());
    }
    if !imports.is_empty() {
        for import in &imports {
            w.line(import);
        }
        w.blank();
    }

    let params = ir
        .named_sources()
        .iter()
        .map(|name| format!("{}: &[{}]", name, int_type))
        .collect::<Vec<_>>()
        .join(", ");
    w.line(format!(
        "pub fn {}({}) -> {} {{",
        fn_name,
        params,
        return_type(ir, int_type)
    ));
    w.indent();

    match ir.generators.as_slice() {
        [gen] => emit_chain(&mut w, ir, plan, gen, int_type, &style),
        _ => emit_loops(&mut w, ir, int_type, &style),
    }

    w.dedent();
    w.line("}");
    Ok(w.finish())
}

fn type_of(expr: &Expr, int_type: &str) -> String {
    if super::expr_is_boolean(expr) {
        return "bool".to_string();
    }
    if let Expr::Tuple(items) = expr {
        let parts: Vec<String> = items.iter().map(|e| type_of(e, int_type)).collect();
        return format!("({})", parts.join(", "));
    }
    int_type.to_string()
}

fn return_type(ir: &Comprehension, int_type: &str) -> String {
    match &ir.kind {
        ResultKind::Reduce(op) if op.is_boolean() => "bool".to_string(),
        ResultKind::Reduce(_) => int_type.to_string(),
        ResultKind::List => format!("Vec<{}>", type_of(&ir.element, int_type)),
        ResultKind::Set => format!("HashSet<{}>", type_of(&ir.element, int_type)),
        ResultKind::Dict => {
            let key = ir.key.as_ref().expect("validated dict key");
            format!(
                "HashMap<{}, {}>",
                type_of(key, int_type),
                type_of(&ir.element, int_type)
            )
        }
    }
}

/// Single-generator emission: one iterator chain, parallelized by
/// swapping the source for `into_par_iter()` when the plan is safe.
fn emit_chain(
    w: &mut Writer,
    ir: &Comprehension,
    plan: &Plan,
    gen: &Generator,
    int_type: &str,
    style: &RustStyle,
) {
    let mut pieces: Vec<Vec<String>> = Vec::new();

    let head = match &gen.source {
        Source::Range { start, stop, step } => {
            if plan.safe {
                pieces.push(vec![".into_par_iter()".to_string()]);
            }
            if *step != 1 {
                pieces.push(vec![format!(".step_by({})", step)]);
            }
            format!("({}..{})", start, stop)
        }
        Source::Named(name) => format!("{}.iter().copied()", name),
    };

    for filter in &gen.filters {
        pieces.push(vec![format!(
            ".filter(|&{}| {})",
            gen.var,
            print_expr(filter, style)
        )]);
    }

    let elem = print_expr(&ir.element, style);
    let identity_elem = ir.element == Expr::Var(gen.var.clone());

    match &ir.kind {
        ResultKind::List | ResultKind::Set => {
            if !identity_elem {
                pieces.push(vec![format!(".map(|{}| {})", gen.var, elem)]);
            }
            pieces.push(vec![".collect()".to_string()]);
        }
        ResultKind::Dict => {
            let key = print_expr(ir.key.as_ref().expect("validated dict key"), style);
            if plan.safe {
                // Per-worker map shards folded locally, merged pairwise in
                // encounter order so later chunks overwrite earlier ones.
                pieces.push(vec![
                    format!(".fold(HashMap::new, |mut acc, {}| {{", gen.var),
                    format!("    acc.insert({}, {});", key, elem),
                    "    acc".to_string(),
                    "})".to_string(),
                ]);
                pieces.push(vec![
                    ".reduce(HashMap::new, |mut merged, shard| {".to_string(),
                    "    merged.extend(shard);".to_string(),
                    "    merged".to_string(),
                    "})".to_string(),
                ]);
            } else {
                pieces.push(vec![format!(".map(|{}| ({}, {}))", gen.var, key, elem)]);
                pieces.push(vec![".collect()".to_string()]);
            }
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum => {
                if !identity_elem {
                    pieces.push(vec![format!(".map(|{}| {})", gen.var, elem)]);
                }
                pieces.push(vec![".sum()".to_string()]);
            }
            ReduceOp::Count => {
                pieces.push(vec![format!(".count() as {}", int_type)]);
            }
            ReduceOp::Max => {
                if !identity_elem {
                    pieces.push(vec![format!(".map(|{}| {})", gen.var, elem)]);
                }
                pieces.push(vec![".max().unwrap_or(0)".to_string()]);
            }
            ReduceOp::Min => {
                if !identity_elem {
                    pieces.push(vec![format!(".map(|{}| {})", gen.var, elem)]);
                }
                pieces.push(vec![".min().unwrap_or(0)".to_string()]);
            }
            ReduceOp::Any => {
                pieces.push(vec![format!(".any(|{}| {})", gen.var, elem)]);
            }
            ReduceOp::All => {
                pieces.push(vec![format!(".all(|{}| {})", gen.var, elem)]);
            }
        },
    }

    w.line(head);
    w.indent();
    for piece in pieces {
        for line in piece {
            w.line(line);
        }
    }
    w.dedent();
}

/// Nested-generator fallback: plain sequential loops. Shapes that reach
/// here are never parallel, so this is the only emission for them.
fn emit_loops(w: &mut Writer, ir: &Comprehension, int_type: &str, style: &RustStyle) {
    let accumulator = Accumulator::of(ir);
    let needs_label = accumulator.short_circuits_on().is_some();

    let init = match &ir.kind {
        ResultKind::List => "let mut result = Vec::new();".to_string(),
        ResultKind::Set => "let mut result = HashSet::new();".to_string(),
        ResultKind::Dict => "let mut result = HashMap::new();".to_string(),
        ResultKind::Reduce(op) => format!("let mut result = {};", fold_identity(*op, int_type)),
    };
    w.line(init);

    for (i, gen) in ir.generators.iter().enumerate() {
        let mut header = match &gen.source {
            Source::Range { start, stop, step } => {
                if *step == 1 {
                    format!("for {} in {}..{} {{", gen.var, start, stop)
                } else {
                    format!("for {} in ({}..{}).step_by({}) {{", gen.var, start, stop, step)
                }
            }
            Source::Named(name) => {
                format!("for {} in {}.iter().copied() {{", gen.var, name)
            }
        };
        if i == 0 && needs_label {
            header = format!("'search: {}", header);
        }
        w.line(header);
        w.indent();
        for filter in &gen.filters {
            w.line(format!("if !({}) {{", print_expr(filter, style)));
            w.indent();
            w.line("continue;");
            w.dedent();
            w.line("}");
        }
    }

    let elem = print_expr(&ir.element, style);
    match &ir.kind {
        ResultKind::List => w.line(format!("result.push({});", elem)),
        ResultKind::Set => {
            w.line(format!("result.insert({});", elem));
        }
        ResultKind::Dict => {
            let key = print_expr(ir.key.as_ref().expect("validated dict key"), style);
            w.line(format!("result.insert({}, {});", key, elem));
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum => w.line(format!("result += {};", elem)),
            ReduceOp::Count => w.line("result += 1;"),
            ReduceOp::Max => w.line(format!("result = result.max({});", elem)),
            ReduceOp::Min => w.line(format!("result = result.min({});", elem)),
            ReduceOp::Any => {
                w.line(format!("if {} {{", elem));
                w.indent();
                w.line("result = true;");
                w.line("break 'search;");
                w.dedent();
                w.line("}");
            }
            ReduceOp::All => {
                w.line(format!("if !({}) {{", elem));
                w.indent();
                w.line("result = false;");
                w.line("break 'search;");
                w.dedent();
                w.line("}");
            }
        },
    }

    for _ in &ir.generators {
        w.dedent();
        w.line("}");
    }
    w.line("result");
}

fn fold_identity(op: ReduceOp, int_type: &str) -> String {
    match op {
        ReduceOp::Sum | ReduceOp::Count => "0".to_string(),
        ReduceOp::Max => format!("{}::MIN", int_type),
        ReduceOp::Min => format!("{}::MAX", int_type),
        ReduceOp::Any => "false".to_string(),
        ReduceOp::All => "true".to_string(),
    }
}
