//! C# backend: LINQ method chains, PLINQ (`AsParallel`) when the plan
//! allows it, query syntax for nested generators.

use crate::classify::Plan;
use crate::codegen::exprs::{print_expr, ExprStyle};
use crate::codegen::{RenderError, RenderOptions, Writer};
use crate::ir::{Comprehension, Expr, Generator, ReduceOp, ResultKind, Source};

struct CsStyle;

impl ExprStyle for CsStyle {
    fn pow(&self, base: &str, exponent: &str) -> String {
        format!("(int)Math.Pow({}, {})", base, exponent)
    }
}

pub(crate) fn emit(
    ir: &Comprehension,
    plan: &Plan,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    super::validate(ir)?;
    let class_name = options.fn_name.as_deref().unwrap_or("Program");
    let style = CsStyle;

    let params = ir
        .named_sources()
        .iter()
        .map(|name| format!("IEnumerable<int> {}", name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut w = Writer::new();
    w.line("using System;");
    w.line("using System.Collections.Generic;");
    w.line("using System.Linq;");
    w.blank();
    w.line(format!("public static class {}", class_name));
    w.line("{");
    w.indent();
    w.line(format!(
        "public static {} Execute({})",
        return_type(ir),
        params
    ));
    w.line("{");
    w.indent();

    match ir.generators.as_slice() {
        [gen] => emit_chain(&mut w, ir, plan, gen, &style),
        _ => emit_query(&mut w, ir, &style),
    }

    w.dedent();
    w.line("}");
    w.dedent();
    w.line("}");
    Ok(w.finish())
}

fn type_of(expr: &Expr) -> String {
    if super::expr_is_boolean(expr) {
        return "bool".to_string();
    }
    if let Expr::Tuple(items) = expr {
        let parts: Vec<String> = items.iter().map(type_of).collect();
        return format!("({})", parts.join(", "));
    }
    "int".to_string()
}

fn return_type(ir: &Comprehension) -> String {
    match &ir.kind {
        ResultKind::Reduce(op) if op.is_boolean() => "bool".to_string(),
        ResultKind::Reduce(_) => "int".to_string(),
        ResultKind::List => format!("List<{}>", type_of(&ir.element)),
        ResultKind::Set => format!("HashSet<{}>", type_of(&ir.element)),
        ResultKind::Dict => {
            let key = ir.key.as_ref().expect("validated dict key");
            format!(
                "Dictionary<{}, {}>",
                type_of(key),
                type_of(&ir.element)
            )
        }
    }
}

fn source_expr(gen: &Generator) -> String {
    match &gen.source {
        Source::Range { start, stop, step } => {
            if *step == 1 {
                format!("Enumerable.Range({}, {})", start, (stop - start).max(0))
            } else {
                let count = gen.source.range_len().expect("literal range");
                format!(
                    "Enumerable.Range(0, {}).Select(i => {} + i * {})",
                    count, start, step
                )
            }
        }
        Source::Named(name) => name.clone(),
    }
}

/// Single-generator emission: one LINQ chain. The parallel form defers
/// ordering and work-stealing to the PLINQ runtime; `AsOrdered` is added
/// exactly where the merge strategy demands encounter order (lists, and
/// dicts whose duplicate keys must resolve as in sequential iteration).
fn emit_chain(w: &mut Writer, ir: &Comprehension, plan: &Plan, gen: &Generator, style: &CsStyle) {
    let elem = print_expr(&ir.element, style);
    let identity_elem = ir.element == Expr::Var(gen.var.clone());

    let mut pieces: Vec<String> = Vec::new();
    if plan.safe {
        pieces.push(".AsParallel()".to_string());
        if matches!(ir.kind, ResultKind::List | ResultKind::Dict) {
            pieces.push(".AsOrdered()".to_string());
        }
    }

    for filter in &gen.filters {
        pieces.push(format!(".Where({} => {})", gen.var, print_expr(filter, style)));
    }

    match &ir.kind {
        ResultKind::List => {
            if !identity_elem {
                pieces.push(format!(".Select({} => {})", gen.var, elem));
            }
            pieces.push(".ToList()".to_string());
        }
        ResultKind::Set => {
            if !identity_elem {
                pieces.push(format!(".Select({} => {})", gen.var, elem));
            }
            pieces.push(".ToHashSet()".to_string());
        }
        ResultKind::Dict => {
            let key = print_expr(ir.key.as_ref().expect("validated dict key"), style);
            // Group-then-last gives last-write-wins on duplicate keys in
            // both the sequential and the ordered-parallel query.
            pieces.push(format!(
                ".GroupBy({} => {}, {} => {})",
                gen.var, key, gen.var, elem
            ));
            pieces.push(".ToDictionary(g => g.Key, g => g.Last())".to_string());
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum => {
                if identity_elem {
                    pieces.push(".Sum()".to_string());
                } else {
                    pieces.push(format!(".Sum({} => {})", gen.var, elem));
                }
            }
            ReduceOp::Count => pieces.push(".Count()".to_string()),
            ReduceOp::Max => {
                if !identity_elem {
                    pieces.push(format!(".Select({} => {})", gen.var, elem));
                }
                pieces.push(".DefaultIfEmpty(0).Max()".to_string());
            }
            ReduceOp::Min => {
                if !identity_elem {
                    pieces.push(format!(".Select({} => {})", gen.var, elem));
                }
                pieces.push(".DefaultIfEmpty(0).Min()".to_string());
            }
            ReduceOp::Any => pieces.push(format!(".Any({} => {})", gen.var, elem)),
            ReduceOp::All => pieces.push(format!(".All({} => {})", gen.var, elem)),
        },
    }

    w.line(format!("return {}", source_expr(gen)));
    w.indent();
    let last = pieces.len() - 1;
    for (i, piece) in pieces.iter().enumerate() {
        if i == last {
            w.line(format!("{};", piece));
        } else {
            w.line(piece);
        }
    }
    w.dedent();
}

/// Nested generators lower to LINQ query syntax, which expresses the
/// dependent cross-product directly. These shapes are never parallel.
fn emit_query(w: &mut Writer, ir: &Comprehension, style: &CsStyle) {
    w.line("var query =");
    w.indent();
    for gen in &ir.generators {
        w.line(format!("from {} in {}", gen.var, source_expr(gen)));
        for filter in &gen.filters {
            w.line(format!("where {}", print_expr(filter, style)));
        }
    }

    let elem = print_expr(&ir.element, style);
    match &ir.kind {
        ResultKind::Dict => {
            let key = print_expr(ir.key.as_ref().expect("validated dict key"), style);
            w.line(format!("select ({}, {});", key, elem));
        }
        _ => w.line(format!("select {};", elem)),
    }
    w.dedent();

    match &ir.kind {
        ResultKind::List => w.line("return query.ToList();"),
        ResultKind::Set => w.line("return query.ToHashSet();"),
        ResultKind::Dict => {
            w.line("return query");
            w.indent();
            w.line(".GroupBy(t => t.Item1, t => t.Item2)");
            w.line(".ToDictionary(g => g.Key, g => g.Last());");
            w.dedent();
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum => w.line("return query.Sum();"),
            ReduceOp::Count => w.line("return query.Count();"),
            ReduceOp::Max => w.line("return query.DefaultIfEmpty(0).Max();"),
            ReduceOp::Min => w.line("return query.DefaultIfEmpty(0).Min();"),
            ReduceOp::Any => w.line("return query.Any(v => v);"),
            ReduceOp::All => w.line("return query.All(v => v);"),
        },
    }
}
