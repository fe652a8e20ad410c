//! SQL backend: predicates push down into one WHERE conjunction,
//! reductions become aggregates, ranges become `generate_series`
//! (PostgreSQL) or recursive CTEs (SQLite). There is no user-visible
//! concurrency: the safety plan is accepted and ignored, so no separate
//! fallback path exists.

use crate::classify::Plan;
use crate::codegen::exprs::{print_expr, ExprStyle};
use crate::codegen::{Dialect, RenderError, RenderOptions, Writer};
use crate::ir::{BinOp, Comprehension, Expr, Generator, ReduceOp, ResultKind, Source};

struct SqlStyle;

impl ExprStyle for SqlStyle {
    fn bool_lit(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn binary(&self, op: BinOp) -> &'static str {
        match op {
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::And => "AND",
            BinOp::Or => "OR",
            other => crate::codegen::exprs::default_binary(other),
        }
    }

    fn not_op(&self) -> &'static str {
        "NOT "
    }

    fn pow(&self, base: &str, exponent: &str) -> String {
        format!("POWER({}, {})", base, exponent)
    }
}

pub(crate) fn emit(
    ir: &Comprehension,
    plan: &Plan,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    super::validate(ir)?;
    // The declarative backend has no notion of explicit parallelism.
    let _ = plan;
    let dialect = options.dialect.unwrap_or(Dialect::Sqlite);
    let explain = options.explain.unwrap_or(false);
    let style = SqlStyle;

    let filters: Vec<String> = ir
        .generators
        .iter()
        .flat_map(|gen| gen.filters.iter())
        .map(|filter| print_expr(filter, &style))
        .collect();

    let mut w = Writer::new();

    if explain {
        if !filters.is_empty() {
            w.line("-- NOTE: predicates compiled to a WHERE conjunction (predicate pushdown)");
        }
        if let ResultKind::Reduce(op) = ir.kind {
            w.line(format!(
                "-- NOTE: reduction compiled to the {} aggregate form",
                op.name()
            ));
        }
    }

    // EXISTS forms fold the element predicate into the subquery's WHERE.
    let exists_form = matches!(
        ir.kind,
        ResultKind::Reduce(ReduceOp::Any) | ResultKind::Reduce(ReduceOp::All)
    );

    if matches!(dialect, Dialect::Sqlite) {
        emit_sqlite_ctes(&mut w, ir);
    }

    let mut where_clauses = filters;
    if exists_form {
        let elem = print_expr(&ir.element, &style);
        match ir.kind {
            ResultKind::Reduce(ReduceOp::Any) => {
                w.line("SELECT EXISTS(");
                where_clauses.push(elem);
            }
            ResultKind::Reduce(ReduceOp::All) => {
                w.line("SELECT NOT EXISTS(");
                where_clauses.push(format!("NOT ({})", elem));
            }
            _ => unreachable!("exists_form is any/all only"),
        }
        w.indent();
        w.line("SELECT 1");
    } else {
        w.line(select_clause(ir, &style)?);
    }

    emit_from(&mut w, ir, dialect);

    if !where_clauses.is_empty() {
        w.line(format!("WHERE {}", where_clauses.join(" AND ")));
    }

    if exists_form {
        w.dedent();
        w.line(")");
    }

    Ok(w.finish())
}

fn select_clause(ir: &Comprehension, style: &SqlStyle) -> Result<String, RenderError> {
    // A tuple element becomes a plain column list at the top level.
    let columns = |expr: &Expr| -> String {
        match expr {
            Expr::Tuple(items) => items
                .iter()
                .map(|item| print_expr(item, style))
                .collect::<Vec<_>>()
                .join(", "),
            other => print_expr(other, style),
        }
    };

    Ok(match &ir.kind {
        ResultKind::List => format!("SELECT {}", columns(&ir.element)),
        ResultKind::Set => format!("SELECT DISTINCT {}", columns(&ir.element)),
        ResultKind::Dict => {
            let key = ir.key.as_ref().expect("validated dict key");
            format!(
                "SELECT {} AS k, {} AS v",
                print_expr(key, style),
                print_expr(&ir.element, style)
            )
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum => format!("SELECT SUM({})", print_expr(&ir.element, style)),
            ReduceOp::Count => "SELECT COUNT(*)".to_string(),
            ReduceOp::Max => format!("SELECT MAX({})", print_expr(&ir.element, style)),
            ReduceOp::Min => format!("SELECT MIN({})", print_expr(&ir.element, style)),
            ReduceOp::Any | ReduceOp::All => {
                return Err(RenderError::internal(
                    "any/all reductions take the EXISTS form",
                ))
            }
        },
    })
}

/// SQLite has no series generator, so every literal range becomes a
/// recursive CTE named after its loop variable.
fn emit_sqlite_ctes(w: &mut Writer, ir: &Comprehension) {
    let ranges: Vec<&Generator> = ir
        .generators
        .iter()
        .filter(|gen| gen.source.is_range())
        .collect();
    if ranges.is_empty() {
        return;
    }

    for (i, gen) in ranges.iter().enumerate() {
        let Source::Range { start, stop, step } = &gen.source else {
            continue;
        };
        let var = &gen.var;
        let head = if i == 0 {
            format!("WITH RECURSIVE {}_range({}) AS (", var, var)
        } else {
            format!("{}_range({}) AS (", var, var)
        };
        w.line(head);
        w.indent();
        if gen.source.range_len() == Some(0) {
            // Statically empty range: a seed row would be wrong.
            w.line(format!("SELECT {} WHERE 1 = 0", start));
        } else {
            w.line(format!("SELECT {}", start));
            w.line("UNION ALL");
            if *step == 1 {
                w.line(format!(
                    "SELECT {} + 1 FROM {}_range WHERE {} < {}",
                    var,
                    var,
                    var,
                    stop - 1
                ));
            } else {
                w.line(format!(
                    "SELECT {} + {} FROM {}_range WHERE {} + {} <= {}",
                    var,
                    step,
                    var,
                    var,
                    step,
                    stop - 1
                ));
            }
        }
        w.dedent();
        if i + 1 == ranges.len() {
            w.line(")");
        } else {
            w.line("),");
        }
    }
}

fn emit_from(w: &mut Writer, ir: &Comprehension, dialect: Dialect) {
    let table = |gen: &Generator| -> String {
        match (&gen.source, dialect) {
            (Source::Range { .. }, Dialect::Sqlite) => format!("{}_range", gen.var),
            (Source::Range { start, stop, step }, Dialect::Postgresql) => {
                if *step == 1 {
                    format!("generate_series({}, {}) AS {}", start, stop - 1, gen.var)
                } else {
                    format!(
                        "generate_series({}, {}, {}) AS {}",
                        start,
                        stop - 1,
                        step,
                        gen.var
                    )
                }
            }
            (Source::Named(name), _) => name.clone(),
        }
    };

    let mut gens = ir.generators.iter();
    let first = gens.next().expect("validated nonempty generators");
    w.line(format!("FROM {}", table(first)));
    for gen in gens {
        w.line(format!("CROSS JOIN {}", table(gen)));
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::{render, Dialect, RenderOptions};
    use crate::parse_source;

    fn emit(code: &str, dialect: Dialect) -> String {
        let ir = parse_source(code).expect("valid code");
        let options = RenderOptions {
            dialect: Some(dialect),
            ..Default::default()
        };
        render("sql", &ir, &options).expect("sql emission")
    }

    #[test]
    fn postgres_list_uses_generate_series() {
        let out = emit("[x*x for x in range(10) if x % 2 == 0]", Dialect::Postgresql);
        assert_eq!(
            out,
            "SELECT x * x\nFROM generate_series(0, 9) AS x\nWHERE x % 2 = 0"
        );
    }

    #[test]
    fn sqlite_list_uses_a_recursive_cte() {
        let out = emit("[x*x for x in range(10) if x % 2 == 0]", Dialect::Sqlite);
        assert!(out.contains("WITH RECURSIVE x_range(x) AS ("));
        assert!(out.contains("SELECT 0"));
        assert!(out.contains("UNION ALL"));
        assert!(out.contains("SELECT x + 1 FROM x_range WHERE x < 9"));
        assert!(out.contains("FROM x_range"));
        assert!(out.contains("WHERE x % 2 = 0"));
    }

    #[test]
    fn stepped_sqlite_range_does_not_overshoot() {
        let out = emit("[i for i in range(0, 8, 3)]", Dialect::Sqlite);
        // 0, 3, 6: the recursion guard must not admit 9
        assert!(out.contains("SELECT i + 3 FROM i_range WHERE i + 3 <= 7"));
    }

    #[test]
    fn statically_empty_range_seeds_no_rows() {
        let out = emit("[i for i in range(5, 5)]", Dialect::Sqlite);
        assert!(out.contains("SELECT 5 WHERE 1 = 0"));
    }

    #[test]
    fn set_selects_distinct() {
        let out = emit("{x % 3 for x in range(10)}", Dialect::Postgresql);
        assert!(out.starts_with("SELECT DISTINCT x % 3"));
    }

    #[test]
    fn dict_selects_key_value_columns() {
        let out = emit("{i: i*i for i in range(5)}", Dialect::Postgresql);
        assert!(out.starts_with("SELECT i AS k, i * i AS v"));
    }

    #[test]
    fn reductions_become_aggregates() {
        assert!(emit("sum(i*i for i in range(10))", Dialect::Postgresql)
            .starts_with("SELECT SUM(i * i)"));
        assert!(emit("count(i for i in range(10))", Dialect::Postgresql)
            .starts_with("SELECT COUNT(*)"));
        assert!(emit("max(i for i in range(10))", Dialect::Postgresql)
            .starts_with("SELECT MAX(i)"));
    }

    #[test]
    fn any_folds_element_into_exists() {
        let out = emit("any(x > 3 for x in range(10) if x % 2 == 0)", Dialect::Postgresql);
        assert!(out.contains("SELECT EXISTS("));
        assert!(out.contains("SELECT 1"));
        assert!(out.contains("WHERE x % 2 = 0 AND x > 3"));
    }

    #[test]
    fn all_negates_inside_not_exists() {
        let out = emit("all(x > 3 for x in range(10))", Dialect::Postgresql);
        assert!(out.contains("SELECT NOT EXISTS("));
        assert!(out.contains("WHERE NOT (x > 3)"));
    }

    #[test]
    fn nested_ranges_cross_join() {
        let out = emit(
            "[(i, j) for i in range(3) for j in range(3) if i != j]",
            Dialect::Postgresql,
        );
        assert!(out.contains("SELECT i, j"));
        assert!(out.contains("FROM generate_series(0, 2) AS i"));
        assert!(out.contains("CROSS JOIN generate_series(0, 2) AS j"));
        assert!(out.contains("WHERE i <> j"));
    }

    #[test]
    fn named_source_is_a_table() {
        let out = emit("[x + 1 for x in data]", Dialect::Postgresql);
        assert!(out.contains("FROM data"));
    }

    #[test]
    fn parallel_option_is_filtered_out_entirely() {
        let ir = parse_source("[x for x in range(5)]").unwrap();
        let with_parallel = render(
            "sql",
            &ir,
            &RenderOptions {
                parallel: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        let without = render("sql", &ir, &RenderOptions::default()).unwrap();
        assert_eq!(with_parallel, without);
    }

    #[test]
    fn explain_adds_note_headers() {
        let ir = parse_source("sum(x for x in range(10) if x > 2)").unwrap();
        let out = render(
            "sql",
            &ir,
            &RenderOptions {
                explain: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(out.contains("-- NOTE: predicates compiled to a WHERE conjunction"));
        assert!(out.contains("-- NOTE: reduction compiled to the sum aggregate form"));
    }

    #[test]
    fn sql_dict_duplicate_keys_remain_a_row_set() {
        // The emitted query yields every key/value row; map semantics
        // belong to the consumer.
        let out = emit("{i % 2: i for i in range(4)}", Dialect::Postgresql);
        assert!(out.starts_with("SELECT i % 2 AS k, i AS v"));
    }

    #[test]
    fn power_uses_the_sql_function() {
        let out = emit("[x ** 2 for x in range(4)]", Dialect::Postgresql);
        assert!(out.starts_with("SELECT POWER(x, 2)"));
    }
}
