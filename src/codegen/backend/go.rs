//! Go backend: plain loops sequentially; a goroutine worker pool with
//! per-worker private accumulators and one serial merge when parallel.

use crate::classify::Plan;
use crate::codegen::exprs::{print_expr, ExprStyle};
use crate::codegen::shard::Accumulator;
use crate::codegen::{RenderError, RenderOptions, Writer};
use crate::ir::{Comprehension, Expr, ReduceOp, ResultKind, Source};

struct GoStyle;

impl ExprStyle for GoStyle {
    fn pow(&self, base: &str, exponent: &str) -> String {
        format!("ipow({}, {})", base, exponent)
    }

    fn tuple(&self, parts: &[String]) -> String {
        format!("[{}]int{{{}}}", parts.len(), parts.join(", "))
    }
}

pub(crate) fn emit(
    ir: &Comprehension,
    plan: &Plan,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    super::validate(ir)?;
    let fn_name = options.fn_name.as_deref().unwrap_or("program");
    let style = GoStyle;

    let mut imports: Vec<&str> = Vec::new();
    if matches!(
        ir.kind,
        ResultKind::Reduce(ReduceOp::Max) | ResultKind::Reduce(ReduceOp::Min)
    ) {
        imports.push("math");
    }
    if plan.safe {
        imports.push("runtime");
        imports.push("sync");
    }
    imports.sort_unstable();

    let mut w = Writer::new();
    match imports.as_slice() {
        [] => {}
        [single] => {
            w.line(format!("import \"{}\"", single));
            w.blank();
        }
        many => {
            w.line("import (");
            w.indent();
            for import in many {
                w.line(format!("\"{}\"", import));
            }
            w.dedent();
            w.line(")");
            w.blank();
        }
    }

    if super::mentions_pow(ir) {
        w.line("func ipow(base, exp int) int {");
        w.indent();
        w.line("result := 1");
        w.line("for i := 0; i < exp; i++ {");
        w.indent();
        w.line("result *= base");
        w.dedent();
        w.line("}");
        w.line("return result");
        w.dedent();
        w.line("}");
        w.blank();
    }

    let params = ir
        .named_sources()
        .iter()
        .map(|name| format!("{} []int", name))
        .collect::<Vec<_>>()
        .join(", ");
    w.line(format!(
        "func {}({}) {} {{",
        fn_name,
        params,
        return_type(ir)
    ));
    w.indent();

    if plan.safe {
        emit_parallel(&mut w, ir, &style)?;
    } else {
        emit_sequential(&mut w, ir, &style);
    }

    w.dedent();
    w.line("}");
    Ok(w.finish())
}

fn type_of(expr: &Expr) -> String {
    if super::expr_is_boolean(expr) {
        return "bool".to_string();
    }
    if let Expr::Tuple(items) = expr {
        let inner = items.first().map(type_of).unwrap_or_else(|| "int".into());
        return format!("[{}]{}", items.len(), inner);
    }
    "int".to_string()
}

fn return_type(ir: &Comprehension) -> String {
    match &ir.kind {
        ResultKind::Reduce(op) if op.is_boolean() => "bool".to_string(),
        ResultKind::Reduce(_) => "int".to_string(),
        ResultKind::List => format!("[]{}", type_of(&ir.element)),
        ResultKind::Set => format!("map[{}]struct{{}}", type_of(&ir.element)),
        ResultKind::Dict => {
            let key = ir.key.as_ref().expect("validated dict key");
            format!("map[{}]{}", type_of(key), type_of(&ir.element))
        }
    }
}

fn emit_sequential(w: &mut Writer, ir: &Comprehension, style: &GoStyle) {
    let elem_ty = type_of(&ir.element);
    match &ir.kind {
        ResultKind::List => w.line(format!("result := make([]{}, 0)", elem_ty)),
        ResultKind::Set => w.line(format!("result := make(map[{}]struct{{}})", elem_ty)),
        ResultKind::Dict => {
            let key = ir.key.as_ref().expect("validated dict key");
            w.line(format!("result := make(map[{}]{})", type_of(key), elem_ty));
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum | ReduceOp::Count => w.line("acc := 0"),
            ReduceOp::Max => w.line("acc := math.MinInt"),
            ReduceOp::Min => w.line("acc := math.MaxInt"),
            // any/all short-circuit with early returns, no accumulator
            ReduceOp::Any | ReduceOp::All => {}
        },
    }

    for gen in &ir.generators {
        w.line(loop_header(gen));
        w.indent();
        for filter in &gen.filters {
            w.line(format!("if !({}) {{", print_expr(filter, style)));
            w.indent();
            w.line("continue");
            w.dedent();
            w.line("}");
        }
    }

    let elem = print_expr(&ir.element, style);
    match &ir.kind {
        ResultKind::List => w.line(format!("result = append(result, {})", elem)),
        ResultKind::Set => w.line(format!("result[{}] = struct{{}}{{}}", elem)),
        ResultKind::Dict => {
            let key = print_expr(ir.key.as_ref().expect("validated dict key"), style);
            w.line(format!("result[{}] = {}", key, elem));
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum => w.line(format!("acc += {}", elem)),
            ReduceOp::Count => w.line("acc++"),
            ReduceOp::Max => {
                w.line(format!("if {} > acc {{", elem));
                w.indent();
                w.line(format!("acc = {}", elem));
                w.dedent();
                w.line("}");
            }
            ReduceOp::Min => {
                w.line(format!("if {} < acc {{", elem));
                w.indent();
                w.line(format!("acc = {}", elem));
                w.dedent();
                w.line("}");
            }
            ReduceOp::Any => {
                w.line(format!("if {} {{", elem));
                w.indent();
                w.line("return true");
                w.dedent();
                w.line("}");
            }
            ReduceOp::All => {
                w.line(format!("if !({}) {{", elem));
                w.indent();
                w.line("return false");
                w.dedent();
                w.line("}");
            }
        },
    }

    for _ in &ir.generators {
        w.dedent();
        w.line("}");
    }

    match &ir.kind {
        ResultKind::Reduce(ReduceOp::Any) => w.line("return false"),
        ResultKind::Reduce(ReduceOp::All) => w.line("return true"),
        ResultKind::Reduce(_) => w.line("return acc"),
        _ => w.line("return result"),
    }
}

fn loop_header(gen: &crate::ir::Generator) -> String {
    match &gen.source {
        Source::Range { start, stop, step } => format!(
            "for {var} := {start}; {var} < {stop}; {var} += {step} {{",
            var = gen.var,
            start = start,
            stop = stop,
            step = step
        ),
        Source::Named(name) => format!("for _, {} := range {} {{", gen.var, name),
    }
}

/// Worker-pool emission for a single literal-range generator. Each worker
/// owns parts[w]; nothing is shared during the concurrent phase, and the
/// serial merge walks parts in chunk-index order (so a later chunk's dict
/// write beats an earlier one, matching the sequential result).
fn emit_parallel(w: &mut Writer, ir: &Comprehension, style: &GoStyle) -> Result<(), RenderError> {
    let [gen] = ir.generators.as_slice() else {
        return Err(RenderError::internal(
            "parallel plan for a multi-generator comprehension",
        ));
    };
    let Source::Range { start, step, .. } = &gen.source else {
        return Err(RenderError::internal(
            "parallel plan for an opaque source",
        ));
    };
    let total = gen.source.range_len().expect("literal range");
    let accumulator = Accumulator::of(ir);

    let elem_ty = type_of(&ir.element);
    let part_ty = match &accumulator {
        Accumulator::List => format!("[]{}", elem_ty),
        Accumulator::Set => format!("map[{}]struct{{}}", elem_ty),
        Accumulator::Map => {
            let key = ir.key.as_ref().expect("validated dict key");
            format!("map[{}]{}", type_of(key), elem_ty)
        }
        Accumulator::Fold(op) if op.is_boolean() => "bool".to_string(),
        Accumulator::Fold(_) => "int".to_string(),
    };

    w.line(format!("total := {}", total));
    w.line("numWorkers := runtime.NumCPU()");
    w.line("if numWorkers > total {");
    w.indent();
    w.line("numWorkers = total");
    w.dedent();
    w.line("}");
    w.line("if numWorkers < 1 {");
    w.indent();
    w.line("numWorkers = 1");
    w.dedent();
    w.line("}");
    w.line("chunk := (total + numWorkers - 1) / numWorkers");
    w.line(format!("parts := make([]{}, numWorkers)", part_ty));
    w.line("var wg sync.WaitGroup");
    w.line("for w := 0; w < numWorkers; w++ {");
    w.indent();
    w.line("wg.Add(1)");
    w.line("go func(w int) {");
    w.indent();
    w.line("defer wg.Done()");
    w.line("lo := w * chunk");
    w.line("hi := lo + chunk");
    w.line("if hi > total {");
    w.indent();
    w.line("hi = total");
    w.dedent();
    w.line("}");

    match &accumulator {
        Accumulator::List => w.line(format!("acc := make([]{}, 0, hi-lo)", elem_ty)),
        Accumulator::Set => w.line(format!("acc := make(map[{}]struct{{}})", elem_ty)),
        Accumulator::Map => w.line(format!("acc := make({})", part_ty)),
        Accumulator::Fold(op) => w.line(format!("acc := {}", worker_identity(*op))),
    }

    w.line("for idx := lo; idx < hi; idx++ {");
    w.indent();
    w.line(format!("{} := {}", gen.var, index_value(*start, *step)));
    for filter in &gen.filters {
        w.line(format!("if !({}) {{", print_expr(filter, style)));
        w.indent();
        w.line("continue");
        w.dedent();
        w.line("}");
    }

    let elem = print_expr(&ir.element, style);
    match &accumulator {
        Accumulator::List => w.line(format!("acc = append(acc, {})", elem)),
        Accumulator::Set => w.line(format!("acc[{}] = struct{{}}{{}}", elem)),
        Accumulator::Map => {
            let key = print_expr(ir.key.as_ref().expect("validated dict key"), style);
            w.line(format!("acc[{}] = {}", key, elem));
        }
        Accumulator::Fold(op) => match op {
            ReduceOp::Sum => w.line(format!("acc += {}", elem)),
            ReduceOp::Count => w.line("acc++"),
            ReduceOp::Max => {
                w.line(format!("if {} > acc {{", elem));
                w.indent();
                w.line(format!("acc = {}", elem));
                w.dedent();
                w.line("}");
            }
            ReduceOp::Min => {
                w.line(format!("if {} < acc {{", elem));
                w.indent();
                w.line(format!("acc = {}", elem));
                w.dedent();
                w.line("}");
            }
            ReduceOp::Any => {
                w.line(format!("if {} {{", elem));
                w.indent();
                w.line("acc = true");
                w.line("break");
                w.dedent();
                w.line("}");
            }
            ReduceOp::All => {
                w.line(format!("if !({}) {{", elem));
                w.indent();
                w.line("acc = false");
                w.line("break");
                w.dedent();
                w.line("}");
            }
        },
    }

    w.dedent();
    w.line("}");
    w.line("parts[w] = acc");
    w.dedent();
    w.line("}(w)");
    w.dedent();
    w.line("}");
    w.line("wg.Wait()");

    emit_merge(w, ir, &accumulator);
    Ok(())
}

fn index_value(start: i64, step: i64) -> String {
    match (start, step) {
        (0, 1) => "idx".to_string(),
        (0, _) => format!("idx * {}", step),
        (_, 1) => format!("{} + idx", start),
        _ => format!("{} + idx * {}", start, step),
    }
}

fn worker_identity(op: ReduceOp) -> &'static str {
    match op {
        ReduceOp::Sum | ReduceOp::Count => "0",
        ReduceOp::Max => "math.MinInt",
        ReduceOp::Min => "math.MaxInt",
        ReduceOp::Any => "false",
        ReduceOp::All => "true",
    }
}

fn emit_merge(w: &mut Writer, ir: &Comprehension, accumulator: &Accumulator) {
    let elem_ty = type_of(&ir.element);
    match accumulator {
        Accumulator::List => {
            w.line(format!("result := make([]{}, 0, total)", elem_ty));
            w.line("for _, part := range parts {");
            w.indent();
            w.line("result = append(result, part...)");
            w.dedent();
            w.line("}");
            w.line("return result");
        }
        Accumulator::Set => {
            w.line(format!("result := make(map[{}]struct{{}})", elem_ty));
            w.line("for _, part := range parts {");
            w.indent();
            w.line("for value := range part {");
            w.indent();
            w.line("result[value] = struct{}{}");
            w.dedent();
            w.line("}");
            w.dedent();
            w.line("}");
            w.line("return result");
        }
        Accumulator::Map => {
            let key = ir.key.as_ref().expect("validated dict key");
            w.line(format!(
                "result := make(map[{}]{})",
                type_of(key),
                elem_ty
            ));
            w.line("for _, part := range parts {");
            w.indent();
            w.line("for key, value := range part {");
            w.indent();
            w.line("result[key] = value");
            w.dedent();
            w.line("}");
            w.dedent();
            w.line("}");
            w.line("return result");
        }
        Accumulator::Fold(op) => match op {
            ReduceOp::Sum | ReduceOp::Count => {
                w.line("result := 0");
                w.line("for _, part := range parts {");
                w.indent();
                w.line("result += part");
                w.dedent();
                w.line("}");
                w.line("return result");
            }
            ReduceOp::Max | ReduceOp::Min => {
                w.line(format!("result := {}", worker_identity(*op)));
                w.line("for _, part := range parts {");
                w.indent();
                if *op == ReduceOp::Max {
                    w.line("if part > result {");
                } else {
                    w.line("if part < result {");
                }
                w.indent();
                w.line("result = part");
                w.dedent();
                w.line("}");
                w.dedent();
                w.line("}");
                w.line("return result");
            }
            ReduceOp::Any => {
                w.line("for _, part := range parts {");
                w.indent();
                w.line("if part {");
                w.indent();
                w.line("return true");
                w.dedent();
                w.line("}");
                w.dedent();
                w.line("}");
                w.line("return false");
            }
            ReduceOp::All => {
                w.line("for _, part := range parts {");
                w.indent();
                w.line("if !part {");
                w.indent();
                w.line("return false");
                w.dedent();
                w.line("}");
                w.dedent();
                w.line("}");
                w.line("return true");
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::{render, RenderOptions};
    use crate::parse_source;

    fn emit(code: &str, parallel: bool) -> String {
        let ir = parse_source(code).expect("valid code");
        let options = RenderOptions {
            parallel: Some(parallel),
            ..Default::default()
        };
        render("go", &ir, &options).expect("go emission")
    }

    #[test]
    fn sequential_list_loop() {
        let out = emit("[x*x for x in range(10) if x % 2 == 0]", false);
        assert!(out.contains("func program() []int {"));
        assert!(out.contains("result := make([]int, 0)"));
        assert!(out.contains("for x := 0; x < 10; x += 1 {"));
        assert!(out.contains("if !(x % 2 == 0) {"));
        assert!(out.contains("result = append(result, x*x)") || out.contains("result = append(result, x * x)"));
        assert!(!out.contains("sync"));
    }

    #[test]
    fn parallel_list_uses_worker_pool_with_ordered_merge() {
        let out = emit("[x*x for x in range(10) if x % 2 == 0]", true);
        assert!(out.contains("numWorkers := runtime.NumCPU()"));
        assert!(out.contains("var wg sync.WaitGroup"));
        assert!(out.contains("go func(w int) {"));
        assert!(out.contains("parts[w] = acc"));
        assert!(out.contains("wg.Wait()"));
        // Index-ordered concatenation preserves the sequential order
        assert!(out.contains("result = append(result, part...)"));
        // No locking anywhere
        assert!(!out.contains("Mutex"));
    }

    #[test]
    fn parallel_sum_merges_scalar_parts() {
        let out = emit("sum(i*i for i in range(1, 1000000) if i % 2 == 0)", true);
        assert!(out.contains("parts := make([]int, numWorkers)"));
        assert!(out.contains("acc += i * i"));
        assert!(out.contains("result += part"));
    }

    #[test]
    fn parallel_dict_uses_map_shards() {
        let out = emit("{i: i*i for i in range(10)}", true);
        assert!(out.contains("parts := make([]map[int]int, numWorkers)"));
        assert!(out.contains("acc[i] = i * i"));
        assert!(out.contains("for key, value := range part {"));
        assert!(out.contains("result[key] = value"));
    }

    #[test]
    fn nested_generators_emit_plain_loops_even_when_parallel_requested() {
        let parallel = emit("[(i, j) for i in range(1000) for j in range(1000) if i*j > 500]", true);
        let sequential = emit("[(i, j) for i in range(1000) for j in range(1000) if i*j > 500]", false);
        assert_eq!(parallel, sequential, "fallback must be total");
        assert!(!parallel.contains("go func"));
        assert!(!parallel.contains("sync"));
        assert!(parallel.contains("for i := 0; i < 1000; i += 1 {"));
        assert!(parallel.contains("[2]int{i, j}"));
    }

    #[test]
    fn max_uses_int_extremes_in_both_paths() {
        let sequential = emit("max(i for i in range(5))", false);
        assert!(sequential.contains("import \"math\""));
        assert!(sequential.contains("acc := math.MinInt"));

        let parallel = emit("max(i for i in range(5))", true);
        assert!(parallel.contains("acc := math.MinInt"));
        assert!(parallel.contains("result := math.MinInt"));
    }

    #[test]
    fn any_short_circuits_sequentially() {
        let out = emit("any(i > 3 for i in range(5))", false);
        assert!(out.contains("if i > 3 {"));
        assert!(out.contains("return true"));
        assert!(out.contains("return false"));
    }

    #[test]
    fn named_source_becomes_slice_parameter() {
        let out = emit("[x + 1 for x in data]", false);
        assert!(out.contains("func program(data []int) []int {"));
        assert!(out.contains("for _, x := range data {"));
    }

    #[test]
    fn pow_emits_helper() {
        let out = emit("[x ** 3 for x in range(4)]", false);
        assert!(out.contains("func ipow(base, exp int) int {"));
        assert!(out.contains("append(result, ipow(x, 3))"));
    }

    #[test]
    fn stepped_parallel_range_maps_indices() {
        let out = emit("sum(i for i in range(5, 50, 3))", true);
        assert!(out.contains("total := 15"));
        assert!(out.contains("i := 5 + idx * 3"));
    }
}
