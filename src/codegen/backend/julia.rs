//! Julia backend: loop or broadcast lowering, thread-indexed shard arrays
//! for the parallel form (`parts[threadid()]`, `:static` scheduling so
//! chunks stay in index order), `@inbounds` behind the explicit unsafe
//! opt-in.

use crate::classify::Plan;
use crate::codegen::exprs::{print_expr, ExprStyle};
use crate::codegen::shard::Accumulator;
use crate::codegen::{Mode, RenderError, RenderOptions, Writer};
use crate::ir::{BinOp, Comprehension, Expr, ReduceOp, ResultKind, Source};

struct JuliaStyle;

impl ExprStyle for JuliaStyle {
    fn pow(&self, base: &str, exponent: &str) -> String {
        format!("{} ^ {}", base, exponent)
    }

    fn pow_is_call(&self) -> bool {
        false
    }
}

/// Element-wise spellings for the vectorized lowering: every operator is
/// dotted, and the bound variable stands for the whole (filtered) range.
struct BroadcastStyle;

impl ExprStyle for BroadcastStyle {
    fn binary(&self, op: BinOp) -> &'static str {
        match op {
            BinOp::Add => ".+",
            BinOp::Sub => ".-",
            BinOp::Mul => ".*",
            BinOp::Div => "./",
            BinOp::Mod => ".%",
            BinOp::Eq => ".==",
            BinOp::Ne => ".!=",
            BinOp::Lt => ".<",
            BinOp::Le => ".<=",
            BinOp::Gt => ".>",
            BinOp::Ge => ".>=",
            other => crate::codegen::exprs::default_binary(other),
        }
    }

    fn pow(&self, base: &str, exponent: &str) -> String {
        format!("{} .^ {}", base, exponent)
    }

    fn pow_is_call(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lowering {
    Loops,
    Broadcast,
}

pub(crate) fn emit(
    ir: &Comprehension,
    plan: &Plan,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    super::validate(ir)?;
    let fn_name = options.fn_name.as_deref().unwrap_or("program");
    let explain = options.explain.unwrap_or(true);
    let unchecked = options.unchecked.unwrap_or(false);

    let (lowering, mode_note) = select_lowering(ir, options.mode);
    let threaded = plan.safe && lowering == Lowering::Loops;

    let mut notes: Vec<String> = Vec::new();
    if let Some(note) = mode_note {
        notes.push(note);
    }
    if threaded {
        notes.push(match ir.kind {
            ResultKind::Dict => {
                "# NOTE: dict parallelized with shard-merge pattern (thread-local writes)"
                    .to_string()
            }
            _ => "# NOTE: parallelized with thread-local partials".to_string(),
        });
    } else if plan.safe && lowering == Lowering::Broadcast {
        notes.push("# NOTE: broadcast lowering is vectorized; thread fan-out not applied".to_string());
    }

    let mut w = Writer::new();
    if explain {
        for note in &notes {
            w.line(note);
        }
    }
    if threaded {
        if let Some(threads) = options.threads {
            w.line(format!("# launch with: julia -t {}", threads));
        }
        w.line("using Base.Threads");
        w.blank();
    } else if explain && !notes.is_empty() {
        w.blank();
    }

    let params = ir.named_sources().join(", ");
    w.line(format!(
        "function {}({})::{}",
        fn_name,
        params,
        return_type(ir)
    ));
    w.indent();

    if threaded {
        emit_threaded(&mut w, ir, unchecked)?;
    } else if lowering == Lowering::Broadcast {
        emit_broadcast(&mut w, ir)?;
    } else {
        emit_loops(&mut w, ir, unchecked);
    }

    w.dedent();
    w.line("end");
    Ok(w.finish())
}

fn type_of(expr: &Expr) -> String {
    if super::expr_is_boolean(expr) {
        return "Bool".to_string();
    }
    if let Expr::Tuple(items) = expr {
        let parts: Vec<String> = items.iter().map(type_of).collect();
        return format!("Tuple{{{}}}", parts.join(", "));
    }
    "Int".to_string()
}

fn return_type(ir: &Comprehension) -> String {
    match &ir.kind {
        ResultKind::Reduce(op) if op.is_boolean() => "Bool".to_string(),
        ResultKind::Reduce(_) => "Int".to_string(),
        ResultKind::List => format!("Vector{{{}}}", type_of(&ir.element)),
        ResultKind::Set => format!("Set{{{}}}", type_of(&ir.element)),
        ResultKind::Dict => {
            let key = ir.key.as_ref().expect("validated dict key");
            format!("Dict{{{}, {}}}", type_of(key), type_of(&ir.element))
        }
    }
}

fn kind_word(ir: &Comprehension) -> &'static str {
    match ir.kind {
        ResultKind::List => "list",
        ResultKind::Set => "set",
        ResultKind::Dict => "dict",
        ResultKind::Reduce(op) => op.name(),
    }
}

/// A shape the vectorized lowering can express: one literal range, no
/// dict, and expressions built purely from arithmetic and comparisons.
fn broadcast_eligible(ir: &Comprehension) -> bool {
    let single_range = matches!(ir.generators.as_slice(), [gen] if gen.source.is_range());
    single_range
        && !matches!(ir.kind, ResultKind::Dict)
        && expr_vectorizes(&ir.element)
        && ir.generators[0].filters.iter().all(expr_vectorizes)
}

fn expr_vectorizes(expr: &Expr) -> bool {
    match expr {
        Expr::Int(_) | Expr::Var(_) => true,
        Expr::Unary { op, expr } => {
            matches!(op, crate::ir::UnOp::Neg) && expr_vectorizes(expr)
        }
        Expr::Binary { op, lhs, rhs } => {
            !matches!(op, BinOp::And | BinOp::Or) && expr_vectorizes(lhs) && expr_vectorizes(rhs)
        }
        Expr::Bool(_) | Expr::Tuple(_) => false,
    }
}

fn select_lowering(ir: &Comprehension, user_mode: Option<Mode>) -> (Lowering, Option<String>) {
    match user_mode {
        Some(Mode::Loops) => (Lowering::Loops, None),
        Some(Mode::Broadcast) => {
            if broadcast_eligible(ir) {
                (Lowering::Broadcast, None)
            } else {
                (
                    Lowering::Loops,
                    Some("# NOTE: broadcast mode not applicable to this shape; using loops".into()),
                )
            }
        }
        None => {
            // Heuristic: vectorize small, unfiltered shapes where the
            // allocation cost cannot bite; loop everywhere else.
            let count = ir
                .generators
                .first()
                .and_then(|gen| gen.source.range_len());
            let unfiltered = ir.generators.iter().all(|gen| gen.filters.is_empty());
            match count {
                Some(n) if n <= 10_000 && unfiltered && broadcast_eligible(ir) => (
                    Lowering::Broadcast,
                    Some(format!("# NOTE: auto-selected broadcast mode for small N={}", n)),
                ),
                _ => (
                    Lowering::Loops,
                    Some(format!(
                        "# NOTE: auto-selected loops mode for {} operation",
                        kind_word(ir)
                    )),
                ),
            }
        }
    }
}

fn range_expr(source: &Source) -> String {
    match source {
        Source::Range { start, stop, step } => {
            if *step == 1 {
                format!("{}:{}", start, stop - 1)
            } else {
                format!("{}:{}:{}", start, step, stop - 1)
            }
        }
        Source::Named(name) => name.clone(),
    }
}

fn emit_loops(w: &mut Writer, ir: &Comprehension, unchecked: bool) {
    let style = JuliaStyle;
    let elem = print_expr(&ir.element, &style);

    match &ir.kind {
        ResultKind::List => w.line(format!("result = {}[]", type_of(&ir.element))),
        ResultKind::Set => w.line(format!("result = Set{{{}}}()", type_of(&ir.element))),
        ResultKind::Dict => {
            let key = ir.key.as_ref().expect("validated dict key");
            w.line(format!(
                "result = Dict{{{}, {}}}()",
                type_of(key),
                type_of(&ir.element)
            ));
        }
        ResultKind::Reduce(op) => w.line(format!("result = {}", fold_identity(*op))),
    }

    for (i, gen) in ir.generators.iter().enumerate() {
        let prefix = if i == 0 && unchecked { "@inbounds " } else { "" };
        w.line(format!(
            "{}for {} in {}",
            prefix,
            gen.var,
            range_expr(&gen.source)
        ));
        w.indent();
        for filter in &gen.filters {
            w.line(format!("if !({})", print_expr(filter, &style)));
            w.indent();
            w.line("continue");
            w.dedent();
            w.line("end");
        }
    }

    match &ir.kind {
        ResultKind::List | ResultKind::Set => w.line(format!("push!(result, {})", elem)),
        ResultKind::Dict => {
            let key = print_expr(ir.key.as_ref().expect("validated dict key"), &style);
            w.line(format!("result[{}] = {}", key, elem));
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum => w.line(format!("result += {}", elem)),
            ReduceOp::Count => w.line("result += 1"),
            ReduceOp::Max => w.line(format!("result = max(result, {})", elem)),
            ReduceOp::Min => w.line(format!("result = min(result, {})", elem)),
            ReduceOp::Any => {
                w.line(format!("if {}", elem));
                w.indent();
                w.line("result = true");
                w.line("break");
                w.dedent();
                w.line("end");
            }
            ReduceOp::All => {
                w.line(format!("if !({})", elem));
                w.indent();
                w.line("result = false");
                w.line("break");
                w.dedent();
                w.line("end");
            }
        },
    }

    for _ in &ir.generators {
        w.dedent();
        w.line("end");
    }
    w.line("return result");
}

/// Thread-indexed shards: one accumulator per thread, `:static` so thread
/// i always owns the i-th contiguous chunk, serial fold at region exit.
fn emit_threaded(w: &mut Writer, ir: &Comprehension, unchecked: bool) -> Result<(), RenderError> {
    let style = JuliaStyle;
    let [gen] = ir.generators.as_slice() else {
        return Err(RenderError::internal(
            "parallel plan for a multi-generator comprehension",
        ));
    };
    if !gen.source.is_range() {
        return Err(RenderError::internal("parallel plan for an opaque source"));
    }

    let accumulator = Accumulator::of(ir);
    let elem = print_expr(&ir.element, &style);
    let elem_ty = type_of(&ir.element);

    match &accumulator {
        Accumulator::List => w.line(format!("parts = [{}[] for _ in 1:nthreads()]", elem_ty)),
        Accumulator::Set => w.line(format!("parts = [Set{{{}}}() for _ in 1:nthreads()]", elem_ty)),
        Accumulator::Map => {
            let key = ir.key.as_ref().expect("validated dict key");
            w.line(format!(
                "parts = [Dict{{{}, {}}}() for _ in 1:nthreads()]",
                type_of(key),
                elem_ty
            ));
        }
        Accumulator::Fold(op) => {
            w.line(format!("parts = fill({}, nthreads())", fold_identity(*op)))
        }
    }

    w.line(format!(
        "@threads :static for {} in {}",
        gen.var,
        range_expr(&gen.source)
    ));
    w.indent();

    // No continue/break inside the threaded region: filters become one
    // positive guard around the shard update.
    let guard = gen
        .filters
        .iter()
        .map(|f| print_expr(f, &style))
        .collect::<Vec<_>>()
        .join(" && ");
    if !guard.is_empty() {
        w.line(format!("if {}", guard));
        w.indent();
    }

    let prefix = if unchecked { "@inbounds " } else { "" };
    let update = match &accumulator {
        Accumulator::List | Accumulator::Set => {
            format!("push!(parts[threadid()], {})", elem)
        }
        Accumulator::Map => {
            let key = print_expr(ir.key.as_ref().expect("validated dict key"), &style);
            format!("parts[threadid()][{}] = {}", key, elem)
        }
        Accumulator::Fold(op) => match op {
            ReduceOp::Sum => format!("parts[threadid()] += {}", elem),
            ReduceOp::Count => "parts[threadid()] += 1".to_string(),
            ReduceOp::Max => format!("parts[threadid()] = max(parts[threadid()], {})", elem),
            ReduceOp::Min => format!("parts[threadid()] = min(parts[threadid()], {})", elem),
            ReduceOp::Any => format!("parts[threadid()] |= {}", elem),
            ReduceOp::All => format!("parts[threadid()] &= {}", elem),
        },
    };
    w.line(format!("{}{}", prefix, update));

    if !guard.is_empty() {
        w.dedent();
        w.line("end");
    }
    w.dedent();
    w.line("end");

    match &accumulator {
        Accumulator::List => {
            w.line(format!("result = {}[]", elem_ty));
            w.line("for part in parts");
            w.indent();
            w.line("append!(result, part)");
            w.dedent();
            w.line("end");
            w.line("return result");
        }
        Accumulator::Set => {
            w.line(format!("result = Set{{{}}}()", elem_ty));
            w.line("for part in parts");
            w.indent();
            w.line("union!(result, part)");
            w.dedent();
            w.line("end");
            w.line("return result");
        }
        Accumulator::Map => {
            let key = ir.key.as_ref().expect("validated dict key");
            w.line(format!(
                "result = Dict{{{}, {}}}()",
                type_of(key),
                elem_ty
            ));
            w.line("for part in parts");
            w.indent();
            w.line("merge!(result, part)");
            w.dedent();
            w.line("end");
            w.line("return result");
        }
        Accumulator::Fold(op) => {
            let fold = match op {
                ReduceOp::Sum | ReduceOp::Count => "sum",
                ReduceOp::Max => "maximum",
                ReduceOp::Min => "minimum",
                ReduceOp::Any => "any",
                ReduceOp::All => "all",
            };
            w.line(format!("return {}(parts)", fold));
        }
    }
    Ok(())
}

fn emit_broadcast(w: &mut Writer, ir: &Comprehension) -> Result<(), RenderError> {
    let style = BroadcastStyle;
    let gen = &ir.generators[0];
    let var = &gen.var;

    w.line(format!("{} = {}", var, range_expr(&gen.source)));
    for filter in &gen.filters {
        w.line(format!("{} = {}[{}]", var, var, print_expr(filter, &style)));
    }

    let identity_elem = ir.element == Expr::Var(var.clone());
    let belem = print_expr(&ir.element, &style);
    let value = if identity_elem { var.clone() } else { belem };

    match &ir.kind {
        ResultKind::List => w.line(format!("return collect({})", value)),
        ResultKind::Set => w.line(format!("return Set({})", value)),
        ResultKind::Dict => {
            return Err(RenderError::internal(
                "broadcast lowering selected for a dict shape",
            ))
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum => w.line(format!("return sum({})", value)),
            ReduceOp::Count => w.line(format!("return length({})", var)),
            ReduceOp::Max => w.line(format!("return maximum({})", value)),
            ReduceOp::Min => w.line(format!("return minimum({})", value)),
            ReduceOp::Any => w.line(format!("return any({})", value)),
            ReduceOp::All => w.line(format!("return all({})", value)),
        },
    }
    Ok(())
}

fn fold_identity(op: ReduceOp) -> &'static str {
    match op {
        ReduceOp::Sum | ReduceOp::Count => "0",
        ReduceOp::Max => "typemin(Int)",
        ReduceOp::Min => "typemax(Int)",
        ReduceOp::Any => "false",
        ReduceOp::All => "true",
    }
}
