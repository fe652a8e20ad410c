//! TypeScript backend: functional array chains. The "parallel" form
//! delegates the whole computation to a single off-main-thread Worker
//! behind a Promise; there is no intra-comprehension fan-out.

use crate::classify::Plan;
use crate::codegen::exprs::{default_binary, print_expr, ExprStyle};
use crate::codegen::{RenderError, RenderOptions, Writer};
use crate::ir::{BinOp, Comprehension, Expr, Generator, ReduceOp, ResultKind, Source};

struct TsStyle;

impl ExprStyle for TsStyle {
    fn binary(&self, op: BinOp) -> &'static str {
        match op {
            BinOp::Eq => "===",
            BinOp::Ne => "!==",
            _ => default_binary(op),
        }
    }

    fn pow(&self, base: &str, exponent: &str) -> String {
        format!("{} ** {}", base, exponent)
    }

    fn pow_is_call(&self) -> bool {
        false
    }

    fn tuple(&self, parts: &[String]) -> String {
        format!("[{}]", parts.join(", "))
    }
}

enum Terminal {
    Return,
    PostMessage,
}

pub(crate) fn emit(
    ir: &Comprehension,
    plan: &Plan,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    super::validate(ir)?;
    let fn_name = options.fn_name.as_deref().unwrap_or("program");
    let style = TsStyle;

    let params = ir
        .named_sources()
        .iter()
        .map(|name| format!("{}: number[]", name))
        .collect::<Vec<_>>()
        .join(", ");
    let value_ty = return_type(ir);

    let mut w = Writer::new();

    if plan.safe {
        // One worker computes the full result; the wrapper resolves with
        // whatever the worker posts back.
        w.line("const workerSource = `");
        w.line("onmessage = () => {");
        w.indent();
        emit_body(&mut w, ir, &style, Terminal::PostMessage);
        w.dedent();
        w.line("};");
        w.line("`;");
        w.blank();
        w.line(format!(
            "function {}({}): Promise<{}> {{",
            fn_name, params, value_ty
        ));
        w.indent();
        w.line("return new Promise(resolve => {");
        w.indent();
        w.line(
            "const worker = new Worker(URL.createObjectURL(new Blob([workerSource], \
             { type: \"application/javascript\" })));",
        );
        w.line("worker.onmessage = e => {");
        w.indent();
        w.line("worker.terminate();");
        w.line("resolve(e.data);");
        w.dedent();
        w.line("};");
        w.line("worker.postMessage(null);");
        w.dedent();
        w.line("});");
        w.dedent();
        w.line("}");
    } else {
        w.line(format!("function {}({}): {} {{", fn_name, params, value_ty));
        w.indent();
        emit_body(&mut w, ir, &style, Terminal::Return);
        w.dedent();
        w.line("}");
    }

    Ok(w.finish())
}

fn type_of(expr: &Expr) -> String {
    if super::expr_is_boolean(expr) {
        return "boolean".to_string();
    }
    if let Expr::Tuple(items) = expr {
        let parts: Vec<String> = items.iter().map(type_of).collect();
        return format!("[{}]", parts.join(", "));
    }
    "number".to_string()
}

fn return_type(ir: &Comprehension) -> String {
    match &ir.kind {
        ResultKind::Reduce(op) if op.is_boolean() => "boolean".to_string(),
        ResultKind::Reduce(_) => "number".to_string(),
        ResultKind::List => format!("{}[]", type_of(&ir.element)),
        ResultKind::Set => format!("Set<{}>", type_of(&ir.element)),
        ResultKind::Dict => {
            let key = ir.key.as_ref().expect("validated dict key");
            format!("Map<{}, {}>", type_of(key), type_of(&ir.element))
        }
    }
}

fn emit_body(w: &mut Writer, ir: &Comprehension, style: &TsStyle, terminal: Terminal) {
    match ir.generators.as_slice() {
        [gen] => emit_chain(w, ir, gen, style),
        _ => {
            // Loop form only ever runs sequentially (multi-generator shapes
            // are never parallel), so early returns are safe here.
            emit_loops(w, ir, style);
            return;
        }
    }
    match terminal {
        Terminal::Return => w.line("return result;"),
        Terminal::PostMessage => w.line("postMessage(result);"),
    }
}

fn source_expr(gen: &Generator) -> String {
    match &gen.source {
        Source::Range { start, stop, step } => {
            if *step == 1 {
                if *start == 0 {
                    format!("Array.from({{length: {}}}, (_, i) => i)", stop)
                } else {
                    format!(
                        "Array.from({{length: {}}}, (_, i) => {} + i)",
                        stop - start,
                        start
                    )
                }
            } else {
                let count = gen.source.range_len().expect("literal range");
                format!(
                    "Array.from({{length: {}}}, (_, i) => {} + i * {})",
                    count, start, step
                )
            }
        }
        Source::Named(name) => name.clone(),
    }
}

fn emit_chain(w: &mut Writer, ir: &Comprehension, gen: &Generator, style: &TsStyle) {
    let elem = print_expr(&ir.element, style);
    let identity_elem = ir.element == Expr::Var(gen.var.clone());

    let mut head = source_expr(gen);
    let mut pieces: Vec<String> = Vec::new();

    for filter in &gen.filters {
        pieces.push(format!(".filter({} => {})", gen.var, print_expr(filter, style)));
    }

    let result_name;
    match &ir.kind {
        ResultKind::List => {
            result_name = "result";
            if !identity_elem {
                pieces.push(format!(".map({} => {})", gen.var, elem));
            } else if gen.source.is_range() {
                // Array.from already allocated a fresh array
            } else if pieces.is_empty() {
                // A bare named source must still be copied
                head = format!("{}.slice()", head);
            }
        }
        ResultKind::Set => {
            result_name = "items";
            if !identity_elem {
                pieces.push(format!(".map({} => {})", gen.var, elem));
            }
        }
        ResultKind::Dict => {
            result_name = "entries";
            let key_expr = ir.key.as_ref().expect("validated dict key");
            let key = print_expr(key_expr, style);
            pieces.push(format!(
                ".map({} => [{}, {}] as [{}, {}])",
                gen.var,
                key,
                elem,
                type_of(key_expr),
                type_of(&ir.element)
            ));
        }
        ResultKind::Reduce(op) => {
            result_name = "result";
            match op {
                ReduceOp::Sum => pieces.push(format!(
                    ".reduce((acc, {}) => acc + ({}), 0)",
                    gen.var, elem
                )),
                ReduceOp::Count => pieces.push(".length".to_string()),
                ReduceOp::Max => pieces.push(format!(
                    ".reduce((acc, {}) => Math.max(acc, {}), -Infinity)",
                    gen.var, elem
                )),
                ReduceOp::Min => pieces.push(format!(
                    ".reduce((acc, {}) => Math.min(acc, {}), Infinity)",
                    gen.var, elem
                )),
                ReduceOp::Any => pieces.push(format!(".some({} => {})", gen.var, elem)),
                ReduceOp::All => pieces.push(format!(".every({} => {})", gen.var, elem)),
            }
        }
    }

    if pieces.is_empty() {
        w.line(format!("const {} = {};", result_name, head));
    } else {
        w.line(format!("const {} = {}", result_name, head));
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

    match &ir.kind {
        ResultKind::Set => w.line("const result = new Set(items);"),
        ResultKind::Dict => w.line("const result = new Map(entries);"),
        _ => {}
    }
}

fn emit_loops(w: &mut Writer, ir: &Comprehension, style: &TsStyle) {
    match &ir.kind {
        ResultKind::List => w.line(format!("const result: {}[] = [];", type_of(&ir.element))),
        ResultKind::Set => w.line(format!("const result = new Set<{}>();", type_of(&ir.element))),
        ResultKind::Dict => {
            let key = ir.key.as_ref().expect("validated dict key");
            w.line(format!(
                "const result = new Map<{}, {}>();",
                type_of(key),
                type_of(&ir.element)
            ));
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum | ReduceOp::Count => w.line("let acc = 0;"),
            ReduceOp::Max => w.line("let acc = -Infinity;"),
            ReduceOp::Min => w.line("let acc = Infinity;"),
            ReduceOp::Any | ReduceOp::All => {}
        },
    }

    for gen in &ir.generators {
        let header = match &gen.source {
            Source::Range { start, stop, step } => format!(
                "for (let {var} = {start}; {var} < {stop}; {var} += {step}) {{",
                var = gen.var,
                start = start,
                stop = stop,
                step = step
            ),
            Source::Named(name) => format!("for (const {} of {}) {{", gen.var, name),
        };
        w.line(header);
        w.indent();
        for filter in &gen.filters {
            w.line(format!("if (!({})) {{", print_expr(filter, style)));
            w.indent();
            w.line("continue;");
            w.dedent();
            w.line("}");
        }
    }

    let elem = print_expr(&ir.element, style);
    match &ir.kind {
        ResultKind::List => w.line(format!("result.push({});", elem)),
        ResultKind::Set => w.line(format!("result.add({});", elem)),
        ResultKind::Dict => {
            let key = print_expr(ir.key.as_ref().expect("validated dict key"), style);
            w.line(format!("result.set({}, {});", key, elem));
        }
        ResultKind::Reduce(op) => match op {
            ReduceOp::Sum => w.line(format!("acc += {};", elem)),
            ReduceOp::Count => w.line("acc += 1;"),
            ReduceOp::Max => w.line(format!("acc = Math.max(acc, {});", elem)),
            ReduceOp::Min => w.line(format!("acc = Math.min(acc, {});", elem)),
            ReduceOp::Any => {
                w.line(format!("if ({}) {{", elem));
                w.indent();
                w.line("return true;");
                w.dedent();
                w.line("}");
            }
            ReduceOp::All => {
                w.line(format!("if (!({})) {{", elem));
                w.indent();
                w.line("return false;");
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
        ResultKind::Reduce(ReduceOp::Any) => w.line("return false;"),
        ResultKind::Reduce(ReduceOp::All) => w.line("return true;"),
        ResultKind::Reduce(_) => w.line("return acc;"),
        _ => w.line("return result;"),
    }
}
