//! Expression printing shared by all backends.
//!
//! The walker owns structure and parenthesization; each backend supplies
//! operator spellings through [`ExprStyle`]. Defaults cover the C-family
//! targets, so most styles override only a handful of methods.

use crate::ir::{BinOp, Expr, UnOp};

/// Per-target expression syntax.
pub(crate) trait ExprStyle {
    fn bool_lit(&self, value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    /// Spelling of a non-exponentiation binary operator.
    fn binary(&self, op: BinOp) -> &'static str {
        default_binary(op)
    }

    fn not_op(&self) -> &'static str {
        "!"
    }

    /// Exponentiation. Operands arrive parenthesized when compound unless
    /// [`ExprStyle::pow_is_call`] says the target lowers `**` to a call.
    fn pow(&self, base: &str, exponent: &str) -> String;

    /// Call-style pow targets get unwrapped operands (the call supplies
    /// its own grouping).
    fn pow_is_call(&self) -> bool {
        true
    }

    fn tuple(&self, parts: &[String]) -> String {
        format!("({})", parts.join(", "))
    }
}

/// C-family operator spellings, the default for most styles. Styles that
/// override [`ExprStyle::binary`] for a few operators fall back here for
/// the rest.
pub(crate) fn default_binary(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        // Handled by `pow`; present so the match is total.
        BinOp::Pow => "**",
    }
}

// Precedence levels used for minimal parenthesization. Pow binds tighter
// than unary in every operator-style target we emit (TS, Julia).
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_CMP: u8 = 3;
const PREC_ADD: u8 = 4;
const PREC_MUL: u8 = 5;
const PREC_UNARY: u8 = 6;
const PREC_POW: u8 = 7;
const PREC_ATOM: u8 = 8;

fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Or => PREC_OR,
        BinOp::And => PREC_AND,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => PREC_CMP,
        BinOp::Add | BinOp::Sub => PREC_ADD,
        BinOp::Mul | BinOp::Div | BinOp::Mod => PREC_MUL,
        BinOp::Pow => PREC_POW,
    }
}

pub(crate) fn print_expr(expr: &Expr, style: &dyn ExprStyle) -> String {
    print_prec(expr, style, 0)
}

fn print_prec(expr: &Expr, style: &dyn ExprStyle, parent: u8) -> String {
    let (text, prec) = match expr {
        Expr::Int(value) => (
            value.to_string(),
            if *value < 0 { PREC_UNARY } else { PREC_ATOM },
        ),
        Expr::Bool(value) => (style.bool_lit(*value).to_string(), PREC_ATOM),
        Expr::Var(name) => (name.clone(), PREC_ATOM),
        Expr::Tuple(items) => {
            let parts: Vec<String> = items.iter().map(|e| print_prec(e, style, 0)).collect();
            (style.tuple(&parts), PREC_ATOM)
        }
        Expr::Unary { op, expr } => {
            let operand = print_prec(expr, style, PREC_UNARY + 1);
            let text = match op {
                UnOp::Neg => format!("-{}", operand),
                UnOp::Not => format!("{}{}", style.not_op(), operand),
            };
            (text, PREC_UNARY)
        }
        Expr::Binary {
            op: BinOp::Pow,
            lhs,
            rhs,
        } => {
            let operand_parent = if style.pow_is_call() { 0 } else { PREC_ATOM };
            let base = print_prec(lhs, style, operand_parent);
            let exponent = print_prec(rhs, style, operand_parent);
            (style.pow(&base, &exponent), PREC_POW)
        }
        Expr::Binary { op, lhs, rhs } => {
            let prec = precedence(*op);
            let lhs = print_prec(lhs, style, prec);
            let rhs = print_prec(rhs, style, prec + 1);
            (format!("{} {} {}", lhs, style.binary(*op), rhs), prec)
        }
    };

    if prec < parent {
        format!("({})", text)
    } else {
        text
    }
}
