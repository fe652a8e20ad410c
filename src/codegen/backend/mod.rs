//! The six backend emitters behind one closed dispatch.
//!
//! The backend set is fixed and known at compile time, so dispatch is a
//! `match` over an enum rather than a runtime-populated registry. Each
//! backend declares the options it accepts; the adapter in
//! [`crate::codegen::render`] filters caller options down to that set
//! before the emitter ever sees them.

pub(crate) mod csharp;
pub(crate) mod go;
pub(crate) mod julia;
pub(crate) mod rust;
pub(crate) mod sql;
pub(crate) mod ts;

use crate::classify::Plan;
use crate::codegen::{OptionKey, RenderError, RenderOptions};
use crate::ir::{BinOp, Comprehension, Expr, ResultKind};

/// One target language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Rust,
    TypeScript,
    Go,
    CSharp,
    Julia,
    Sql,
}

/// All backends, in the order they are listed to users.
pub const ALL: [Backend; 6] = [
    Backend::Rust,
    Backend::TypeScript,
    Backend::Go,
    Backend::CSharp,
    Backend::Julia,
    Backend::Sql,
];

impl Backend {
    pub fn from_name(name: &str) -> Option<Backend> {
        match name {
            "rust" => Some(Backend::Rust),
            "ts" => Some(Backend::TypeScript),
            "go" => Some(Backend::Go),
            "csharp" => Some(Backend::CSharp),
            "julia" => Some(Backend::Julia),
            "sql" => Some(Backend::Sql),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Rust => "rust",
            Backend::TypeScript => "ts",
            Backend::Go => "go",
            Backend::CSharp => "csharp",
            Backend::Julia => "julia",
            Backend::Sql => "sql",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Rust => "Rust (Rayon)",
            Backend::TypeScript => "TypeScript (Web Worker)",
            Backend::Go => "Go (goroutines)",
            Backend::CSharp => "C# (PLINQ)",
            Backend::Julia => "Julia (threads)",
            Backend::Sql => "SQL",
        }
    }

    /// The options this backend accepts, i.e. its public capability contract.
    pub fn accepted(&self) -> &'static [OptionKey] {
        match self {
            Backend::Rust => &[OptionKey::FnName, OptionKey::Parallel, OptionKey::IntType],
            Backend::TypeScript => &[OptionKey::FnName, OptionKey::Parallel],
            Backend::Go => &[OptionKey::FnName, OptionKey::Parallel],
            Backend::CSharp => &[OptionKey::FnName, OptionKey::Parallel],
            Backend::Julia => &[
                OptionKey::FnName,
                OptionKey::Parallel,
                OptionKey::Mode,
                OptionKey::Unsafe,
                OptionKey::Explain,
                OptionKey::Threads,
            ],
            Backend::Sql => &[OptionKey::FnName, OptionKey::Dialect, OptionKey::Explain],
        }
    }

    pub fn emit(
        &self,
        ir: &Comprehension,
        plan: &Plan,
        options: &RenderOptions,
    ) -> Result<String, RenderError> {
        match self {
            Backend::Rust => rust::emit(ir, plan, options),
            Backend::TypeScript => ts::emit(ir, plan, options),
            Backend::Go => go::emit(ir, plan, options),
            Backend::CSharp => csharp::emit(ir, plan, options),
            Backend::Julia => julia::emit(ir, plan, options),
            Backend::Sql => sql::emit(ir, plan, options),
        }
    }
}

/// Check the IR invariants every emitter relies on. A violation is an
/// exhaustiveness defect between parser and emitters, reported loudly
/// rather than papered over with best-effort text.
pub(crate) fn validate(ir: &Comprehension) -> Result<(), RenderError> {
    if ir.generators.is_empty() {
        return Err(RenderError::internal("comprehension has no generators"));
    }
    match (ir.kind, &ir.key) {
        (ResultKind::Dict, None) => Err(RenderError::internal(
            "dict comprehension is missing its key expression",
        )),
        (ResultKind::Dict, Some(_)) => Ok(()),
        (_, Some(_)) => Err(RenderError::internal(
            "key expression present on a non-dict comprehension",
        )),
        (_, None) => Ok(()),
    }
}

/// Whether an expression is boolean-valued (drives emitted result types).
pub(crate) fn expr_is_boolean(expr: &Expr) -> bool {
    match expr {
        Expr::Bool(_) => true,
        Expr::Unary { op, .. } => matches!(op, crate::ir::UnOp::Not),
        Expr::Binary { op, .. } => {
            op.is_comparison() || matches!(op, BinOp::And | BinOp::Or)
        }
        _ => false,
    }
}

/// Whether any expression in the comprehension uses `**` (some targets
/// lower it to a helper function that must be emitted alongside).
pub(crate) fn mentions_pow(ir: &Comprehension) -> bool {
    std::iter::once(&ir.element)
        .chain(ir.key.iter())
        .chain(ir.generators.iter().flat_map(|g| g.filters.iter()))
        .any(|e| e.mentions_pow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    #[test]
    fn backend_names_round_trip() {
        for backend in ALL {
            assert_eq!(Backend::from_name(backend.name()), Some(backend));
        }
        assert_eq!(Backend::from_name("fortran"), None);
    }

    #[test]
    fn every_backend_accepts_fn_name() {
        for backend in ALL {
            assert!(backend.accepted().contains(&OptionKey::FnName));
        }
    }

    #[test]
    fn sql_does_not_accept_parallel() {
        assert!(!Backend::Sql.accepted().contains(&OptionKey::Parallel));
    }

    #[test]
    fn validate_rejects_key_invariant_violations() {
        let mut ir = parse_source("{i: i*i for i in range(3)}").unwrap();
        ir.key = None;
        assert!(validate(&ir).is_err());

        let mut ir = parse_source("[i for i in range(3)]").unwrap();
        ir.key = Some(crate::ir::Expr::var("i"));
        assert!(validate(&ir).is_err());
    }

    #[test]
    fn boolean_expression_detection() {
        let ir = parse_source("[x % 2 == 0 for x in range(3)]").unwrap();
        assert!(expr_is_boolean(&ir.element));
        let ir = parse_source("[x * 2 for x in range(3)]").unwrap();
        assert!(!expr_is_boolean(&ir.element));
    }

    #[test]
    fn pow_detection_covers_filters() {
        let ir = parse_source("[x for x in range(3) if x ** 2 > 4]").unwrap();
        assert!(mentions_pow(&ir));
        let ir = parse_source("[x for x in range(3)]").unwrap();
        assert!(!mentions_pow(&ir));
    }
}
