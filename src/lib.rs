pub mod classify;
pub mod codegen;
pub mod diagnostic;
pub mod ir;
pub mod lexeme;
pub mod lexer;
pub mod parser;
pub mod span;

pub use classify::{classify, CombineRule, MergeStrategy, Plan, Reason};
pub use codegen::{render, Backend, Dialect, Mode, OptionKey, RenderError, RenderOptions};
pub use ir::{BinOp, Comprehension, Expr, Generator, ReduceOp, ResultKind, Source, UnOp};

use diagnostic::Diagnostic;
use lexer::Lexer;
use parser::Parser;

/// Parse a comprehension source string into its IR.
///
/// The returned IR satisfies the invariants downstream code relies on:
/// flattened filter conjunctions, outer-to-inner generators, scoped
/// variable references, and a key expression exactly on dict shapes.
pub fn parse_source(source: &str) -> Result<Comprehension, Vec<Diagnostic>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    Parser::new(tokens).parse_comprehension()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_then_render_round_trip() {
        let ir = parse_source("sum(i*i for i in range(10) if i % 2 == 0)").unwrap();
        let out = render("rust", &ir, &RenderOptions::default()).unwrap();
        assert!(out.contains("pub fn program()"));
    }

    #[test]
    fn lex_errors_surface_as_diagnostics() {
        let err = parse_source("[x ? 2 for x in range(3)]").unwrap_err();
        assert!(!err.is_empty());
        assert!(err[0].message.contains("unexpected character"));
    }
}
