pub mod golden;
pub mod ir;
pub mod render;
pub mod targets;

use polyglot::diagnostic::render_diagnostics;
use polyglot::Comprehension;

/// Parse the input expression, or report diagnostics and exit non-zero.
pub fn parse_or_exit(code: &str) -> Comprehension {
    match polyglot::parse_source(code) {
        Ok(ir) => ir,
        Err(diagnostics) => {
            render_diagnostics(&diagnostics, code);
            std::process::exit(1);
        }
    }
}
