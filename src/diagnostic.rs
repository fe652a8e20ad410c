use crate::span::Span;

/// A front-end diagnostic: what went wrong and where in the input expression.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render the diagnostic to stderr using ariadne.
    ///
    /// `source` is the comprehension text the span indexes into; it is
    /// displayed under the synthetic name `<expr>` since input arrives as a
    /// command-line string, not a file.
    pub fn render(&self, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        const NAME: &str = "<expr>";

        let mut report = Report::build(ReportKind::Error, NAME, self.span.start as usize)
            .with_message(&self.message)
            .with_label(
                Label::new((NAME, self.span.start as usize..self.span.end as usize))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            );

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((NAME, Source::from(source)))
            .unwrap();
    }
}

/// Render a list of diagnostics against the same input.
pub fn render_diagnostics(diagnostics: &[Diagnostic], source: &str) {
    for diag in diagnostics {
        diag.render(source);
    }
}
