//! Rendering: the adapter from `(target, IR, options)` to emitted text.
//!
//! The adapter owns the option-filtering contract ("signature drift
//! protection"): callers may pass one over-full option set covering several
//! backends, and each backend receives exactly the options it declares.
//! Unknown targets are errors; unknown options never are.

use std::fmt;

use crate::classify::classify;
use crate::ir::Comprehension;

pub mod backend;
pub(crate) mod exprs;
pub(crate) mod shard;

pub use backend::Backend;

/// The option names backends can declare. Filtering is a set intersection
/// over these keys, realized as plain field selection on [`RenderOptions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKey {
    FnName,
    Parallel,
    IntType,
    Mode,
    Unsafe,
    Explain,
    Threads,
    Dialect,
}

impl OptionKey {
    pub fn name(&self) -> &'static str {
        match self {
            OptionKey::FnName => "fn_name",
            OptionKey::Parallel => "parallel",
            OptionKey::IntType => "int_type",
            OptionKey::Mode => "mode",
            OptionKey::Unsafe => "unsafe",
            OptionKey::Explain => "explain",
            OptionKey::Threads => "threads",
            OptionKey::Dialect => "dialect",
        }
    }
}

/// Lowering mode for the Julia backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Loops,
    Broadcast,
}

impl Mode {
    pub fn from_name(name: &str) -> Option<Mode> {
        match name {
            "loops" => Some(Mode::Loops),
            "broadcast" => Some(Mode::Broadcast),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Loops => "loops",
            Mode::Broadcast => "broadcast",
        }
    }
}

/// SQL dialect for the query backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgresql,
}

impl Dialect {
    pub fn from_name(name: &str) -> Option<Dialect> {
        match name {
            "sqlite" => Some(Dialect::Sqlite),
            "postgresql" => Some(Dialect::Postgresql),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgresql => "postgresql",
        }
    }
}

/// Caller-supplied rendering options. Every field is optional; each backend
/// sees only the fields it declares (see [`RenderOptions::filtered`]), so
/// passing a superset is always safe.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderOptions {
    /// Name of the emitted function (backend-specific default otherwise).
    pub fn_name: Option<String>,
    pub parallel: Option<bool>,
    /// Integer type for the Rust backend (default "i32").
    pub int_type: Option<String>,
    /// Lowering mode for the Julia backend (auto heuristic when absent).
    pub mode: Option<Mode>,
    /// Julia `@inbounds` opt-in; a caller-explicit memory-safety trade-off,
    /// never the default.
    pub unchecked: Option<bool>,
    /// Emit explanatory NOTE comments (Julia default on, SQL default off).
    pub explain: Option<bool>,
    /// Thread-count hint recorded in Julia output.
    pub threads: Option<u32>,
    pub dialect: Option<Dialect>,
}

impl RenderOptions {
    /// Keep only the fields named in `accepted`; everything else resets to
    /// `None`. Unknown extras are dropped silently, by design: this is what
    /// lets one caller drive several backends with a single option set.
    pub fn filtered(&self, accepted: &[OptionKey]) -> RenderOptions {
        let mut out = RenderOptions::default();
        for key in accepted {
            match key {
                OptionKey::FnName => out.fn_name = self.fn_name.clone(),
                OptionKey::Parallel => out.parallel = self.parallel,
                OptionKey::IntType => out.int_type = self.int_type.clone(),
                OptionKey::Mode => out.mode = self.mode,
                OptionKey::Unsafe => out.unchecked = self.unchecked,
                OptionKey::Explain => out.explain = self.explain,
                OptionKey::Threads => out.threads = self.threads,
                OptionKey::Dialect => out.dialect = self.dialect,
            }
        }
        out
    }
}

/// Rendering failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderError {
    /// `target` named no known backend.
    UnknownBackend { target: String },
    /// An emitter met an IR shape it does not recognize. This is an
    /// IR/emitter exhaustiveness defect, not a user error, and is raised
    /// loudly instead of emitting best-effort text.
    Internal { detail: String },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::UnknownBackend { target } => {
                let known: Vec<&str> = backend::ALL.iter().map(|b| b.name()).collect();
                write!(f, "unknown target '{}'; known: {}", target, known.join(", "))
            }
            RenderError::Internal { detail } => {
                write!(f, "internal codegen error: {}", detail)
            }
        }
    }
}

impl std::error::Error for RenderError {}

impl RenderError {
    pub(crate) fn internal(detail: impl Into<String>) -> RenderError {
        RenderError::Internal {
            detail: detail.into(),
        }
    }
}

/// Render a comprehension for one target.
///
/// Pure: identical arguments yield byte-identical text. The safety plan is
/// computed here, once, from the IR and the *filtered* parallel flag, and
/// handed to the backend unchanged.
pub fn render(
    target: &str,
    ir: &Comprehension,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    let backend = Backend::from_name(target).ok_or_else(|| RenderError::UnknownBackend {
        target: target.to_string(),
    })?;
    let filtered = options.filtered(backend.accepted());
    let plan = classify(ir, filtered.parallel.unwrap_or(false));
    backend.emit(ir, &plan, &filtered)
}

/// Line buffer with indentation, shared by all emitters.
pub(crate) struct Writer {
    lines: Vec<String>,
    indent: usize,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            indent: 0,
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", "    ".repeat(self.indent), text));
        }
    }

    pub fn blank(&mut self) {
        self.lines.push(String::new());
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        debug_assert!(self.indent > 0);
        self.indent -= 1;
    }

    pub fn finish(self) -> String {
        self.lines.join("\n")
    }
}
