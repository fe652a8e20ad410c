//! Target-independent representation of one comprehension.
//!
//! The IR is pure data: the parser builds it, the classifier inspects it,
//! and the backend emitters walk it. Invariants established at construction
//! time and relied on downstream:
//!
//! - generators are ordered outer-to-inner, and there is at least one;
//! - every filter is a flat conjunct: chained comparisons and top-level
//!   `and` chains are split into separate predicates;
//! - `key` is present exactly when `kind` is `Dict` (for `Dict`, `element`
//!   holds the value expression).

use serde::Serialize;

/// What the comprehension produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ResultKind {
    List,
    Set,
    Dict,
    Reduce(ReduceOp),
}

/// Reduction over a generator expression. Every op here is associative and
/// commutative, which is what makes parallel folding sound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReduceOp {
    Sum,
    Count,
    Max,
    Min,
    Any,
    All,
}

impl ReduceOp {
    pub fn from_name(name: &str) -> Option<ReduceOp> {
        match name {
            "sum" => Some(ReduceOp::Sum),
            "count" => Some(ReduceOp::Count),
            "max" => Some(ReduceOp::Max),
            "min" => Some(ReduceOp::Min),
            "any" => Some(ReduceOp::Any),
            "all" => Some(ReduceOp::All),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Count => "count",
            ReduceOp::Max => "max",
            ReduceOp::Min => "min",
            ReduceOp::Any => "any",
            ReduceOp::All => "all",
        }
    }

    /// Whether partial results from independent chunks can be combined in
    /// any grouping/order. Every current op qualifies; the check exists so
    /// a future non-associative op degrades to sequential instead of
    /// silently producing wrong parallel code.
    pub fn is_associative(&self) -> bool {
        match self {
            ReduceOp::Sum
            | ReduceOp::Count
            | ReduceOp::Max
            | ReduceOp::Min
            | ReduceOp::Any
            | ReduceOp::All => true,
        }
    }

    /// Ops whose result (and element expression) is boolean.
    pub fn is_boolean(&self) -> bool {
        matches!(self, ReduceOp::Any | ReduceOp::All)
    }
}

/// One `for`-clause: a bound variable over a source, plus filters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Generator {
    pub var: String,
    pub source: Source,
    pub filters: Vec<Expr>,
}

/// Where a generator draws its elements from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Source {
    /// Literal integer range: cardinality and random access known at
    /// generation time. `step` is always positive.
    Range { start: i64, stop: i64, step: i64 },
    /// Externally supplied collection of unknown cardinality.
    Named(String),
}

impl Source {
    pub fn is_range(&self) -> bool {
        matches!(self, Source::Range { .. })
    }

    /// Number of elements a literal range yields.
    pub fn range_len(&self) -> Option<i64> {
        match self {
            Source::Range { start, stop, step } => {
                let span = (stop - start).max(0);
                Some((span + step - 1) / step)
            }
            Source::Named(_) => None,
        }
    }
}

/// The root IR node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comprehension {
    pub kind: ResultKind,
    /// Element expression; the value expression when `kind` is `Dict`.
    pub element: Expr,
    /// Key expression, present exactly when `kind` is `Dict`.
    pub key: Option<Expr>,
    pub generators: Vec<Generator>,
}

impl Comprehension {
    /// Named sources in order of first appearance; these become parameters
    /// of the emitted function in every backend.
    pub fn named_sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for gen in &self.generators {
            if let Source::Named(name) = &gen.source {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("IR serialization cannot fail")
    }
}

/// Binary operators of the expression subset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum UnOp {
    Neg,
    Not,
}

/// An expression over in-scope bound variables.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Expr {
    Int(i64),
    Bool(bool),
    Var(String),
    Tuple(Vec<Expr>),
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Split a top-level `and` chain into its conjuncts. This is the
    /// flat-conjunction normalization applied to every filter at IR
    /// construction time.
    pub fn into_conjunction(self) -> Vec<Expr> {
        match self {
            Expr::Binary {
                op: BinOp::And,
                lhs,
                rhs,
            } => {
                let mut parts = lhs.into_conjunction();
                parts.extend(rhs.into_conjunction());
                parts
            }
            other => vec![other],
        }
    }

    /// True if the tree contains any node matching the predicate.
    pub fn contains(&self, pred: &impl Fn(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Expr::Int(_) | Expr::Bool(_) | Expr::Var(_) => false,
            Expr::Tuple(items) => items.iter().any(|e| e.contains(pred)),
            Expr::Unary { expr, .. } => expr.contains(pred),
            Expr::Binary { lhs, rhs, .. } => lhs.contains(pred) || rhs.contains(pred),
        }
    }

    /// True if the tree contains a `**` node (some targets lower it to a
    /// helper function rather than an operator).
    pub fn mentions_pow(&self) -> bool {
        self.contains(&|e| matches!(e, Expr::Binary { op: BinOp::Pow, .. }))
    }
}
