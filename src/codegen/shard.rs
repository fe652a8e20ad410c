//! Per-worker accumulator selection for shard-and-merge emission.
//!
//! Every backend with genuine multi-worker execution follows the same
//! pattern: allocate one accumulator per worker at region entry, let each
//! worker write only its own, fold serially at region exit. The choice of
//! accumulator (and how shards combine) depends only on the IR, so it is
//! decided here once and reused by the Go and Julia emitters; the Rust
//! emitter consults it for its fold/reduce shape.

use crate::ir::{Comprehension, ReduceOp, ResultKind};

/// What each worker accumulates privately during a parallel region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Accumulator {
    /// Ordered chunk of the result list; chunks concatenate in index
    /// order, which preserves the sequential element order.
    List,
    /// Partial set; shards merge by union.
    Set,
    /// Partial map; shards merge in index order, later write wins.
    Map,
    /// Scalar partial reduction; shards combine with the op itself.
    Fold(ReduceOp),
}

impl Accumulator {
    pub fn of(ir: &Comprehension) -> Accumulator {
        match ir.kind {
            ResultKind::List => Accumulator::List,
            ResultKind::Set => Accumulator::Set,
            ResultKind::Dict => Accumulator::Map,
            ResultKind::Reduce(op) => Accumulator::Fold(op),
        }
    }

    /// For boolean folds, the element value that lets a worker stop
    /// scanning its chunk early (`any` latches on true, `all` on false).
    pub fn short_circuits_on(&self) -> Option<bool> {
        match self {
            Accumulator::Fold(ReduceOp::Any) => Some(true),
            Accumulator::Fold(ReduceOp::All) => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn accumulator(code: &str) -> Accumulator {
        Accumulator::of(&parse_source(code).expect("valid code"))
    }

    #[test]
    fn result_kinds_map_to_accumulators() {
        assert_eq!(accumulator("[x for x in range(3)]"), Accumulator::List);
        assert_eq!(accumulator("{x for x in range(3)}"), Accumulator::Set);
        assert_eq!(accumulator("{x: x for x in range(3)}"), Accumulator::Map);
        assert_eq!(
            accumulator("sum(x for x in range(3))"),
            Accumulator::Fold(ReduceOp::Sum)
        );
    }

    #[test]
    fn boolean_folds_short_circuit() {
        assert_eq!(
            accumulator("any(x > 1 for x in range(3))").short_circuits_on(),
            Some(true)
        );
        assert_eq!(
            accumulator("all(x > 1 for x in range(3))").short_circuits_on(),
            Some(false)
        );
        assert_eq!(
            accumulator("sum(x for x in range(3))").short_circuits_on(),
            None
        );
        assert_eq!(
            accumulator("[x for x in range(3)]").short_circuits_on(),
            None
        );
    }
}
