//! Parallel-safety classification.
//!
//! Decides, from the IR shape alone, whether a comprehension can execute
//! across workers without changing its observable result. The decision is
//! target-independent: every backend consumes the same `Plan`, and a
//! backend may ignore a safe plan (SQL has no user-visible concurrency)
//! but must never contradict an unsafe one.

use serde::Serialize;

use crate::ir::{Comprehension, ResultKind, Source};

/// Why a shape was (or was not) cleared for parallel execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Reason {
    /// One generator over a literal range: chunkable with known bounds.
    SingleRangeGenerator,
    /// Splitting an outer generator across workers can break the
    /// closure-capture dependency between nested generators; a
    /// cross-product chunking scheme is never attempted.
    NestedGenerators,
    /// A named collection guarantees neither cardinality nor random
    /// access at generation time, so static chunking is off the table.
    OpaqueSource,
    /// Reduction op is not associative/commutative. Vacuous today; keeps
    /// future op additions failing safe instead of silently wrong.
    UnsupportedReduction,
}

/// How workers' partial results are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MergeStrategy {
    /// Chunks reassembled in index order; the emitted list matches the
    /// sequential element order exactly.
    IndexPreservingCollect,
    /// Per-worker shards merged in one serial pass; the result is equal
    /// to the sequential one as a set/mapping/scalar.
    UnorderedShardMerge(CombineRule),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CombineRule {
    /// On duplicate dict keys, the later shard's write wins. Shards are
    /// merged in chunk-index order, so "later" means later in the
    /// sequential iteration order.
    LastWriteWins,
}

/// Classifier output: constructed fresh per render call, consumed by one
/// emitter, never cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub safe: bool,
    pub reason: Reason,
    pub merge: Option<MergeStrategy>,
}

/// Classify a comprehension for parallel execution.
///
/// The shape is always classified; `requested_parallel = false` forces
/// `safe = false` regardless, so the sequential path is an explicit
/// function of user intent plus shape rather than shape alone.
pub fn classify(ir: &Comprehension, requested_parallel: bool) -> Plan {
    let (shape_safe, reason) = classify_shape(ir);
    let safe = requested_parallel && shape_safe;
    Plan {
        safe,
        reason,
        merge: if safe { Some(merge_strategy(ir)) } else { None },
    }
}

fn classify_shape(ir: &Comprehension) -> (bool, Reason) {
    let single = match ir.generators.as_slice() {
        [gen] => gen,
        _ => return (false, Reason::NestedGenerators),
    };

    if let Source::Named(_) = single.source {
        return (false, Reason::OpaqueSource);
    }

    if let ResultKind::Reduce(op) = ir.kind {
        if !op.is_associative() {
            return (false, Reason::UnsupportedReduction);
        }
    }

    (true, Reason::SingleRangeGenerator)
}

fn merge_strategy(ir: &Comprehension) -> MergeStrategy {
    match ir.kind {
        ResultKind::List => MergeStrategy::IndexPreservingCollect,
        ResultKind::Set | ResultKind::Dict | ResultKind::Reduce(_) => {
            MergeStrategy::UnorderedShardMerge(CombineRule::LastWriteWins)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn classify_code(code: &str, parallel: bool) -> Plan {
        classify(&parse_source(code).expect("valid code"), parallel)
    }

    #[test]
    fn single_range_generator_is_safe() {
        let plan = classify_code("[x*x for x in range(10) if x % 2 == 0]", true);
        assert!(plan.safe);
        assert_eq!(plan.reason, Reason::SingleRangeGenerator);
        assert_eq!(plan.merge, Some(MergeStrategy::IndexPreservingCollect));
    }

    #[test]
    fn parallel_not_requested_forces_sequential() {
        let plan = classify_code("[x*x for x in range(10)]", false);
        assert!(!plan.safe);
        // The shape classification is still computed and observable
        assert_eq!(plan.reason, Reason::SingleRangeGenerator);
        assert_eq!(plan.merge, None);
    }

    #[test]
    fn nested_generators_fall_back() {
        let plan = classify_code("[(i, j) for i in range(3) for j in range(3)]", true);
        assert!(!plan.safe);
        assert_eq!(plan.reason, Reason::NestedGenerators);
    }

    #[test]
    fn opaque_source_falls_back() {
        let plan = classify_code("[x + 1 for x in data]", true);
        assert!(!plan.safe);
        assert_eq!(plan.reason, Reason::OpaqueSource);
    }

    #[test]
    fn nested_generators_take_priority_over_opaque_sources() {
        let plan = classify_code("[x for x in data for y in rows]", true);
        assert_eq!(plan.reason, Reason::NestedGenerators);
    }

    #[test]
    fn reductions_use_shard_merge() {
        let plan = classify_code("sum(i*i for i in range(100))", true);
        assert!(plan.safe);
        assert_eq!(
            plan.merge,
            Some(MergeStrategy::UnorderedShardMerge(CombineRule::LastWriteWins))
        );
    }

    #[test]
    fn dict_uses_shard_merge() {
        let plan = classify_code("{i: i*i for i in range(10)}", true);
        assert!(plan.safe);
        assert_eq!(
            plan.merge,
            Some(MergeStrategy::UnorderedShardMerge(CombineRule::LastWriteWins))
        );
    }

    #[test]
    fn every_declared_reduction_is_associative() {
        for code in [
            "sum(i for i in range(5))",
            "count(i for i in range(5))",
            "max(i for i in range(5))",
            "min(i for i in range(5))",
            "any(i > 2 for i in range(5))",
            "all(i > 2 for i in range(5))",
        ] {
            let plan = classify_code(code, true);
            assert!(plan.safe, "expected safe plan for {}", code);
        }
    }
}
