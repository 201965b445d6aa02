//! Join order enumeration.
//!
//! [`JoinEnumerator`] walks the connected subgraph / complement pairs of a
//! [`JoinGraph`](crate::graph::JoinGraph) and hands every legal join to a
//! [`JoinEvaluator`], which builds and compares the plans. The enumerator
//! never looks at costs itself.

mod dphyp;

use joinplan_proto::JoinType;

use crate::bitset::TableBitSet;
use crate::error::Result;
use crate::graph::{JoinGraph, OperatorId};

pub use dphyp::JoinEnumerator;

/// One join proposed by the enumerator.
#[derive(Debug)]
pub struct JoinCandidate<'a, P> {
    pub left: TableBitSet,
    pub left_plan: &'a P,
    pub right: TableBitSet,
    pub right_plan: &'a P,
    /// `left ∪ right`.
    pub joined: TableBitSet,
    pub join_type: JoinType,
    /// Operators whose predicates apply at this join.
    pub operators: &'a [OperatorId],
    /// Operators whose predicates touch the joined tables but apply above
    /// this join, either because they reach further tables or because
    /// their edge cannot be crossed yet.
    pub outside: &'a [OperatorId],
}

/// Plan construction callbacks driven by the enumerator.
pub trait JoinEvaluator {
    /// Per-subset plan state.
    type Plan;

    /// Plan for the single table `table` (the set `tables`).
    fn evaluate_table(
        &mut self,
        graph: &JoinGraph,
        tables: TableBitSet,
        table: usize,
    ) -> Result<Self::Plan>;

    /// Fold `candidate` into the best plan for `candidate.joined`.
    ///
    /// `existing` is the plan already stored for that set, if any. The
    /// returned plan replaces it, so it must never be worse.
    fn evaluate_join(
        &mut self,
        graph: &JoinGraph,
        candidate: JoinCandidate<'_, Self::Plan>,
        existing: Option<Self::Plan>,
    ) -> Result<Self::Plan>;
}
