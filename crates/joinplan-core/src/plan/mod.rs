//! Physical plan trees and the per-subset plan cache.
//!
//! A [`PlanNode`] is either an [`AccessPlan`] for one table group or a
//! nested-loop [`JoinPlan`] over two subplans. Every node carries its own
//! [`CostEstimate`](crate::cost::CostEstimate).

mod access;
mod cache;

use joinplan_proto::{ConditionId, JoinType};

use crate::cost::CostEstimate;

pub use access::{AccessKind, AccessPlan, IndexScan};
pub use cache::PlanCache;

/// Nested-loop join of two subplans.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    pub join_type: JoinType,
    /// Duplicate rows must be removed from the output.
    pub need_distinct: bool,
    /// Predicates evaluated at this join rather than by the inner access.
    pub conditions: Vec<ConditionId>,
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub cost: CostEstimate,
}

/// A node of a physical plan tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Access(AccessPlan),
    Join(JoinPlan),
}

impl PlanNode {
    pub fn cost(&self) -> &CostEstimate {
        match self {
            PlanNode::Access(a) => &a.cost,
            PlanNode::Join(j) => &j.cost,
        }
    }

    /// The access that drives the outermost loop; its order is the order
    /// of the whole subtree.
    pub fn leftmost_access(&self) -> &AccessPlan {
        match self {
            PlanNode::Access(a) => a,
            PlanNode::Join(j) => j.left.leftmost_access(),
        }
    }

    /// Group aliases, left to right.
    pub fn tables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.visit_accesses(&mut |a| out.extend(a.tables.iter().map(String::as_str)));
        out
    }

    /// Every predicate some node of the subtree evaluates.
    pub fn evaluated_conditions(&self) -> Vec<ConditionId> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_conditions(&self, out: &mut Vec<ConditionId>) {
        match self {
            PlanNode::Access(a) => out.extend(a.conditions.iter().copied()),
            PlanNode::Join(j) => {
                out.extend(j.conditions.iter().copied());
                j.left.collect_conditions(out);
                j.right.collect_conditions(out);
            }
        }
    }

    /// Call `f` for every access, left to right.
    pub fn visit_accesses<'a>(&'a self, f: &mut dyn FnMut(&'a AccessPlan)) {
        match self {
            PlanNode::Access(a) => f(a),
            PlanNode::Join(j) => {
                j.left.visit_accesses(f);
                j.right.visit_accesses(f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::OrderEffectiveness;

    fn access(alias: &str, conditions: Vec<ConditionId>, rows: u64) -> PlanNode {
        PlanNode::Access(AccessPlan {
            kind: AccessKind::GroupScan,
            tables: vec![alias.to_string()],
            required_tables: vec![alias.to_string()],
            bound_tables: vec![],
            conditions,
            ordering: OrderEffectiveness::None,
            covering: false,
            cost: CostEstimate::new(rows, 1.0, rows as f64),
        })
    }

    #[test]
    fn test_tree_helpers() {
        let left = access("a", vec![ConditionId(2)], 10);
        let right = access("b", vec![ConditionId(0)], 1);
        let cost = left.cost().nest(right.cost());
        let join = PlanNode::Join(JoinPlan {
            join_type: JoinType::Inner,
            need_distinct: false,
            conditions: vec![ConditionId(1), ConditionId(0)],
            left: Box::new(left),
            right: Box::new(right),
            cost,
        });

        assert_eq!(join.tables(), vec!["a", "b"]);
        assert_eq!(join.leftmost_access().tables, vec!["a".to_string()]);
        assert_eq!(
            join.evaluated_conditions(),
            vec![ConditionId(0), ConditionId(1), ConditionId(2)]
        );
        assert_eq!(join.cost().estimated_rows, 10);
    }
}
