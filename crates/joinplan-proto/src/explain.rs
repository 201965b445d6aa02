//! EXPLAIN result types.
//!
//! These are flattened, string-labelled copies of the optimizer's chosen
//! plan, suitable for logging or returning to a client as JSON.

use serde::{Deserialize, Serialize};

/// Explain output for one optimized query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Root of the chosen plan tree.
    pub root: NodeSummary,
    /// WHERE predicates no plan node evaluates; applied last.
    pub residual_conditions: Vec<String>,
    /// Cost of the whole plan.
    pub cost: CostSummary,
}

/// A node of the chosen plan tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeSummary {
    /// Access to one table group.
    Access(AccessSummary),
    /// Nested-loop join of two subplans.
    Join(JoinSummary),
}

impl NodeSummary {
    /// Cost of this subtree.
    pub fn cost(&self) -> &CostSummary {
        match self {
            NodeSummary::Access(a) => &a.cost,
            NodeSummary::Join(j) => &j.cost,
        }
    }
}

/// How one table group is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessSummary {
    /// Aliases of the tables in the group.
    pub tables: Vec<String>,
    /// Access kind, e.g. `IndexScan`, `GroupScan`, `GroupLoop`.
    pub kind: String,
    /// Index name(s), if any.
    pub index: Option<String>,
    /// Number of leading index columns bound by equality.
    pub equalities: usize,
    /// Whether the column after the equalities carries a range bound.
    pub has_range: bool,
    /// Ordering effectiveness classification.
    pub ordering: String,
    /// Whether base rows need not be fetched.
    pub covering: bool,
    /// Tables bound from outside that this access depends on.
    pub outer_tables: Vec<String>,
    /// Predicates evaluated by the access itself.
    pub conditions: Vec<String>,
    /// Tables whose rows must be produced.
    pub required_tables: Vec<String>,
    pub cost: CostSummary,
}

/// A join between two subplans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSummary {
    pub join_type: String,
    /// Output needs duplicate elimination.
    pub need_distinct: bool,
    /// Predicates evaluated at the join.
    pub conditions: Vec<String>,
    pub left: Box<NodeSummary>,
    pub right: Box<NodeSummary>,
    pub cost: CostSummary,
}

/// Cost estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    /// Estimated rows produced.
    pub estimated_rows: u64,
    /// Estimated I/O cost (page and row fetches).
    pub io_cost: f64,
    /// Estimated CPU cost (comparisons, predicate evaluation).
    pub cpu_cost: f64,
    /// Total weighted cost.
    pub total_cost: f64,
}

impl Default for CostSummary {
    fn default() -> Self {
        Self {
            estimated_rows: 0,
            io_cost: 0.0,
            cpu_cost: 0.0,
            total_cost: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(name: &str, rows: u64) -> NodeSummary {
        NodeSummary::Access(AccessSummary {
            tables: vec![name.to_string()],
            kind: "GroupScan".to_string(),
            index: None,
            equalities: 0,
            has_range: false,
            ordering: "NONE".to_string(),
            covering: false,
            outer_tables: vec![],
            conditions: vec![],
            required_tables: vec![name.to_string()],
            cost: CostSummary {
                estimated_rows: rows,
                io_cost: 1.0,
                cpu_cost: rows as f64,
                total_cost: 10.0 + rows as f64,
            },
        })
    }

    #[test]
    fn test_node_cost() {
        let node = access("t", 5);
        assert_eq!(node.cost().estimated_rows, 5);
    }

    #[test]
    fn test_summary_serialization() {
        let join = NodeSummary::Join(JoinSummary {
            join_type: "INNER".to_string(),
            need_distinct: false,
            conditions: vec!["a.x = b.x".to_string()],
            left: Box::new(access("a", 10)),
            right: Box::new(access("b", 1)),
            cost: CostSummary::default(),
        });
        let summary = PlanSummary {
            root: join,
            residual_conditions: vec![],
            cost: CostSummary::default(),
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"join_type\":\"INNER\""));
        let back: PlanSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
