//! joinplan core - join enumeration and access path selection.
//!
//! Given a bound [`Query`](joinplan_proto::Query), a [`Catalog`] and a
//! [`CostEstimator`], the optimizer builds a join hypergraph, enumerates
//! connected subgraph pairs with DPhyp and picks the cheapest access for
//! every table group at every point of the join order.
//!
//! ```ignore
//! use joinplan_core::{optimize, Catalog, OptimizerConfig, StatisticsCostModel, TableStatistics};
//!
//! let model = StatisticsCostModel::new(&stats, &catalog);
//! let plan = optimize(&query, &catalog, &model, &OptimizerConfig::default())?;
//! ```

pub mod access;
pub mod bitset;
pub mod catalog;
pub mod config;
pub mod cost;
pub mod enumerate;
pub mod error;
pub mod explain;
pub mod graph;
pub mod picker;
pub mod plan;
pub mod query;

pub use access::{GroupGoal, OrderEffectiveness};
pub use bitset::TableBitSet;
pub use catalog::{
    Catalog, FullTextIndexDef, GroupIndexJoin, IndexColumn, IndexDef, IndexKind, TableColumn,
    TableDef,
};
pub use config::OptimizerConfig;
pub use cost::{
    CostEstimate, CostEstimator, IndexScanShape, PlanCostEstimator, SelectivityKind,
    StatisticsCostModel, TableStatistics,
};
pub use enumerate::{JoinCandidate, JoinEnumerator, JoinEvaluator};
pub use error::{Error, Result};
pub use explain::{explain, explain_text};
pub use graph::{JoinGraph, JoinOperator, OperatorId};
pub use picker::{CandidatePlan, JoinPicker, OptimizedPlan};
pub use plan::{AccessKind, AccessPlan, IndexScan, JoinPlan, PlanCache, PlanNode};
pub use query::QueryContext;

/// Re-export protocol types.
pub use joinplan_proto as proto;

use joinplan_proto::Query;

/// Optimize `query` in one call.
pub fn optimize(
    query: &Query,
    catalog: &Catalog,
    estimator: &dyn CostEstimator,
    config: &OptimizerConfig,
) -> Result<OptimizedPlan> {
    let ctx = QueryContext::new(query, catalog)?;
    JoinPicker::new(&ctx, config, estimator).optimize()
}
