//! Cost estimation.
//!
//! Access-path selection compares candidates by [`CostEstimate`]. The numbers
//! come from a [`CostEstimator`]; [`StatisticsCostModel`] is the default one,
//! backed by [`TableStatistics`]. [`PlanCostEstimator`] strings the building
//! blocks of one access plan together and pushes row limits down.

mod estimate;
mod estimator;
mod model;
mod planner;
mod statistics;

pub use estimate::CostEstimate;
pub use estimator::{CostEstimator, IndexScanShape, SelectivityKind};
pub use model::StatisticsCostModel;
pub use planner::PlanCostEstimator;
pub use statistics::TableStatistics;
