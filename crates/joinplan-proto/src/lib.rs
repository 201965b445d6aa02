//! joinplan input model and explain types.
//!
//! This crate defines the plain-data structures exchanged between a query
//! binder and the joinplan optimizer. Nothing in here performs planning; it
//! only describes what is being planned and what was chosen.
//!
//! # Modules
//!
//! - [`value`] - Literal values appearing in predicates
//! - [`expr`] - Scalar and boolean expressions over table columns
//! - [`query`] - Table groups, the binary join tree and the query goal
//! - [`explain`] - Serializable summaries of an optimized plan
//! - [`error`] - Input validation errors
//!
//! # Serialization
//!
//! All types derive `serde::Serialize` and `serde::Deserialize`, so hosts can
//! ship queries and explain output as JSON:
//!
//! ```ignore
//! use joinplan_proto::Query;
//!
//! let query: Query = serde_json::from_str(&json)?;
//! query.validate()?;
//! ```

pub mod error;
pub mod explain;
pub mod expr;
pub mod query;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use explain::{AccessSummary, CostSummary, JoinSummary, NodeSummary, PlanSummary};
pub use expr::{ColumnRef, Comparison, Expr, LogicalOp};
pub use query::{
    ConditionId, GroupJoin, JoinNode, JoinTree, JoinType, OrderByItem, Query, QueryGoal,
    TableGroup, TableGroupNode, TableSource,
};
pub use value::Value;
