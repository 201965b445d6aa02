//! Optimizer error types.

use thiserror::Error;

/// Errors surfaced by graph construction, enumeration and access-path
/// selection.
#[derive(Debug, Error)]
pub enum Error {
    /// The join graph has more tables than a bitset key can address.
    #[error("too many tables in join graph: {count} (maximum {max})")]
    TooManyTables { count: usize, max: usize },

    /// No plan covers every table, even after connecting the graph.
    #[error("could not build a connected join graph over {tables:?}")]
    GraphCreationFailed { tables: Vec<String> },

    /// A predicate cannot be placed on the join hypergraph.
    #[error("unsupported predicate shape: {0}")]
    UnsupportedPredicateShape(String),

    /// Full-text predicates match more than one full-text index.
    #[error("ambiguous full text index: {first} and {second}")]
    AmbiguousFullTextIndex { first: String, second: String },

    /// Full-text predicates match no full-text index.
    #[error("no full text index for {columns:?}")]
    NoFullTextIndexFound { columns: Vec<String> },

    /// The cost estimator failed.
    #[error("cost estimation failed: {0}")]
    CostEstimation(String),

    /// A table source names a table the catalog does not define.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A column reference names a column the table does not define.
    #[error("unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    /// The input query is malformed.
    #[error("invalid query: {0}")]
    Proto(#[from] joinplan_proto::Error),
}

/// Result alias used throughout the optimizer.
pub type Result<T> = std::result::Result<T, Error>;
