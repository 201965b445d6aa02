//! Input model error types.

use thiserror::Error;

/// Errors raised while validating or decoding a query description.
#[derive(Debug, Error)]
pub enum Error {
    /// A condition id does not point into the condition arena.
    #[error("condition {id} out of range (query has {count} conditions)")]
    ConditionOutOfRange { id: usize, count: usize },

    /// Two table sources share the same alias.
    #[error("duplicate table alias: {0}")]
    DuplicateAlias(String),

    /// A table group node refers to a parent that does not precede it.
    #[error("invalid parent {parent} for node {node} in group rooted at {root}")]
    InvalidGroupParent {
        root: String,
        node: usize,
        parent: usize,
    },

    /// A table group has no tables.
    #[error("empty table group")]
    EmptyGroup,

    /// Anything else structurally wrong with the query.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// JSON decoding failed.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}
