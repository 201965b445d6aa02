//! Table definitions.

use serde::{Deserialize, Serialize};

use super::index::IndexDef;

/// A column of a specific catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableColumn {
    pub table: String,
    pub column: String,
}

impl TableColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// How a child table hangs off its parent in a table hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentJoin {
    /// Parent table name.
    pub table: String,
    /// `(child column, parent column)` pairs.
    pub columns: Vec<(String, String)>,
}

/// A table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name (unique within the catalog).
    pub name: String,
    /// Column names.
    pub columns: Vec<String>,
    /// Primary key columns.
    pub primary_key: Vec<String>,
    /// Parent in the table hierarchy, if any.
    pub parent: Option<ParentJoin>,
    /// Single-table and spatial indexes on this table.
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Create a table with the given primary key columns.
    pub fn new(name: impl Into<String>, primary_key: &[&str]) -> Self {
        let primary_key: Vec<String> = primary_key.iter().map(|c| c.to_string()).collect();
        Self {
            name: name.into(),
            columns: primary_key.clone(),
            primary_key,
            parent: None,
            indexes: Vec::new(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
        self
    }

    /// Add several columns.
    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        for column in columns {
            self = self.with_column(*column);
        }
        self
    }

    /// Make this table a child of `parent`, joined on `(child, parent)`
    /// column pairs.
    pub fn with_parent(mut self, parent: impl Into<String>, columns: &[(&str, &str)]) -> Self {
        for (child, _) in columns {
            self = self.with_column(*child);
        }
        self.parent = Some(ParentJoin {
            table: parent.into(),
            columns: columns
                .iter()
                .map(|(c, p)| (c.to_string(), p.to_string()))
                .collect(),
        });
        self
    }

    /// Attach an index.
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Whether the table defines this column.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Parent table name, if any.
    pub fn parent_table(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.table.as_str())
    }

    /// Child column joined to the given parent column.
    pub fn child_column_for(&self, parent_column: &str) -> Option<&str> {
        self.parent.as_ref().and_then(|p| {
            p.columns
                .iter()
                .find(|(_, pc)| pc == parent_column)
                .map(|(cc, _)| cc.as_str())
        })
    }
}
