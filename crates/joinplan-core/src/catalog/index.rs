//! Index definitions.

use serde::{Deserialize, Serialize};

use super::table::TableColumn;

/// Outer-join semantics of a multi-table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupIndexJoin {
    /// Contains every leaf row that has its root, with optional tables between.
    Left,
    /// Contains every leaf row, with optional ancestors.
    Right,
}

/// Index flavour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Columns of one table.
    Table,
    /// Columns along one root-to-leaf path of a table hierarchy.
    Group {
        root_table: String,
        join_type: GroupIndexJoin,
    },
    /// A z-order over `dimensions` coordinate columns starting at
    /// `first_spatial_column`.
    Spatial {
        first_spatial_column: usize,
        dimensions: usize,
    },
}

/// One key column of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub table: String,
    pub column: String,
    pub ascending: bool,
    /// The stored key can reproduce the column value exactly.
    pub recoverable: bool,
}

impl IndexColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            ascending: true,
            recoverable: true,
        }
    }

    pub fn table_column(&self) -> TableColumn {
        TableColumn::new(self.table.clone(), self.column.clone())
    }
}

/// An ordered index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    /// Leaf-most table; the table whose rows the index entries point at.
    pub table: String,
    pub kind: IndexKind,
    /// Declared key columns.
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
}

impl IndexDef {
    /// Single-table index.
    pub fn table(name: impl Into<String>, table: impl Into<String>, columns: &[&str]) -> Self {
        let table = table.into();
        Self {
            name: name.into(),
            columns: columns
                .iter()
                .map(|c| IndexColumn::new(table.clone(), *c))
                .collect(),
            table,
            kind: IndexKind::Table,
            unique: false,
        }
    }

    /// Multi-table index over `(table, column)` pairs, root-most first.
    pub fn group(
        name: impl Into<String>,
        root_table: impl Into<String>,
        leaf_table: impl Into<String>,
        join_type: GroupIndexJoin,
        columns: &[(&str, &str)],
    ) -> Self {
        Self {
            name: name.into(),
            table: leaf_table.into(),
            kind: IndexKind::Group {
                root_table: root_table.into(),
                join_type,
            },
            columns: columns
                .iter()
                .map(|(t, c)| IndexColumn::new(*t, *c))
                .collect(),
            unique: false,
        }
    }

    /// Spatial index whose coordinate columns start at `first_spatial_column`.
    pub fn spatial(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: &[&str],
        first_spatial_column: usize,
        dimensions: usize,
    ) -> Self {
        let mut index = Self::table(name, table, columns);
        index.kind = IndexKind::Spatial {
            first_spatial_column,
            dimensions,
        };
        index
    }

    /// Mark unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark a key column as stored descending.
    pub fn descending(mut self, column: &str) -> Self {
        for c in self.columns.iter_mut().filter(|c| c.column == column) {
            c.ascending = false;
        }
        self
    }

    /// Mark a key column as not recoverable from the index entry.
    pub fn unrecoverable(mut self, column: &str) -> Self {
        for c in self.columns.iter_mut().filter(|c| c.column == column) {
            c.recoverable = false;
        }
        self
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, IndexKind::Group { .. })
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self.kind, IndexKind::Spatial { .. })
    }

    /// Root-most table covered by the index.
    pub fn root_table(&self) -> &str {
        match &self.kind {
            IndexKind::Group { root_table, .. } => root_table,
            _ => &self.table,
        }
    }
}

/// A full-text index over columns of one table hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTextIndexDef {
    pub name: String,
    /// Table whose rows the index returns.
    pub table: String,
    pub columns: Vec<TableColumn>,
}

impl FullTextIndexDef {
    pub fn new(name: impl Into<String>, table: impl Into<String>, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns
                .iter()
                .map(|(t, c)| TableColumn::new(*t, *c))
                .collect(),
        }
    }

    /// Whether the index covers this column.
    pub fn indexes(&self, column: &TableColumn) -> bool {
        self.columns.contains(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_index_builder() {
        let idx = IndexDef::table("orders_cust_total", "orders", &["cust_id", "total"])
            .descending("total")
            .unrecoverable("cust_id")
            .unique();
        assert_eq!(idx.columns.len(), 2);
        assert!(idx.columns[0].ascending);
        assert!(!idx.columns[1].ascending);
        assert!(!idx.columns[0].recoverable);
        assert!(idx.unique);
        assert_eq!(idx.root_table(), "orders");
    }

    #[test]
    fn test_group_index_builder() {
        let idx = IndexDef::group(
            "cust_name_order_date",
            "customers",
            "orders",
            GroupIndexJoin::Left,
            &[("customers", "name"), ("orders", "placed_at")],
        );
        assert!(idx.is_group());
        assert_eq!(idx.root_table(), "customers");
        assert_eq!(idx.table, "orders");
        assert_eq!(idx.columns[0].table, "customers");
    }

    #[test]
    fn test_full_text_indexes() {
        let ft = FullTextIndexDef::new("docs_ft", "docs", &[("docs", "body"), ("docs", "title")]);
        assert!(ft.indexes(&TableColumn::new("docs", "body")));
        assert!(!ft.indexes(&TableColumn::new("docs", "author")));
    }
}
