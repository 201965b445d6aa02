//! The catalog: tables, hierarchies and their indexes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::index::{FullTextIndexDef, IndexDef};
use super::table::{TableColumn, TableDef};
use crate::error::{Error, Result};

/// Schema metadata consulted during access-path selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    tables: BTreeMap<String, TableDef>,
    group_indexes: Vec<IndexDef>,
    full_text_indexes: Vec<FullTextIndexDef>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Add a table.
    pub fn with_table(mut self, table: TableDef) -> Self {
        self.add_table(table);
        self
    }

    /// Add a multi-table index.
    pub fn with_group_index(mut self, index: IndexDef) -> Self {
        self.group_indexes.push(index);
        self
    }

    /// Add a full-text index.
    pub fn with_full_text_index(mut self, index: FullTextIndexDef) -> Self {
        self.full_text_indexes.push(index);
        self
    }

    /// Add or replace a table.
    pub fn add_table(&mut self, table: TableDef) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Look up a table.
    pub fn table(&self, name: &str) -> Result<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// All tables, by name.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    /// Multi-table indexes whose leaf is `table`.
    pub fn group_indexes_for(&self, table: &str) -> impl Iterator<Item = &IndexDef> + '_ {
        let table = table.to_string();
        self.group_indexes.iter().filter(move |i| i.table == table)
    }

    /// All full-text indexes.
    pub fn full_text_indexes(&self) -> &[FullTextIndexDef] {
        &self.full_text_indexes
    }

    /// Root of the hierarchy containing `table`.
    pub fn root_of(&self, table: &str) -> Result<&str> {
        self.ancestry(table)?
            .into_iter()
            .next()
            .map(|t| t.name.as_str())
            .ok_or_else(|| Error::UnknownTable(table.to_string()))
    }

    /// Whether two tables belong to the same hierarchy.
    pub fn same_hierarchy(&self, a: &str, b: &str) -> bool {
        match (self.root_of(a), self.root_of(b)) {
            (Ok(ra), Ok(rb)) => ra == rb,
            _ => false,
        }
    }

    /// Tables from the root down to `table`.
    pub fn ancestry(&self, table: &str) -> Result<Vec<&TableDef>> {
        let mut current = self.table(table)?;
        let mut chain = vec![current];
        while let Some(parent) = current.parent_table() {
            if chain.len() > self.tables.len() {
                break;
            }
            current = self.table(parent)?;
            chain.push(current);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Hierarchical key of `table`: every ancestor's primary key from the
    /// root down, then its own.
    pub fn hkey_columns(&self, table: &str) -> Result<Vec<TableColumn>> {
        let mut columns = Vec::new();
        for def in self.ancestry(table)? {
            for pk in &def.primary_key {
                columns.push(TableColumn::new(def.name.clone(), pk.clone()));
            }
        }
        Ok(columns)
    }

    /// Check that `column` exists on `table`.
    pub fn check_column(&self, table: &str, column: &str) -> Result<()> {
        if self.table(table)?.has_column(column) {
            Ok(())
        } else {
            Err(Error::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }
}
