//! Columns an access must produce.

use std::collections::{BTreeMap, BTreeSet};

use joinplan_proto::{ColumnRef, Expr};

/// Columns still needed from each table alias after an access runs.
///
/// A table marked with [`require_all`](Self::require_all) needs every
/// column, as for `SELECT *`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequiredColumns {
    columns: BTreeMap<String, BTreeSet<String>>,
    all: BTreeSet<String>,
}

impl RequiredColumns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, column: &ColumnRef) {
        self.columns
            .entry(column.table.clone())
            .or_default()
            .insert(column.column.clone());
    }

    /// Require every column of `alias`.
    pub fn require_all(&mut self, alias: &str) {
        self.all.insert(alias.to_string());
    }

    /// Require the columns of `expr` that `keep` accepts.
    pub fn require_expr(&mut self, expr: &Expr, keep: &dyn Fn(&ColumnRef) -> bool) {
        expr.visit_columns(&mut |c| {
            if keep(c) {
                self.require(c);
            }
        });
    }

    /// Whether anything at all is needed from `alias`.
    pub fn is_required_table(&self, alias: &str) -> bool {
        self.all.contains(alias) || self.columns.get(alias).is_some_and(|c| !c.is_empty())
    }

    pub fn all_columns(&self, alias: &str) -> bool {
        self.all.contains(alias)
    }

    /// Named columns needed from `alias`.
    pub fn columns_of(&self, alias: &str) -> impl Iterator<Item = &str> {
        self.columns
            .get(alias)
            .into_iter()
            .flat_map(|c| c.iter().map(String::as_str))
    }

    /// Aliases with any requirement, sorted.
    pub fn tables(&self) -> Vec<&str> {
        let mut out: BTreeSet<&str> = self.all.iter().map(String::as_str).collect();
        out.extend(
            self.columns
                .iter()
                .filter(|(_, c)| !c.is_empty())
                .map(|(t, _)| t.as_str()),
        );
        out.into_iter().collect()
    }

    /// Union with `other`.
    pub fn merge(&mut self, other: &RequiredColumns) {
        for (table, columns) in &other.columns {
            self.columns
                .entry(table.clone())
                .or_default()
                .extend(columns.iter().cloned());
        }
        self.all.extend(other.all.iter().cloned());
    }
}
