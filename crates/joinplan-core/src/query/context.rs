//! Per-query lookup tables shared by every optimizer stage.

use std::collections::{HashMap, HashSet};

use joinplan_proto::{ColumnRef, ConditionId, Expr, Query, TableGroup};

use super::equivalence::EquivalenceFinder;
use crate::catalog::Catalog;
use crate::error::{Error, Result};

/// Where a table alias lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Catalog table name.
    pub table: String,
    /// Position of the owning group in [`QueryContext::groups`].
    pub group: usize,
    /// Node position inside the group.
    pub node: usize,
}

/// Resolved view of a [`Query`] against a [`Catalog`].
#[derive(Debug)]
pub struct QueryContext<'q> {
    query: &'q Query,
    catalog: &'q Catalog,
    groups: Vec<&'q TableGroup>,
    tables: HashMap<String, TableInfo>,
    outer_tables: HashSet<String>,
    equivalences: EquivalenceFinder,
}

impl<'q> QueryContext<'q> {
    /// Validate `query` and resolve every alias and column it mentions.
    pub fn new(query: &'q Query, catalog: &'q Catalog) -> Result<Self> {
        query.validate()?;

        let groups = query.tree.groups();
        let mut tables = HashMap::new();
        for (group_idx, group) in groups.iter().enumerate() {
            for (node_idx, node) in group.nodes.iter().enumerate() {
                catalog.table(&node.source.table)?;
                tables.insert(
                    node.source.alias.clone(),
                    TableInfo {
                        table: node.source.table.clone(),
                        group: group_idx,
                        node: node_idx,
                    },
                );
            }
        }

        let context = Self {
            query,
            catalog,
            groups,
            tables,
            outer_tables: query.goal.outer_tables.iter().cloned().collect(),
            equivalences: EquivalenceFinder::from_pairs(&query.equivalences),
        };
        context.check_columns()?;
        Ok(context)
    }

    fn check_columns(&self) -> Result<()> {
        let goal = &self.query.goal;
        let exprs = self
            .query
            .conditions
            .iter()
            .chain(goal.ordering.iter().map(|o| &o.expr))
            .chain(goal.grouping.iter())
            .chain(goal.projection.iter());
        for expr in exprs {
            for column in expr.columns() {
                self.check_column(column, expr)?;
            }
        }
        for (a, b) in &self.query.equivalences {
            for column in [a, b] {
                if let Some(info) = self.tables.get(&column.table) {
                    self.catalog.check_column(&info.table, &column.column)?;
                }
            }
        }
        Ok(())
    }

    fn check_column(&self, column: &ColumnRef, expr: &Expr) -> Result<()> {
        if self.outer_tables.contains(&column.table) {
            return Ok(());
        }
        match self.tables.get(&column.table) {
            Some(info) => self.catalog.check_column(&info.table, &column.column),
            None => Err(Error::UnsupportedPredicateShape(format!(
                "{} references unknown table {}",
                expr, column.table
            ))),
        }
    }

    pub fn query(&self) -> &'q Query {
        self.query
    }

    pub fn catalog(&self) -> &'q Catalog {
        self.catalog
    }

    /// Table groups in join-tree order.
    pub fn groups(&self) -> &[&'q TableGroup] {
        &self.groups
    }

    pub fn group(&self, index: usize) -> Option<&'q TableGroup> {
        self.groups.get(index).copied()
    }

    /// Resolution of a table alias.
    pub fn table_info(&self, alias: &str) -> Option<&TableInfo> {
        self.tables.get(alias)
    }

    /// Group holding `alias`.
    pub fn group_of(&self, alias: &str) -> Option<usize> {
        self.tables.get(alias).map(|t| t.group)
    }

    /// Whether `alias` is bound by an enclosing query.
    pub fn is_outer_table(&self, alias: &str) -> bool {
        self.outer_tables.contains(alias)
    }

    /// Predicate by id. Ids were range-checked at construction.
    pub fn condition(&self, id: ConditionId) -> &'q Expr {
        &self.query.conditions[id.index()]
    }

    /// Predicate ids of the WHERE clause.
    pub fn where_conditions(&self) -> &'q [ConditionId] {
        &self.query.where_conditions
    }

    pub fn equivalences(&self) -> &EquivalenceFinder {
        &self.equivalences
    }

    /// Groups referenced by an expression, ignoring outer tables.
    pub fn groups_referenced(&self, expr: &Expr) -> Vec<usize> {
        let mut out: Vec<usize> = expr
            .columns()
            .into_iter()
            .filter_map(|c| self.group_of(&c.table))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}
