//! The join hypergraph.
//!
//! A [`JoinGraph`] is built once per query from the binary join tree and the
//! WHERE predicates. Every table group of the tree becomes one node (one bit
//! of a [`TableBitSet`]); every join operator contributes one hyperedge whose
//! two sides are the tables that must be present on either input before the
//! operator may be applied. Inner-join and WHERE predicates that connect
//! independent table sets are lifted into edges of their own, which gives the
//! enumerator more freedom than the syntactic tree does.
//!
//! # Edges
//!
//! Edges live in a dense array, two slots per operator: slot `2i` is the
//! left side of operator `i` and slot `2i + 1` the right side, so `e ^ 1`
//! always names the opposite side of edge slot `e`.

mod builder;
mod operator;

use std::collections::HashMap;

use joinplan_proto::{ConditionId, Expr};
use tracing::trace;

use crate::bitset::TableBitSet;

pub use operator::{commute_join_type, operator_conflict, JoinOperator, OperatorId, OperatorOrigin};

/// Join operators and hyperedges over the table groups of one query.
#[derive(Debug, Clone)]
pub struct JoinGraph {
    /// Label (root alias) of each table, by bit position.
    tables: Vec<String>,
    /// Bit position of every alias.
    alias_bits: HashMap<String, usize>,
    operators: Vec<JoinOperator>,
    edges: Vec<TableBitSet>,
    /// WHERE predicates that did not become edges.
    where_conditions: Vec<ConditionId>,
    /// Tables that may be null-extended by an outer join.
    nullable: TableBitSet,
    has_outer_joins: bool,
}

impl JoinGraph {
    /// Number of tables (graph nodes).
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Set of every table.
    pub fn all_tables(&self) -> TableBitSet {
        TableBitSet::first_n(self.tables.len())
    }

    /// Label of table `index`.
    pub fn table_label(&self, index: usize) -> &str {
        self.tables.get(index).map(String::as_str).unwrap_or("?")
    }

    /// Bit of the table holding `alias`, if it is part of the graph.
    pub fn table_of_alias(&self, alias: &str) -> Option<usize> {
        self.alias_bits.get(alias).copied()
    }

    /// Tables referenced by an expression. Columns of tables outside the
    /// graph are ignored.
    pub fn tables_of(&self, expr: &Expr) -> TableBitSet {
        let mut tables = TableBitSet::EMPTY;
        expr.visit_columns(&mut |column| {
            if let Some(bit) = self.alias_bits.get(&column.table) {
                tables |= TableBitSet::single(*bit);
            }
        });
        tables
    }

    pub fn operators(&self) -> &[JoinOperator] {
        &self.operators
    }

    pub fn operator(&self, id: OperatorId) -> &JoinOperator {
        &self.operators[id.0]
    }

    /// Operator that owns edge slot `edge`.
    pub fn operator_of_edge(&self, edge: usize) -> OperatorId {
        OperatorId(edge / 2)
    }

    /// The dense edge array.
    pub fn edges(&self) -> &[TableBitSet] {
        &self.edges
    }

    /// Number of hyperedges.
    pub fn edge_count(&self) -> usize {
        self.edges.len() / 2
    }

    /// WHERE predicates left for scans or the executor.
    pub fn where_conditions(&self) -> &[ConditionId] {
        &self.where_conditions
    }

    /// Tables on the null-extended side of some outer join.
    pub fn nullable_tables(&self) -> TableBitSet {
        self.nullable
    }

    /// Whether the join tree contains an outer or full join.
    pub fn has_outer_joins(&self) -> bool {
        self.has_outer_joins
    }

    /// Append an operator and its edge.
    fn push_operator(&mut self, op: JoinOperator, left: TableBitSet, right: TableBitSet) {
        self.operators.push(op);
        self.edges.push(left);
        self.edges.push(right);
    }

    /// Connect two table sets with a predicate-free inner edge.
    pub(crate) fn add_connector(&mut self, left: TableBitSet, right: TableBitSet) {
        trace!(left = %left, right = %right, "adding connector edge");
        self.push_operator(JoinOperator::connector(left, right), left, right);
    }

    fn dump(&self) {
        for (i, op) in self.operators.iter().enumerate() {
            trace!(
                operator = i,
                left = %self.edges[2 * i],
                right = %self.edges[2 * i + 1],
                "{}",
                op
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, TableDef};
    use crate::config::OptimizerConfig;
    use crate::query::QueryContext;
    use joinplan_proto::{JoinTree, JoinType, Query};

    #[test]
    fn test_connector_edge() {
        let catalog = Catalog::new()
            .with_table(TableDef::new("x", &["id"]))
            .with_table(TableDef::new("y", &["id"]));
        let query = Query::new(JoinTree::join(
            JoinType::Inner,
            JoinTree::table("x", "x"),
            JoinTree::table("y", "y"),
            vec![],
        ));
        let ctx = QueryContext::new(&query, &catalog).unwrap();
        let mut graph = JoinGraph::build(&ctx, &OptimizerConfig::default()).unwrap();
        assert_eq!(graph.edge_count(), 0);

        graph.add_connector(TableBitSet::single(0), TableBitSet::single(1));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges()[1], TableBitSet::single(1));
        assert_eq!(graph.operator_of_edge(1), OperatorId(0));
        assert_eq!(graph.operators()[0].origin, OperatorOrigin::Connector);
    }
}
