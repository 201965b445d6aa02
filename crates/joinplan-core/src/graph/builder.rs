//! Construction of a [`JoinGraph`] from a query.

use std::collections::HashMap;

use joinplan_proto::{ConditionId, Expr, JoinTree, JoinType};
use tracing::{debug, instrument};

use super::operator::{operator_conflict, JoinOperator};
use super::JoinGraph;
use crate::bitset::TableBitSet;
use crate::config::OptimizerConfig;
use crate::error::{Error, Result};
use crate::query::QueryContext;

/// Functions whose result is defined for NULL inputs.
const NULL_TOLERANT_FUNCTIONS: &[&str] =
    &["isNull", "isUnknown", "isTrue", "isFalse", "coalesce", "ifnull"];

impl JoinGraph {
    /// Build the hypergraph for `ctx`'s join tree and WHERE predicates.
    #[instrument(skip(ctx, config), fields(tables = ctx.groups().len()))]
    pub fn build(ctx: &QueryContext<'_>, config: &OptimizerConfig) -> Result<Self> {
        let count = ctx.groups().len();
        let max = config.table_limit();
        if count > max {
            return Err(Error::TooManyTables { count, max });
        }

        let mut tables = Vec::with_capacity(count);
        let mut alias_bits = HashMap::new();
        for (bit, group) in ctx.groups().iter().enumerate() {
            tables.push(group.root_alias().unwrap_or_default().to_string());
            for alias in group.aliases() {
                alias_bits.insert(alias.to_string(), bit);
            }
        }

        let graph = JoinGraph {
            tables,
            alias_bits,
            operators: Vec::new(),
            edges: Vec::new(),
            where_conditions: ctx.where_conditions().to_vec(),
            nullable: TableBitSet::EMPTY,
            has_outer_joins: false,
        };
        let mut builder = GraphBuilder {
            ctx,
            graph,
            next_table: 0,
        };

        builder.init_ses(&ctx.query().tree);
        let syntax_count = builder.graph.operators.len();
        builder.calc_tes();
        builder.add_where_conditions();
        builder.lift_inner_conditions(syntax_count);

        let graph = builder.graph;
        debug!(
            operators = graph.operators.len(),
            edges = graph.edge_count(),
            residual = graph.where_conditions.len(),
            "join graph built"
        );
        graph.dump();
        Ok(graph)
    }
}

struct GraphBuilder<'a, 'q> {
    ctx: &'a QueryContext<'q>,
    graph: JoinGraph,
    next_table: usize,
}

impl GraphBuilder<'_, '_> {
    fn condition(&self, id: ConditionId) -> &Expr {
        self.ctx.condition(id)
    }

    /// Tables referenced by `expr`, and whether it tolerates NULL inputs.
    fn expression_tables(&self, expr: &Expr) -> (TableBitSet, bool) {
        (self.graph.tables_of(expr), is_null_tolerant(expr))
    }

    fn conditions_tables(&self, conditions: &[ConditionId]) -> (TableBitSet, bool) {
        let mut tables = TableBitSet::EMPTY;
        let mut null_tolerant = false;
        for id in conditions {
            let (t, n) = self.expression_tables(self.condition(*id));
            tables |= t;
            null_tolerant |= n;
        }
        (tables, null_tolerant)
    }

    /// Table of a bare column reference.
    fn column_table(&self, expr: &Expr) -> TableBitSet {
        expr.as_column()
            .and_then(|c| self.graph.table_of_alias(&c.table))
            .map(TableBitSet::single)
            .unwrap_or_default()
    }

    /// Create one operator per join node, children before parents, with
    /// syntactic sides and the initial TES.
    fn init_ses(&mut self, tree: &JoinTree) -> (Option<usize>, TableBitSet) {
        let join = match tree {
            JoinTree::Group(_) => {
                let bit = TableBitSet::single(self.next_table);
                self.next_table += 1;
                return (None, bit);
            }
            JoinTree::Join(join) => join,
        };

        let (left_op, left_tables) = self.init_ses(&join.left);
        let (right_op, right_tables) = self.init_ses(&join.right);
        // A right join is a left join with its inputs swapped.
        let (join_type, (left_op, left_tables), (right_op, right_tables)) =
            if join.join_type == JoinType::Right {
                (JoinType::Left, (right_op, right_tables), (left_op, left_tables))
            } else {
                (join.join_type, (left_op, left_tables), (right_op, right_tables))
            };

        let mut op = JoinOperator::for_join(join_type, join.conditions.clone());
        for child in [left_op, right_op].into_iter().flatten() {
            if !self.graph.operators[child].all_inner_joins {
                op.all_inner_joins = false;
            }
        }
        op.left = left_op;
        op.right = right_op;
        op.left_tables = left_tables;
        op.right_tables = right_tables;

        let (predicate_tables, null_tolerant) = self.conditions_tables(&op.conditions);
        op.predicate_tables = predicate_tables;
        let tables = left_tables | right_tables;
        op.tes = if null_tolerant && !op.all_inner_joins {
            tables
        } else {
            tables & predicate_tables
        };

        match join_type {
            JoinType::Left | JoinType::Semi | JoinType::SemiAlreadyDistinct
            | JoinType::SemiIfDistinct => {
                self.graph.nullable |= right_tables;
            }
            JoinType::FullOuter => self.graph.nullable |= tables,
            _ => {}
        }
        if join_type.is_outer() {
            self.graph.has_outer_joins = true;
        }

        let index = self.graph.operators.len();
        self.graph.operators.push(op);
        for child in [left_op, right_op].into_iter().flatten() {
            self.graph.operators[child].parent = Some(index);
        }
        (Some(index), tables)
    }

    /// Grow each join operator's TES with reordering conflicts and emit its
    /// edge. Operators are stored children first, so one forward pass sees
    /// every descendant finished before its ancestors.
    fn calc_tes(&mut self) {
        let count = self.graph.operators.len();
        let all_inner = self
            .graph
            .operators
            .last()
            .map(|root| root.all_inner_joins)
            .unwrap_or(true);

        for index in 0..count {
            if let Some(left) = self.graph.operators[index].left {
                self.add_conflicts(index, left, true);
            }
            if let Some(right) = self.graph.operators[index].right {
                self.add_conflicts(index, right, false);
            }

            let op = &mut self.graph.operators[index];
            // Inner cross products of an all-inner tree are dropped later and
            // left to connectivity repair; everything else must reach both
            // inputs.
            if !(all_inner && op.tes.is_empty()) {
                if !op.tes.overlaps(op.left_tables) {
                    op.tes |= op.left_tables.min_subset();
                }
                if !op.tes.overlaps(op.right_tables) {
                    op.tes |= op.right_tables.min_subset();
                }
            }
        }

        for index in 0..count {
            let op = &self.graph.operators[index];
            let right = op.tes & op.right_tables;
            let left = op.tes - right;
            self.graph.edges.push(left);
            self.graph.edges.push(right);
        }
    }

    fn add_conflicts(&mut self, o1: usize, o2: usize, left: bool) {
        let ops = &self.graph.operators;
        let conflict = if left {
            ops[o1].predicate_tables.overlaps(self.right_path_tables(o1, o2))
                && operator_conflict(ops[o2].join_type, ops[o1].join_type)
        } else {
            ops[o1].predicate_tables.overlaps(self.left_path_tables(o1, o2))
                && operator_conflict(ops[o1].join_type, ops[o2].join_type)
        };
        if conflict {
            let tes = ops[o2].tes;
            self.graph.operators[o1].tes |= tes;
        }
        let (l, r) = (self.graph.operators[o2].left, self.graph.operators[o2].right);
        if let Some(l) = l {
            self.add_conflicts(o1, l, left);
        }
        if let Some(r) = r {
            self.add_conflicts(o1, r, left);
        }
    }

    /// Left tables on the path from `o2` up to, but excluding, `o1`.
    fn left_path_tables(&self, o1: usize, o2: usize) -> TableBitSet {
        let ops = &self.graph.operators;
        let mut tables = TableBitSet::EMPTY;
        let mut current = Some(o2);
        while let Some(o3) = current.filter(|&o| o != o1) {
            tables |= ops[o3].left_tables;
            current = ops[o3].parent;
        }
        if ops[o2].is_commutative() {
            tables |= ops[o2].right_tables;
        }
        tables
    }

    /// Right tables on the path from `o2` up to, but excluding, `o1`.
    fn right_path_tables(&self, o1: usize, o2: usize) -> TableBitSet {
        let ops = &self.graph.operators;
        let mut tables = TableBitSet::EMPTY;
        let mut current = Some(o2);
        while let Some(o3) = current.filter(|&o| o != o1) {
            tables |= ops[o3].right_tables;
            current = ops[o3].parent;
        }
        if ops[o2].is_commutative() {
            tables |= ops[o2].left_tables;
        }
        tables
    }

    /// Turn WHERE comparisons between disjoint table sets into edges.
    ///
    /// Comparisons that touch a null-extended table stay in the WHERE list:
    /// as a join edge they could be evaluated below the outer join.
    fn add_where_conditions(&mut self) {
        let nullable = self.graph.nullable;
        let conditions = std::mem::take(&mut self.graph.where_conditions);
        let mut remaining = Vec::with_capacity(conditions.len());
        for id in conditions {
            let expr = self.condition(id);
            let placed = match expr {
                Expr::Compare { left, right, .. } => self
                    .comparison_sides(left, right, TableBitSet::EMPTY)
                    .filter(|(column, other)| {
                        !other.is_empty() && !(*column | *other).overlaps(nullable)
                    }),
                _ => None,
            };
            match placed {
                Some((l, r)) => {
                    self.graph
                        .push_operator(JoinOperator::for_condition(id, l, r), l, r);
                }
                None => remaining.push(id),
            }
        }
        self.graph.where_conditions = remaining;
    }

    /// Split a comparison into a bare-column side and the other side.
    ///
    /// The left operand is tried first. Returns `None` when neither operand
    /// is a column outside `exclude`, or when the other operand tolerates
    /// NULL or reaches into `exclude`.
    fn comparison_sides(
        &self,
        left: &Expr,
        right: &Expr,
        exclude: TableBitSet,
    ) -> Option<(TableBitSet, TableBitSet)> {
        for (column, other) in [(left, right), (right, left)] {
            let column_tables = self.column_table(column);
            if column_tables.is_empty() || column_tables.overlaps(exclude) {
                continue;
            }
            let (other_tables, null_tolerant) = self.expression_tables(other);
            if null_tolerant || other_tables.overlaps(exclude) {
                return None;
            }
            if !column_tables.overlaps(other_tables) {
                return Some((column_tables, other_tables));
            }
            return None;
        }
        None
    }

    /// Lift the predicates of all-inner subtrees into edges of their own.
    ///
    /// Only operators of the join tree are visited; the condition operators
    /// appended along the way are not.
    fn lift_inner_conditions(&mut self, syntax_count: usize) {
        let mut removed = vec![false; syntax_count];
        for index in 0..syntax_count {
            if !self.graph.operators[index].all_inner_joins {
                continue;
            }

            let own = std::mem::take(&mut self.graph.operators[index].conditions);
            let kept = self.add_join_conditions(own, TableBitSet::EMPTY);
            // Predicates over no graph table at all are pinned to one table.
            let anchor = self.graph.operators[index].tables().min_subset();
            let mut unplaced = Vec::new();
            for id in kept {
                if self.graph.tables_of(self.condition(id)).is_empty() {
                    self.graph.push_operator(
                        JoinOperator::for_condition(id, anchor, TableBitSet::EMPTY),
                        anchor,
                        TableBitSet::EMPTY,
                    );
                } else {
                    unplaced.push(id);
                }
            }
            self.graph.operators[index].conditions = unplaced;

            if let Some(parent) = self.graph.operators[index].parent {
                let parent_op = &self.graph.operators[parent];
                let on_right = parent_op.right == Some(index);
                let may_filter = match parent_op.join_type {
                    JoinType::Left => on_right,
                    JoinType::FullOuter => false,
                    _ => true,
                };
                if !parent_op.all_inner_joins && !parent_op.conditions.is_empty() && may_filter {
                    let other_side = if on_right {
                        parent_op.left_tables
                    } else {
                        parent_op.right_tables
                    };
                    let conditions = std::mem::take(&mut self.graph.operators[parent].conditions);
                    let kept = self.add_join_conditions(conditions, other_side);
                    self.graph.operators[parent].conditions = kept;
                }
            }

            if self.graph.operators[index].tes.is_empty() {
                removed[index] = true;
            }
        }
        self.remove_operators(&removed);
    }

    /// Add an edge for every predicate that splits into two disjoint sides
    /// avoiding `exclude`; returns the predicates that did not.
    fn add_join_conditions(
        &mut self,
        conditions: Vec<ConditionId>,
        exclude: TableBitSet,
    ) -> Vec<ConditionId> {
        let mut kept = Vec::new();
        for id in conditions {
            let sides = match self.condition(id) {
                Expr::Compare { left, right, .. } => self.comparison_sides(left, right, exclude),
                expr => {
                    let tables = self.graph.tables_of(expr);
                    let left = tables.min_subset();
                    let rest = tables - left;
                    (!tables.is_empty() && !tables.overlaps(exclude)).then_some((left, rest))
                }
            };
            match sides {
                Some((l, r)) => {
                    self.graph
                        .push_operator(JoinOperator::for_condition(id, l, r), l, r);
                }
                None => kept.push(id),
            }
        }
        kept
    }

    /// Drop the flagged join-tree operators and renumber the rest.
    fn remove_operators(&mut self, removed: &[bool]) {
        if !removed.iter().any(|r| *r) {
            return;
        }
        let mut mapping = Vec::with_capacity(self.graph.operators.len());
        let mut next = 0;
        for index in 0..self.graph.operators.len() {
            if removed.get(index).copied().unwrap_or(false) {
                mapping.push(None);
            } else {
                mapping.push(Some(next));
                next += 1;
            }
        }

        let operators = std::mem::take(&mut self.graph.operators);
        let edges = std::mem::take(&mut self.graph.edges);
        for (index, mut op) in operators.into_iter().enumerate() {
            if mapping[index].is_none() {
                continue;
            }
            op.parent = op.parent.and_then(|p| mapping[p]);
            op.left = op.left.and_then(|p| mapping[p]);
            op.right = op.right.and_then(|p| mapping[p]);
            self.graph.operators.push(op);
            self.graph.edges.push(edges[2 * index]);
            self.graph.edges.push(edges[2 * index + 1]);
        }
    }
}

/// Whether `expr` contains a function that yields a value for NULL input.
fn is_null_tolerant(expr: &Expr) -> bool {
    match expr {
        Expr::Function { name, args } => {
            NULL_TOLERANT_FUNCTIONS
                .iter()
                .any(|f| f.eq_ignore_ascii_case(name))
                || args.iter().any(is_null_tolerant)
        }
        Expr::Compare { left, right, .. } => is_null_tolerant(left) || is_null_tolerant(right),
        Expr::InList { operand, list } => {
            is_null_tolerant(operand) || list.iter().any(is_null_tolerant)
        }
        Expr::Logical { operands, .. } => operands.iter().any(is_null_tolerant),
        Expr::Column(_) | Expr::Literal(_) | Expr::Parameter(_) => false,
    }
}
