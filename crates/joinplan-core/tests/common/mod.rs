//! Shared fixtures: an in-memory dataset and a tiny executor for plan trees
//! and for the unoptimized join tree.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use joinplan_core::{
    Catalog, OptimizedPlan, OptimizerConfig, PlanNode, QueryContext, StatisticsCostModel,
    TableDef, TableStatistics,
};
use joinplan_proto::{Expr, JoinTree, JoinType, LogicalOp, Query, Value};

/// One output row, keyed by `alias.column`. Missing keys are NULL.
pub type Row = BTreeMap<String, Value>;

/// Rows per catalog table.
#[derive(Default)]
pub struct Dataset {
    tables: HashMap<String, Vec<BTreeMap<String, Value>>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table from a column list and rows of integer values.
    pub fn with_rows(mut self, table: &str, columns: &[&str], rows: &[&[i64]]) -> Self {
        let rows = rows
            .iter()
            .map(|values| {
                columns
                    .iter()
                    .zip(values.iter())
                    .map(|(c, v)| (c.to_string(), Value::Int64(*v)))
                    .collect()
            })
            .collect();
        self.tables.insert(table.to_string(), rows);
        self
    }

    pub fn statistics(&self) -> TableStatistics {
        let stats = TableStatistics::new();
        for (table, rows) in &self.tables {
            stats.set_count(table, rows.len() as u64);
        }
        stats
    }

    fn scan(&self, alias: &str, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.iter()
                            .map(|(c, v)| (format!("{}.{}", alias, c), v.clone()))
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A flat table with an `id` primary key.
pub fn flat_table(name: &str, columns: &[&str]) -> TableDef {
    TableDef::new(name, &["id"]).with_columns(columns)
}

/// Optimize with the statistics of `data`.
pub fn optimize(query: &Query, catalog: &Catalog, data: &Dataset) -> OptimizedPlan {
    let stats = data.statistics();
    let model = StatisticsCostModel::new(&stats, catalog);
    joinplan_core::optimize(query, catalog, &model, &OptimizerConfig::default()).unwrap()
}

fn eval(expr: &Expr, row: &Row) -> Option<Value> {
    match expr {
        Expr::Column(c) => row.get(&c.to_string()).cloned(),
        Expr::Literal(Value::Null) => None,
        Expr::Literal(v) => Some(v.clone()),
        Expr::Compare { op, left, right } => {
            let ordering = eval(left, row)?.compare(&eval(right, row)?)?;
            Some(Value::Bool(op.accepts(ordering)))
        }
        Expr::InList { operand, list } => {
            let value = eval(operand, row)?;
            let found = list.iter().any(|item| {
                eval(item, row)
                    .and_then(|v| value.compare(&v))
                    .is_some_and(|o| o.is_eq())
            });
            Some(Value::Bool(found))
        }
        Expr::Logical { op, operands } => {
            let values: Vec<bool> = operands.iter().map(|o| holds(o, row)).collect();
            Some(Value::Bool(match op {
                LogicalOp::And => values.iter().all(|v| *v),
                LogicalOp::Or => values.iter().any(|v| *v),
                LogicalOp::Not => !values.first().copied().unwrap_or(false),
            }))
        }
        Expr::Parameter(_) | Expr::Function { .. } => None,
    }
}

fn holds(expr: &Expr, row: &Row) -> bool {
    matches!(eval(expr, row), Some(Value::Bool(true)))
}

fn all_hold(query: &Query, ids: &[joinplan_proto::ConditionId], row: &Row) -> bool {
    ids.iter()
        .all(|id| query.condition(*id).is_some_and(|e| holds(e, row)))
}

fn merged(a: &Row, b: &Row) -> Row {
    let mut out = a.clone();
    out.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

/// Run a chosen plan, then the residual predicates.
pub fn execute_plan(plan: &OptimizedPlan, ctx: &QueryContext<'_>, data: &Dataset) -> Vec<Row> {
    let query = ctx.query();
    execute_node(&plan.root, &Row::new(), ctx, data)
        .into_iter()
        .filter(|row| all_hold(query, &plan.residual_conditions, row))
        .collect()
}

/// Rows of `node`, evaluated for one row of the enclosing loops.
fn execute_node(node: &PlanNode, outer: &Row, ctx: &QueryContext<'_>, data: &Dataset) -> Vec<Row> {
    let query = ctx.query();
    match node {
        PlanNode::Access(access) => {
            let [alias] = access.tables.as_slice() else {
                panic!("fixture groups have one table, got {:?}", access.tables);
            };
            let table = &ctx.table_info(alias).unwrap().table;
            data.scan(alias, table)
                .into_iter()
                .filter(|row| all_hold(query, &access.conditions, &merged(outer, row)))
                .collect()
        }
        PlanNode::Join(join) if join.join_type == JoinType::FullOuter => {
            // The inner side does not depend on the outer rows.
            let right = execute_node(&join.right, outer, ctx, data);
            let mut right_matched = vec![false; right.len()];
            let mut out = Vec::new();
            for left in execute_node(&join.left, outer, ctx, data) {
                let context = merged(outer, &left);
                let mut matched = false;
                for (i, r) in right.iter().enumerate() {
                    if all_hold(query, &join.conditions, &merged(&context, r)) {
                        matched = true;
                        right_matched[i] = true;
                        out.push(merged(&left, r));
                    }
                }
                if !matched {
                    out.push(left);
                }
            }
            out.extend(
                right
                    .into_iter()
                    .zip(right_matched)
                    .filter(|(_, m)| !m)
                    .map(|(r, _)| r),
            );
            out
        }
        PlanNode::Join(join) => {
            let mut out = Vec::new();
            for left in execute_node(&join.left, outer, ctx, data) {
                let context = merged(outer, &left);
                let matches: Vec<Row> = execute_node(&join.right, &context, ctx, data)
                    .into_iter()
                    .filter(|right| all_hold(query, &join.conditions, &merged(&context, right)))
                    .collect();
                match join.join_type {
                    JoinType::Semi => {
                        if !matches.is_empty() {
                            out.push(left);
                        }
                    }
                    JoinType::Left if matches.is_empty() => out.push(left),
                    _ => out.extend(matches.iter().map(|right| merged(&left, right))),
                }
            }
            if join.need_distinct {
                dedup(&mut out);
            }
            out
        }
    }
}

/// Evaluate the join tree as written, then the WHERE predicates.
pub fn execute_naive(query: &Query, data: &Dataset) -> Vec<Row> {
    execute_tree(query, &query.tree, data)
        .into_iter()
        .filter(|row| all_hold(query, &query.where_conditions, row))
        .collect()
}

fn execute_tree(query: &Query, tree: &JoinTree, data: &Dataset) -> Vec<Row> {
    match tree {
        JoinTree::Group(group) => {
            let [node] = group.nodes.as_slice() else {
                panic!("fixture groups have one table");
            };
            data.scan(&node.source.alias, &node.source.table)
        }
        JoinTree::Join(join) => {
            let left = execute_tree(query, &join.left, data);
            let right = execute_tree(query, &join.right, data);
            let mut out = Vec::new();
            let mut right_matched = vec![false; right.len()];
            for l in &left {
                let mut matched = false;
                for (i, r) in right.iter().enumerate() {
                    let row = merged(l, r);
                    if !all_hold(query, &join.conditions, &row) {
                        continue;
                    }
                    matched = true;
                    right_matched[i] = true;
                    if !join.join_type.is_semi() {
                        out.push(row);
                    }
                }
                match join.join_type {
                    t if t.is_semi() && matched => out.push(l.clone()),
                    JoinType::Left | JoinType::FullOuter if !matched => out.push(l.clone()),
                    _ => {}
                }
            }
            if matches!(join.join_type, JoinType::Right | JoinType::FullOuter) {
                out.extend(
                    right
                        .iter()
                        .zip(right_matched)
                        .filter(|(_, m)| !m)
                        .map(|(r, _)| r.clone()),
                );
            }
            out
        }
    }
}

fn dedup(rows: &mut Vec<Row>) {
    let mut seen = Vec::new();
    rows.retain(|row| {
        let key = format!("{:?}", row);
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });
}

/// Rows as a sorted multiset of debug strings.
pub fn canonical(rows: &[Row]) -> Vec<String> {
    let mut out: Vec<String> = rows.iter().map(|r| format!("{:?}", r)).collect();
    out.sort();
    out
}

/// Every access of the plan, left to right.
pub fn accesses(node: &PlanNode) -> Vec<&joinplan_core::AccessPlan> {
    match node {
        PlanNode::Access(a) => vec![a],
        PlanNode::Join(j) => {
            let mut out = accesses(&j.left);
            out.extend(accesses(&j.right));
            out
        }
    }
}
