//! The per-group planning goal and candidate comparison.

use std::collections::BTreeSet;

use joinplan_proto::{ColumnRef, Comparison, ConditionId, Expr, QueryGoal, TableGroup};
use tracing::debug;

use super::conditions_selectivity;
use super::ordering::{needs_sort, sort_fields, OrderEffectiveness};
use super::required::RequiredColumns;
use crate::catalog::IndexDef;
use crate::config::OptimizerConfig;
use crate::cost::{CostEstimate, CostEstimator, PlanCostEstimator};
use crate::error::Result;
use crate::plan::{AccessKind, AccessPlan};
use crate::query::QueryContext;

/// What one table group must produce at one point of a join order.
pub struct GroupGoal<'a> {
    pub(super) ctx: &'a QueryContext<'a>,
    pub(super) config: &'a OptimizerConfig,
    pub(super) estimator: &'a dyn CostEstimator,
    pub(super) group: &'a TableGroup,
    /// Aliases outside the group whose values are available.
    pub(super) bound: BTreeSet<String>,
    /// Predicates the access evaluates.
    pub(super) conditions: Vec<ConditionId>,
    /// Columns needed regardless of which predicates the access consumes.
    pub(super) required: RequiredColumns,
    /// The access may satisfy the query's ordering.
    pub(super) sort_allowed: bool,
    pub(super) limit: Option<u64>,
}

impl<'a> GroupGoal<'a> {
    pub fn new(
        ctx: &'a QueryContext<'a>,
        config: &'a OptimizerConfig,
        estimator: &'a dyn CostEstimator,
        group: &'a TableGroup,
        bound: BTreeSet<String>,
        conditions: Vec<ConditionId>,
        sort_allowed: bool,
    ) -> Self {
        let goal = &ctx.query().goal;
        let limit = if sort_allowed && goal.grouping.is_empty() && !goal.distinct {
            goal.limit
        } else {
            None
        };
        let required = base_required(ctx, group, &conditions);
        Self {
            ctx,
            config,
            estimator,
            group,
            bound,
            conditions,
            required,
            sort_allowed,
            limit,
        }
    }

    /// Require only the query output and the `pending` predicates, those
    /// applied above the access. Without it every predicate over the group
    /// that the access does not evaluate is assumed pending.
    pub fn with_pending(mut self, pending: &[ConditionId]) -> Self {
        let group = self.group;
        let in_group = |c: &ColumnRef| group.contains(&c.table);
        let mut required = output_required(self.ctx, group);
        for id in pending.iter().filter(|id| !self.conditions.contains(id)) {
            required.require_expr(self.ctx.condition(*id), &in_group);
        }
        self.required = required;
        self
    }

    pub fn query_goal(&self) -> &'a QueryGoal {
        &self.ctx.query().goal
    }

    pub fn conditions(&self) -> &[ConditionId] {
        &self.conditions
    }

    /// Pick the cheapest access for the group.
    ///
    /// A full-text scan wins outright when the group has full-text
    /// predicates. Otherwise candidates are compared by cost and an earlier
    /// candidate is kept on a tie; the unindexed group scan is tried last.
    pub fn pick_best_scan(&self) -> Result<AccessPlan> {
        if let Some(plan) = self.pick_full_text()? {
            debug!(tables = ?plan.tables, cost = plan.cost.total_cost, "Selecting full text scan");
            return Ok(plan);
        }

        let mut best: Option<AccessPlan> = None;
        if let Some(plan) = self.pick_group_loop()? {
            best = Some(self.prefer(best, plan));
        }

        let mut matches = Vec::new();
        for (node, index) in self.candidate_indexes()? {
            if index.is_spatial() {
                if let Some(plan) = self.pick_spatial(node, index)? {
                    best = Some(self.prefer(best, plan));
                }
                continue;
            }
            if let Some(candidate) = self.match_index(node, index)? {
                let plan = self.index_scan_plan(&candidate)?;
                best = Some(self.prefer(best, plan));
                matches.push(candidate);
            }
        }

        for node in 0..self.group.nodes.len() {
            if let Some(plan) = self.pick_hkey_row(node)? {
                best = Some(self.prefer(best, plan));
            }
        }

        if self.config.enable_intersections && matches.len() > 1 {
            let bound = best.as_ref().map(|b| b.cost);
            if let Some(plan) = self.pick_intersection(&matches, bound)? {
                best = Some(self.prefer(best, plan));
            }
        }

        let scan = self.group_scan_plan()?;
        Ok(self.prefer(best, scan))
    }

    fn prefer(&self, best: Option<AccessPlan>, candidate: AccessPlan) -> AccessPlan {
        match best {
            Some(current) if !candidate.cost.is_cheaper_than(&current.cost) => {
                debug!(
                    kind = candidate.kind.name(),
                    index = ?candidate.kind.index_name(),
                    cost = candidate.cost.total_cost,
                    best = current.cost.total_cost,
                    "Rejecting access plan"
                );
                current
            }
            Some(current) => {
                debug!(
                    kind = candidate.kind.name(),
                    index = ?candidate.kind.index_name(),
                    cost = candidate.cost.total_cost,
                    over = current.kind.name(),
                    "Preferring access plan"
                );
                candidate
            }
            None => {
                debug!(
                    kind = candidate.kind.name(),
                    index = ?candidate.kind.index_name(),
                    cost = candidate.cost.total_cost,
                    "Selecting access plan"
                );
                candidate
            }
        }
    }

    /// Table and group indexes whose leaf is a node of the group.
    fn candidate_indexes(&self) -> Result<Vec<(usize, &'a IndexDef)>> {
        let catalog = self.ctx.catalog();
        let mut out = Vec::new();
        for (node, group_node) in self.group.nodes.iter().enumerate() {
            let table = catalog.table(&group_node.source.table)?;
            out.extend(table.indexes.iter().map(|i| (node, i)));
            out.extend(
                catalog
                    .group_indexes_for(&group_node.source.table)
                    .map(|i| (node, i)),
            );
        }
        Ok(out)
    }

    fn group_scan_plan(&self) -> Result<AccessPlan> {
        let required = self.required_after(&[]);
        let outputs = self.output_nodes(&required);
        let tables: Vec<&str> = self
            .group
            .nodes
            .iter()
            .map(|n| n.source.table.as_str())
            .collect();
        let mut estimator =
            PlanCostEstimator::new(self.estimator, self.config.insertion_sort_max_limit);
        estimator.group_scan(&tables, outputs.len());
        let cost = self.finish_cost(&mut estimator, &[], self.need_sort(OrderEffectiveness::None))?;
        Ok(self.access_plan(
            AccessKind::GroupScan,
            OrderEffectiveness::None,
            false,
            &required,
            cost,
        ))
    }

    // Shared helpers for the candidate builders.

    pub(super) fn contains(&self, alias: &str) -> bool {
        self.group.contains(alias)
    }

    /// Whether `expr` can be computed before the access runs.
    pub(super) fn is_bound_expr(&self, expr: &Expr) -> bool {
        expr.columns().iter().all(|c| {
            !self.contains(&c.table)
                && (self.bound.contains(&c.table) || self.ctx.is_outer_table(&c.table))
        })
    }

    /// Whether `column` is a group column equal to `key`.
    pub(super) fn matches_key(&self, column: &ColumnRef, key: &ColumnRef) -> bool {
        self.contains(&column.table) && self.ctx.equivalences().are_equivalent(column, key)
    }

    /// An unused `key = bound` or `key IS NULL` predicate.
    pub(super) fn find_equality(
        &self,
        key: &ColumnRef,
        used: &[ConditionId],
    ) -> Option<ConditionId> {
        self.conditions
            .iter()
            .copied()
            .filter(|id| !used.contains(id))
            .find(|id| match self.ctx.condition(*id) {
                Expr::Compare {
                    op: Comparison::Eq,
                    left,
                    right,
                } => [(left, right), (right, left)].into_iter().any(|(col, other)| {
                    col.as_column().is_some_and(|c| self.matches_key(c, key))
                        && self.is_bound_expr(other)
                }),
                Expr::Function { name, args } if name.eq_ignore_ascii_case("isNull") => {
                    matches!(
                        args.as_slice(),
                        [arg] if arg.as_column().is_some_and(|c| self.matches_key(c, key))
                    )
                }
                _ => false,
            })
    }

    /// The root and every ancestor of `node` are inner-joined.
    pub(super) fn path_required(&self, node: usize) -> bool {
        let mut current = Some(node);
        while let Some(idx) = current {
            let Some(n) = self.group.nodes.get(idx) else {
                return false;
            };
            if !n.required {
                return false;
            }
            current = n.parent;
        }
        true
    }

    /// Node of `table` on the path from `leaf` to the group root.
    pub(super) fn ancestor_node(&self, leaf: usize, table: &str) -> Option<usize> {
        let mut current = Some(leaf);
        while let Some(idx) = current {
            let node = self.group.nodes.get(idx)?;
            if node.source.table == table {
                return Some(idx);
            }
            current = node.parent;
        }
        None
    }

    pub(super) fn alias(&self, node: usize) -> &'a str {
        self.group
            .nodes
            .get(node)
            .map(|n| n.source.alias.as_str())
            .unwrap_or_default()
    }

    pub(super) fn catalog_table(&self, node: usize) -> &'a str {
        self.group
            .nodes
            .get(node)
            .map(|n| n.source.table.as_str())
            .unwrap_or_default()
    }

    /// Goal predicates not consumed by the access itself.
    pub(super) fn filters(&self, handled: &[ConditionId]) -> Vec<ConditionId> {
        self.conditions
            .iter()
            .copied()
            .filter(|id| !handled.contains(id))
            .collect()
    }

    /// Columns needed once `handled` predicates are evaluated by the access.
    pub(super) fn required_after(&self, handled: &[ConditionId]) -> RequiredColumns {
        let mut required = self.required.clone();
        for id in self.filters(handled) {
            required.require_expr(self.ctx.condition(id), &|c| self.contains(&c.table));
        }
        required
    }

    /// Nodes whose rows the access produces.
    pub(super) fn output_nodes(&self, required: &RequiredColumns) -> Vec<usize> {
        self.group
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.required || required.is_required_table(&n.source.alias))
            .map(|(i, _)| i)
            .collect()
    }

    pub(super) fn output_tables(&self, required: &RequiredColumns) -> Vec<&'a str> {
        self.output_nodes(required)
            .into_iter()
            .map(|n| self.catalog_table(n))
            .collect()
    }

    pub(super) fn need_sort(&self, effectiveness: OrderEffectiveness) -> bool {
        self.sort_allowed && needs_sort(self.query_goal(), effectiveness)
    }

    /// Append the filter, sort and limit stages and estimate.
    pub(super) fn finish_cost(
        &self,
        estimator: &mut PlanCostEstimator<'_>,
        handled: &[ConditionId],
        need_sort: bool,
    ) -> Result<CostEstimate> {
        let filters = self.filters(handled);
        let selectivity = conditions_selectivity(self.ctx, self.estimator, &filters)?;
        estimator.select(filters.len(), selectivity);
        if need_sort {
            estimator.sort(sort_fields(self.query_goal()));
        }
        estimator.set_limit(self.limit);
        estimator.estimate()
    }

    pub(super) fn access_plan(
        &self,
        kind: AccessKind,
        ordering: OrderEffectiveness,
        covering: bool,
        required: &RequiredColumns,
        cost: CostEstimate,
    ) -> AccessPlan {
        AccessPlan {
            kind,
            tables: self.group.aliases().map(String::from).collect(),
            required_tables: self
                .output_nodes(required)
                .into_iter()
                .map(|n| self.alias(n).to_string())
                .collect(),
            bound_tables: self.bound_tables(),
            conditions: self.conditions.clone(),
            ordering,
            covering,
            cost,
        }
    }

    /// Aliases outside the group read by the goal predicates.
    fn bound_tables(&self) -> Vec<String> {
        let mut out: BTreeSet<String> = BTreeSet::new();
        for id in &self.conditions {
            for column in self.ctx.condition(*id).columns() {
                if !self.contains(&column.table) {
                    out.insert(column.table.clone());
                }
            }
        }
        out.into_iter().collect()
    }
}

/// Columns of the group read by the query output.
fn output_required(ctx: &QueryContext<'_>, group: &TableGroup) -> RequiredColumns {
    let goal = &ctx.query().goal;
    let in_group = |c: &ColumnRef| group.contains(&c.table);
    let mut required = RequiredColumns::new();

    if goal.projection.is_empty() {
        for alias in group.aliases() {
            required.require_all(alias);
        }
    }
    for expr in goal
        .projection
        .iter()
        .chain(goal.grouping.iter())
        .chain(goal.ordering.iter().map(|o| &o.expr))
    {
        required.require_expr(expr, &in_group);
    }
    required
}

/// Columns of the group read by the query output, or by predicates that are
/// evaluated outside the access.
fn base_required(
    ctx: &QueryContext<'_>,
    group: &TableGroup,
    conditions: &[ConditionId],
) -> RequiredColumns {
    let in_group = |c: &ColumnRef| group.contains(&c.table);
    let mut required = output_required(ctx, group);
    let internal: Vec<ConditionId> = group
        .nodes
        .iter()
        .flat_map(|n| n.join_conditions.iter().copied())
        .collect();
    for (idx, expr) in ctx.query().conditions.iter().enumerate() {
        let id = ConditionId(idx);
        if conditions.contains(&id) || internal.contains(&id) {
            continue;
        }
        required.require_expr(expr, &in_group);
    }
    required
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, IndexDef, TableDef};
    use crate::cost::{StatisticsCostModel, TableStatistics};
    use joinplan_proto::{JoinTree, JoinType, Query};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_table(TableDef::new("customers", &["id"]).with_column("name"))
            .with_table(
                TableDef::new("orders", &["id"])
                    .with_columns(&["total", "status"])
                    .with_parent("customers", &[("cust_id", "id")])
                    .with_index(IndexDef::table("orders_cust_total", "orders", &["cust_id", "total"])),
            )
    }

    fn statistics() -> TableStatistics {
        TableStatistics::new()
            .with_count("customers", 100)
            .with_count("orders", 1000)
            .with_distinct("orders", "cust_id", 100)
    }

    fn single_table_query() -> Query {
        let mut q = Query::new(JoinTree::table("o", "orders"));
        let gt = q.add_condition(Expr::compare(
            Comparison::Gt,
            Expr::column("o", "total"),
            Expr::literal(100),
        ));
        let eq = q.add_condition(Expr::eq(Expr::column("o", "cust_id"), Expr::literal(7)));
        q.where_conditions = vec![gt, eq];
        q
    }

    #[test]
    fn test_index_beats_group_scan() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let q = single_table_query();
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let group = ctx.group(0).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            group,
            BTreeSet::new(),
            q.where_conditions.clone(),
            true,
        );

        let plan = goal.pick_best_scan().unwrap();
        assert_eq!(plan.kind.name(), "IndexScan");
        assert_eq!(plan.kind.index_name().as_deref(), Some("orders_cust_total"));
        assert_eq!(plan.equalities(), 1);
        assert!(plan.has_range());
        assert_eq!(plan.conditions, q.where_conditions);
    }

    #[test]
    fn test_group_scan_fallback() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::table("o", "orders"));
        let status = q.add_condition(Expr::eq(Expr::column("o", "status"), Expr::literal("new")));
        q.where_conditions = vec![status];
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(0).unwrap(),
            BTreeSet::new(),
            vec![status],
            true,
        );

        let plan = goal.pick_best_scan().unwrap();
        assert_eq!(plan.kind, AccessKind::GroupScan);
        assert_eq!(plan.required_tables, vec!["o".to_string()]);
        // 1000 rows filtered at 0.1.
        assert_eq!(plan.cost.estimated_rows, 100);
    }

    #[test]
    fn test_bound_join_column_is_equality() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::join(
            JoinType::Inner,
            JoinTree::table("c", "customers"),
            JoinTree::table("o", "orders"),
            vec![ConditionId(0)],
        ));
        let join = q.add_condition(Expr::eq(Expr::column("c", "id"), Expr::column("o", "cust_id")));
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let bound: BTreeSet<String> = ["c".to_string()].into_iter().collect();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(1).unwrap(),
            bound,
            vec![join],
            false,
        );

        assert_eq!(goal.find_equality(&ColumnRef::new("o", "cust_id"), &[]), Some(join));
        assert_eq!(goal.find_equality(&ColumnRef::new("o", "cust_id"), &[join]), None);
        let plan = goal.pick_best_scan().unwrap();
        assert_eq!(plan.kind.name(), "IndexScan");
        assert_eq!(plan.bound_tables, vec!["c".to_string()]);
        assert_eq!(plan.cost.estimated_rows, 10);
    }

    #[test]
    fn test_unbound_join_column_is_not_equality() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::join(
            JoinType::Inner,
            JoinTree::table("c", "customers"),
            JoinTree::table("o", "orders"),
            vec![ConditionId(0)],
        ));
        q.add_condition(Expr::eq(Expr::column("c", "id"), Expr::column("o", "cust_id")));
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(1).unwrap(),
            BTreeSet::new(),
            vec![],
            false,
        );
        assert_eq!(goal.find_equality(&ColumnRef::new("o", "cust_id"), &[]), None);
        // The join predicate is evaluated later and needs the column.
        assert!(goal.required.columns_of("o").any(|c| c == "cust_id"));
    }

    #[test]
    fn test_pending_conditions_decide_required_columns() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::join(
            JoinType::Inner,
            JoinTree::table("c", "customers"),
            JoinTree::table("o", "orders"),
            vec![ConditionId(0)],
        ));
        let join = q.add_condition(Expr::eq(Expr::column("c", "id"), Expr::column("o", "cust_id")));
        // Registered but applied nowhere in this query.
        q.add_condition(Expr::compare(
            Comparison::Gt,
            Expr::column("o", "total"),
            Expr::literal(5),
        ));
        q.goal.projection = vec![Expr::column("c", "name")];
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = || {
            GroupGoal::new(
                &ctx,
                &config,
                &model,
                ctx.group(1).unwrap(),
                BTreeSet::new(),
                vec![],
                false,
            )
        };

        let columns = |goal: &GroupGoal<'_>| -> Vec<String> {
            let mut out: Vec<String> = goal.required.columns_of("o").map(String::from).collect();
            out.sort();
            out
        };
        assert_eq!(columns(&goal()), vec!["cust_id", "total"]);
        assert_eq!(columns(&goal().with_pending(&[join])), vec!["cust_id"]);
        assert!(columns(&goal().with_pending(&[])).is_empty());
    }

    #[test]
    fn test_limit_only_when_sortable() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::table("o", "orders"));
        q.goal.limit = Some(5);
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let group = ctx.group(0).unwrap();

        let sortable = GroupGoal::new(&ctx, &config, &model, group, BTreeSet::new(), vec![], true);
        assert_eq!(sortable.limit, Some(5));
        let nested = GroupGoal::new(&ctx, &config, &model, group, BTreeSet::new(), vec![], false);
        assert_eq!(nested.limit, None);
        assert_eq!(sortable.pick_best_scan().unwrap().cost.estimated_rows, 5);
    }
}
