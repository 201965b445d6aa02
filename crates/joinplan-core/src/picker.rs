//! Join order and access path selection.
//!
//! [`JoinPicker`] is the [`JoinEvaluator`] behind the DPhyp search. Each
//! table group is planned by [`GroupGoal::pick_best_scan`]; every join is a
//! nested loop whose inner side, when it is a single group, is planned again
//! with the outer tables bound so that join predicates can become index
//! bounds. Group plans are memoised per goal so the repeated re-planning of
//! the same group against the same outer tables is cheap.
//!
//! When the query asks for an order or a limit, every subset also carries
//! an ordered variant: a plan whose driving access was chosen to deliver the
//! order and stop at the limit. Nested loops over left-linear joins keep the
//! order of their outer side, so the variant grows through those joins and
//! competes with the plain plan once the whole query is joined.

use std::collections::{BTreeSet, HashMap};

use joinplan_proto::{ConditionId, JoinType};
use tracing::{debug, info, instrument, trace};

use crate::access::{
    conditions_selectivity, needs_sort, sort_fields, GroupGoal, OrderEffectiveness,
};
use crate::bitset::TableBitSet;
use crate::config::OptimizerConfig;
use crate::cost::{CostEstimate, CostEstimator, PlanCostEstimator};
use crate::enumerate::{JoinCandidate, JoinEnumerator, JoinEvaluator};
use crate::error::{Error, Result};
use crate::graph::{JoinGraph, OperatorId};
use crate::plan::{AccessPlan, JoinPlan, PlanNode};
use crate::query::QueryContext;

/// Best plan found so far for one table subset.
#[derive(Debug, Clone)]
pub struct CandidatePlan {
    pub node: PlanNode,
    /// Cost of `node`, plus the final sort and limit once the subset
    /// covers the whole query.
    pub cost: CostEstimate,
    /// Cheapest plan driven by an access that delivers the query's order.
    /// Only compared with `node` once the subset covers the whole query.
    pub ordered: Option<OrderedPlan>,
}

impl CandidatePlan {
    fn new(node: PlanNode, cost: CostEstimate) -> Self {
        Self {
            node,
            cost,
            ordered: None,
        }
    }
}

/// A plan whose leftmost access delivers the query's order and already
/// stops at its limit.
#[derive(Debug, Clone)]
pub struct OrderedPlan {
    pub node: PlanNode,
    pub cost: CostEstimate,
}

/// The chosen plan for a query.
#[derive(Debug, Clone)]
pub struct OptimizedPlan {
    pub root: PlanNode,
    /// Predicates no plan node evaluates, applied to the final rows.
    pub residual_conditions: Vec<ConditionId>,
    pub cost: CostEstimate,
    /// Enumeration passes; 2 when the join graph had to be connected.
    pub passes: usize,
}

/// Memo key for the plan of one group under one goal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupPlanKey {
    group: usize,
    bound: Vec<String>,
    sort_allowed: bool,
    extra: Vec<ConditionId>,
    pending: Vec<ConditionId>,
}

/// Chooses join order, join placement of predicates and every access.
pub struct JoinPicker<'a> {
    ctx: &'a QueryContext<'a>,
    config: &'a OptimizerConfig,
    estimator: &'a dyn CostEstimator,
    group_plans: HashMap<GroupPlanKey, AccessPlan>,
}

impl<'a> JoinPicker<'a> {
    pub fn new(
        ctx: &'a QueryContext<'a>,
        config: &'a OptimizerConfig,
        estimator: &'a dyn CostEstimator,
    ) -> Self {
        Self {
            ctx,
            config,
            estimator,
            group_plans: HashMap::new(),
        }
    }

    /// Build the join graph, run the search and return the cheapest plan.
    #[instrument(skip(self), fields(tables = self.ctx.groups().len()))]
    pub fn optimize(&mut self) -> Result<OptimizedPlan> {
        let config = self.config;
        let mut graph = JoinGraph::build(self.ctx, config)?;
        let (best, passes) = {
            let mut enumerator = JoinEnumerator::new(&mut graph, self, config)?;
            let best = enumerator.solve()?.clone();
            (best, enumerator.passes())
        };

        let evaluated = best.node.evaluated_conditions();
        let mut residual: Vec<ConditionId> = Vec::new();
        let candidates = graph.where_conditions().iter().copied().chain(
            graph
                .operators()
                .iter()
                .flat_map(|op| op.conditions.iter().copied()),
        );
        for id in candidates {
            if !evaluated.contains(&id) && !residual.contains(&id) {
                residual.push(id);
            }
        }

        info!(
            tables = graph.table_count(),
            edges = graph.edge_count(),
            passes,
            cost = best.cost.total_cost,
            residual = residual.len(),
            "Optimized join plan"
        );
        Ok(OptimizedPlan {
            root: best.node,
            residual_conditions: residual,
            cost: best.cost,
            passes,
        })
    }

    /// Number of memoised group plans.
    pub fn group_plan_count(&self) -> usize {
        self.group_plans.len()
    }

    fn plan_group(
        &mut self,
        graph: &JoinGraph,
        group: usize,
        bound: BTreeSet<String>,
        extra: Vec<ConditionId>,
        pending: Vec<ConditionId>,
        sort_allowed: bool,
    ) -> Result<AccessPlan> {
        let key = GroupPlanKey {
            group,
            bound: bound.iter().cloned().collect(),
            sort_allowed,
            extra: extra.clone(),
            pending,
        };
        if let Some(plan) = self.group_plans.get(&key) {
            trace!(group, bound = ?key.bound, "Reusing group plan");
            return Ok(plan.clone());
        }

        let table_group = self
            .ctx
            .group(group)
            .ok_or_else(|| Error::UnknownTable(graph.table_label(group).to_string()))?;
        let mut conditions = self.group_filters(graph, group);
        for id in extra {
            if !conditions.contains(&id) {
                conditions.push(id);
            }
        }
        let goal = GroupGoal::new(
            self.ctx,
            self.config,
            self.estimator,
            table_group,
            bound,
            conditions,
            sort_allowed,
        )
        .with_pending(&key.pending);
        let plan = goal.pick_best_scan()?;
        self.group_plans.insert(key, plan.clone());
        Ok(plan)
    }

    /// WHERE predicates on `group` alone. Predicates on a null-extended
    /// group must wait for the outer join.
    fn group_filters(&self, graph: &JoinGraph, group: usize) -> Vec<ConditionId> {
        if graph.nullable_tables().contains(group) {
            return Vec::new();
        }
        graph
            .where_conditions()
            .iter()
            .copied()
            .filter(|id| self.ctx.groups_referenced(self.ctx.condition(*id)) == [group])
            .collect()
    }

    /// Predicates over `group` applied above its access: those of
    /// `operators` and the WHERE predicates no edge or filter takes.
    fn pending_conditions(
        &self,
        graph: &JoinGraph,
        group: usize,
        operators: impl IntoIterator<Item = OperatorId>,
    ) -> Vec<ConditionId> {
        let filters = self.group_filters(graph, group);
        let references = |id: &ConditionId| {
            self.ctx
                .groups_referenced(self.ctx.condition(*id))
                .contains(&group)
        };
        let mut pending: Vec<ConditionId> = operators
            .into_iter()
            .flat_map(|id| graph.operator(id).conditions.iter().copied())
            .chain(
                graph
                    .where_conditions()
                    .iter()
                    .copied()
                    .filter(|id| !filters.contains(id)),
            )
            .filter(|id| references(id))
            .collect();
        pending.sort_unstable();
        pending.dedup();
        pending
    }

    /// Pending predicates of a group planned before any join: every
    /// operator may still apply.
    fn seed_pending(&self, graph: &JoinGraph, group: usize) -> Vec<ConditionId> {
        let operators = (0..graph.operators().len()).map(OperatorId);
        self.pending_conditions(graph, group, operators)
    }

    fn outer_bound(&self) -> BTreeSet<String> {
        self.ctx.query().goal.outer_tables.iter().cloned().collect()
    }

    /// Aliases available to an inner access below `tables`.
    fn bound_by(&self, tables: TableBitSet) -> BTreeSet<String> {
        let mut bound = self.outer_bound();
        for bit in tables.iter() {
            if let Some(group) = self.ctx.group(bit) {
                bound.extend(group.aliases().map(String::from));
            }
        }
        bound
    }

    /// Whether every column of `id` is in `group` or already bound.
    fn evaluable_in(&self, id: ConditionId, group: usize, bound: &BTreeSet<String>) -> bool {
        self.ctx.condition(id).columns().iter().all(|c| {
            bound.contains(&c.table)
                || self.ctx.is_outer_table(&c.table)
                || self.ctx.group_of(&c.table) == Some(group)
        })
    }

    fn join_cost(
        &self,
        join_type: JoinType,
        left: &CostEstimate,
        right: &CostEstimate,
        conditions: &[ConditionId],
    ) -> Result<CostEstimate> {
        let mut cost = left.nest(right);
        if !conditions.is_empty() {
            let selectivity = conditions_selectivity(self.ctx, self.estimator, conditions)?;
            let select =
                self.estimator
                    .estimate_select(cost.estimated_rows, conditions.len(), selectivity)?;
            cost = cost.sequence(&select);
        }
        let rows = match join_type {
            t if t.is_semi() => cost.estimated_rows.min(left.estimated_rows),
            JoinType::Left => cost.estimated_rows.max(left.estimated_rows),
            JoinType::FullOuter => cost
                .estimated_rows
                .max(left.estimated_rows)
                .max(right.estimated_rows),
            _ => cost.estimated_rows,
        };
        Ok(CostEstimate::new(rows, cost.io_cost, cost.cpu_cost))
    }

    /// Row limit the final stage applies; grouping and DISTINCT hide it.
    fn final_limit(&self) -> Option<u64> {
        let goal = &self.ctx.query().goal;
        goal.limit
            .filter(|_| goal.grouping.is_empty() && !goal.distinct)
    }

    /// Whether a driving access chosen for the query's order or limit can
    /// beat the plain plan.
    fn wants_ordered(&self) -> bool {
        needs_sort(&self.ctx.query().goal, OrderEffectiveness::None) || self.final_limit().is_some()
    }

    /// Cost of the whole query: the final sort when the driving access does
    /// not deliver the requested order, and the row limit.
    fn final_cost(&self, node: &PlanNode) -> Result<CostEstimate> {
        let goal = &self.ctx.query().goal;
        let need_sort = needs_sort(goal, node.leftmost_access().ordering);
        let limit = self.final_limit();
        if !need_sort && limit.is_none() {
            return Ok(*node.cost());
        }
        let mut estimator =
            PlanCostEstimator::new(self.estimator, self.config.insertion_sort_max_limit);
        estimator.fixed(*node.cost());
        if need_sort {
            estimator.sort(sort_fields(goal));
        }
        estimator.set_limit(limit);
        estimator.estimate()
    }

    /// Cost of a whole ordered plan. Its driving access already stopped at
    /// the limit, so the limit only caps the rows.
    fn final_ordered_cost(&self, node: &PlanNode) -> CostEstimate {
        let cost = *node.cost();
        match self.final_limit() {
            Some(limit) if limit < cost.estimated_rows => {
                CostEstimate::new(limit, cost.io_cost, cost.cpu_cost)
            }
            _ => cost,
        }
    }

    /// Join `left` and `right` with the predicates `right` does not
    /// consume.
    fn join_node(
        &self,
        join_type: JoinType,
        left: PlanNode,
        right: PlanNode,
        conditions: &[ConditionId],
    ) -> Result<PlanNode> {
        let consumed: &[ConditionId] = match &right {
            PlanNode::Access(access) => &access.conditions,
            PlanNode::Join(_) => &[],
        };
        let join_conditions: Vec<ConditionId> = conditions
            .iter()
            .copied()
            .filter(|id| !consumed.contains(id))
            .collect();

        let cost = self.join_cost(join_type, left.cost(), right.cost(), &join_conditions)?;
        let (join_type, need_distinct) = match join_type {
            JoinType::InnerNeedDistinct => {
                let unique = matches!(&left, PlanNode::Access(a) if a.semi_join_equivalent());
                (JoinType::Inner, !unique)
            }
            t if t.is_semi() => (JoinType::Semi, false),
            t => (t, false),
        };

        Ok(PlanNode::Join(JoinPlan {
            join_type,
            need_distinct,
            conditions: join_conditions,
            left: Box::new(left),
            right: Box::new(right),
            cost,
        }))
    }

    fn prefer_ordered(
        &self,
        tables: TableBitSet,
        existing: Option<OrderedPlan>,
        candidate: Option<PlanNode>,
    ) -> Option<OrderedPlan> {
        match (existing, candidate) {
            (existing, None) => existing,
            (Some(current), Some(node)) if !node.cost().is_cheaper_than(&current.cost) => {
                Some(current)
            }
            (_, Some(node)) => {
                debug!(
                    tables = %tables,
                    cost = node.cost().total_cost,
                    "Preferring ordered join plan"
                );
                Some(OrderedPlan {
                    cost: *node.cost(),
                    node,
                })
            }
        }
    }

    fn prefer(
        &self,
        tables: TableBitSet,
        existing: Option<CandidatePlan>,
        candidate: CandidatePlan,
    ) -> CandidatePlan {
        match existing {
            Some(current) if !candidate.cost.is_cheaper_than(&current.cost) => {
                debug!(
                    tables = %tables,
                    cost = candidate.cost.total_cost,
                    best = current.cost.total_cost,
                    "Rejecting join plan"
                );
                current
            }
            Some(current) => {
                debug!(
                    tables = %tables,
                    cost = candidate.cost.total_cost,
                    over = current.cost.total_cost,
                    "Preferring join plan"
                );
                candidate
            }
            None => {
                debug!(tables = %tables, cost = candidate.cost.total_cost, "Selecting join plan");
                candidate
            }
        }
    }
}

/// Predicates of `operators`, without duplicates, in operator order.
fn operator_conditions(graph: &JoinGraph, operators: &[OperatorId]) -> Vec<ConditionId> {
    let mut out = Vec::new();
    for id in operators {
        for condition in &graph.operator(*id).conditions {
            if !out.contains(condition) {
                out.push(*condition);
            }
        }
    }
    out
}

impl JoinEvaluator for JoinPicker<'_> {
    type Plan = CandidatePlan;

    fn evaluate_table(
        &mut self,
        graph: &JoinGraph,
        _tables: TableBitSet,
        table: usize,
    ) -> Result<CandidatePlan> {
        let bound = self.outer_bound();
        let pending = self.seed_pending(graph, table);
        if graph.table_count() == 1 {
            let access = self.plan_group(graph, table, bound, Vec::new(), pending, true)?;
            let cost = access.cost;
            return Ok(CandidatePlan::new(PlanNode::Access(access), cost));
        }

        let access =
            self.plan_group(graph, table, bound.clone(), Vec::new(), pending.clone(), false)?;
        let cost = access.cost;
        let mut plan = CandidatePlan::new(PlanNode::Access(access), cost);
        if self.wants_ordered() {
            let sorted = self.plan_group(graph, table, bound, Vec::new(), pending, true)?;
            if !needs_sort(&self.ctx.query().goal, sorted.ordering) {
                trace!(table, cost = sorted.cost.total_cost, "Keeping ordered access");
                plan.ordered = Some(OrderedPlan {
                    cost: sorted.cost,
                    node: PlanNode::Access(sorted),
                });
            }
        }
        Ok(plan)
    }

    fn evaluate_join(
        &mut self,
        graph: &JoinGraph,
        candidate: JoinCandidate<'_, CandidatePlan>,
        existing: Option<CandidatePlan>,
    ) -> Result<CandidatePlan> {
        let conditions = operator_conditions(graph, candidate.operators);
        trace!(
            left = %candidate.left,
            right = %candidate.right,
            join = %candidate.join_type,
            conditions = conditions.len(),
            outside = candidate.outside.len(),
            "Evaluating join"
        );

        let right = match candidate.right.min_index() {
            Some(group) if candidate.right.count() == 1 && candidate.join_type.is_left_linear() => {
                let bound = self.bound_by(candidate.left);
                let extra: Vec<ConditionId> = conditions
                    .iter()
                    .copied()
                    .filter(|id| self.evaluable_in(*id, group, &bound))
                    .collect();
                let later = candidate.operators.iter().chain(candidate.outside).copied();
                let pending = self.pending_conditions(graph, group, later);
                PlanNode::Access(self.plan_group(graph, group, bound, extra, pending, false)?)
            }
            _ => candidate.right_plan.node.clone(),
        };

        let ordered = match &candidate.left_plan.ordered {
            Some(left) if candidate.join_type.is_left_linear() => Some(self.join_node(
                candidate.join_type,
                left.node.clone(),
                right.clone(),
                &conditions,
            )?),
            _ => None,
        };
        let node = self.join_node(
            candidate.join_type,
            candidate.left_plan.node.clone(),
            right,
            &conditions,
        )?;

        if candidate.joined == graph.all_tables() {
            let cost = self.final_cost(&node)?;
            let mut plan = self.prefer(candidate.joined, existing, CandidatePlan::new(node, cost));
            if let Some(node) = ordered {
                let cost = self.final_ordered_cost(&node);
                plan = self.prefer(candidate.joined, Some(plan), CandidatePlan::new(node, cost));
            }
            return Ok(plan);
        }

        let (existing, kept) = match existing {
            Some(mut current) => {
                let kept = current.ordered.take();
                (Some(current), kept)
            }
            None => (None, None),
        };
        let cost = *node.cost();
        let mut plan = self.prefer(candidate.joined, existing, CandidatePlan::new(node, cost));
        plan.ordered = self.prefer_ordered(candidate.joined, kept, ordered);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, IndexDef, TableDef};
    use crate::cost::{StatisticsCostModel, TableStatistics};
    use crate::plan::AccessKind;
    use joinplan_proto::{Comparison, Expr, JoinTree, OrderByItem, Query};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_table(TableDef::new("customers", &["id"]).with_column("name"))
            .with_table(
                TableDef::new("orders", &["id"])
                    .with_columns(&["cust_id", "total"])
                    .with_index(IndexDef::table("orders_cust", "orders", &["cust_id"])),
            )
    }

    fn statistics() -> TableStatistics {
        TableStatistics::new()
            .with_count("customers", 100)
            .with_count("orders", 10_000)
            .with_distinct("orders", "cust_id", 100)
    }

    fn customer_orders(join_type: JoinType) -> Query {
        let mut q = Query::new(JoinTree::table("c", "customers"));
        let on = q.add_condition(Expr::eq(
            Expr::column("c", "id"),
            Expr::column("o", "cust_id"),
        ));
        q.tree = JoinTree::join(
            join_type,
            JoinTree::table("c", "customers"),
            JoinTree::table("o", "orders"),
            vec![on],
        );
        q
    }

    fn optimize(q: &Query) -> OptimizedPlan {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let ctx = QueryContext::new(q, &catalog).unwrap();
        let mut picker = JoinPicker::new(&ctx, &config, &model);
        picker.optimize().unwrap()
    }

    #[test]
    fn test_join_predicate_becomes_index_bound() {
        let q = customer_orders(JoinType::Inner);
        let plan = optimize(&q);
        let PlanNode::Join(join) = &plan.root else {
            panic!("expected join, got {:?}", plan.root);
        };
        assert_eq!(join.join_type, JoinType::Inner);
        assert!(join.conditions.is_empty());

        let PlanNode::Access(outer) = join.left.as_ref() else {
            panic!("expected access on the left");
        };
        assert_eq!(outer.tables, vec!["c".to_string()]);

        let PlanNode::Access(inner) = join.right.as_ref() else {
            panic!("expected access on the right");
        };
        let AccessKind::IndexScan(scan) = &inner.kind else {
            panic!("expected index scan, got {:?}", inner.kind);
        };
        assert_eq!(scan.index, "orders_cust");
        assert_eq!(scan.equalities, 1);
        assert_eq!(inner.bound_tables, vec!["c".to_string()]);
        assert!(plan.residual_conditions.is_empty());
        assert_eq!(plan.passes, 1);
    }

    #[test]
    fn test_where_on_null_extended_table_is_residual() {
        let mut q = customer_orders(JoinType::Left);
        let filter = q.add_condition(Expr::compare(
            Comparison::Gt,
            Expr::column("o", "total"),
            Expr::literal(5),
        ));
        q.where_conditions = vec![filter];
        let plan = optimize(&q);
        assert_eq!(plan.residual_conditions, vec![filter]);
        let PlanNode::Join(join) = &plan.root else {
            panic!("expected join");
        };
        assert_eq!(join.join_type, JoinType::Left);
        assert_eq!(join.left.tables(), vec!["c"]);
    }

    #[test]
    fn test_semi_join_rows_bounded_by_outer() {
        let q = customer_orders(JoinType::Semi);
        let plan = optimize(&q);
        let PlanNode::Join(join) = &plan.root else {
            panic!("expected join");
        };
        assert_eq!(join.join_type, JoinType::Semi);
        assert!(plan.cost.estimated_rows <= 100);
    }

    #[test]
    fn test_single_group_pays_for_sort() {
        let mut q = Query::new(JoinTree::table("o", "orders"));
        q.goal.ordering = vec![OrderByItem::asc(Expr::column("o", "total"))];
        let sorted = optimize(&q);

        q.goal.ordering.clear();
        let unsorted = optimize(&q);

        assert!(matches!(sorted.root, PlanNode::Access(_)));
        assert!(unsorted.cost.is_cheaper_than(&sorted.cost));
    }

    #[test]
    fn test_group_plans_memoised() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let q = customer_orders(JoinType::Inner);
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let mut picker = JoinPicker::new(&ctx, &config, &model);
        let first = picker.optimize().unwrap();
        let count = picker.group_plan_count();
        // Two seeds and one re-plan of each side.
        assert_eq!(count, 4);

        let second = picker.optimize().unwrap();
        assert_eq!(picker.group_plan_count(), count);
        assert_eq!(first.cost, second.cost);
    }
}
