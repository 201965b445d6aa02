//! Intersections of equality-only index scans on one table.

use joinplan_proto::ConditionId;
use tracing::debug;

use super::goal::GroupGoal;
use super::index::IndexMatch;
use super::ordering::OrderEffectiveness;
use crate::cost::{CostEstimate, PlanCostEstimator};
use crate::error::Result;
use crate::plan::{AccessKind, AccessPlan};

/// State of the depth-first search over leg combinations.
struct Search<'m, 'a> {
    legs: Vec<&'m IndexMatch<'a>>,
    /// Cost of reading each leg's entries, without flattening.
    scans: Vec<CostEstimate>,
    /// Total cost to beat.
    bound: Option<f64>,
    best: Option<AccessPlan>,
}

impl<'a> GroupGoal<'a> {
    /// The cheapest intersection of two or more scans in `matches`, if one
    /// beats `best`.
    pub(super) fn pick_intersection(
        &self,
        matches: &[IndexMatch<'a>],
        best: Option<CostEstimate>,
    ) -> Result<Option<AccessPlan>> {
        let legs: Vec<&IndexMatch<'a>> = matches
            .iter()
            .filter(|m| !m.equalities.is_empty() && m.is_equality_complete() && m.range.is_none())
            .collect();
        if legs.len() < 2 || self.config.max_intersection_depth < 2 {
            return Ok(None);
        }

        let mut scans = Vec::with_capacity(legs.len());
        for leg in &legs {
            let shape = leg.shape();
            let rows = self.estimator.estimate_index_scan_rows(&shape)?;
            scans.push(self.estimator.estimate_index_scan(leg.index, rows)?);
        }

        let mut search = Search {
            legs,
            scans,
            bound: best.map(|c| c.total_cost),
            best: None,
        };
        let mut chosen = Vec::new();
        self.extend_intersection(&mut search, &mut chosen, 0, 0.0)?;
        Ok(search.best)
    }

    fn extend_intersection(
        &self,
        search: &mut Search<'_, 'a>,
        chosen: &mut Vec<usize>,
        start: usize,
        scan_cost: f64,
    ) -> Result<()> {
        for next in start..search.legs.len() {
            let leg = search.legs[next];
            if let Some(first) = chosen.first() {
                if search.legs[*first].table != leg.table {
                    continue;
                }
                let handled = leg.handled();
                let overlaps = chosen
                    .iter()
                    .any(|c| search.legs[*c].handled().iter().any(|h| handled.contains(h)));
                if overlaps {
                    continue;
                }
            }

            let cost = scan_cost + search.scans[next].total_cost;
            if search.bound.is_some_and(|bound| cost >= bound) {
                continue;
            }

            chosen.push(next);
            if chosen.len() >= 2 {
                let plan = self.intersection_plan(search, chosen)?;
                if !search.bound.is_some_and(|bound| plan.cost.total_cost >= bound) {
                    debug!(
                        indexes = ?plan.kind.index_name(),
                        cost = plan.cost.total_cost,
                        "Found cheaper intersection"
                    );
                    search.bound = Some(plan.cost.total_cost);
                    search.best = Some(plan);
                }
            }
            if chosen.len() < self.config.max_intersection_depth {
                self.extend_intersection(search, chosen, next + 1, cost)?;
            }
            chosen.pop();
        }
        Ok(())
    }

    fn intersection_plan(&self, search: &Search<'_, 'a>, chosen: &[usize]) -> Result<AccessPlan> {
        let mut combined: Option<CostEstimate> = None;
        for &leg in chosen {
            let scan = search.scans[leg];
            combined = Some(match combined {
                None => scan,
                Some(acc) => {
                    let both = acc.union(&scan);
                    let intersect = self
                        .estimator
                        .estimate_intersect(acc.estimated_rows, scan.estimated_rows)?;
                    CostEstimate::new(
                        intersect.estimated_rows,
                        both.io_cost + intersect.io_cost,
                        both.cpu_cost + intersect.cpu_cost,
                    )
                }
            });
        }
        let combined = combined.unwrap_or_default();

        let legs: Vec<&IndexMatch<'a>> = chosen.iter().map(|c| search.legs[*c]).collect();
        let handled: Vec<ConditionId> = legs.iter().flat_map(|m| m.handled()).collect();
        let required = self.required_after(&handled);
        let table = legs.first().map_or("", |m| m.index.table.as_str());

        let mut estimator =
            PlanCostEstimator::new(self.estimator, self.config.insertion_sort_max_limit);
        estimator
            .fixed(combined)
            .flatten(table, &self.output_tables(&required));
        let cost = self.finish_cost(
            &mut estimator,
            &handled,
            self.need_sort(OrderEffectiveness::None),
        )?;

        let scans = legs
            .iter()
            .map(|m| {
                let mut scan = m.scan();
                scan.reversed.clear();
                scan.uses_all_columns = false;
                scan
            })
            .collect();
        Ok(self.access_plan(
            AccessKind::Intersection(scans),
            OrderEffectiveness::None,
            false,
            &required,
            cost,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::catalog::{Catalog, IndexDef, TableDef};
    use crate::config::OptimizerConfig;
    use crate::cost::{StatisticsCostModel, TableStatistics};
    use crate::query::QueryContext;
    use joinplan_proto::{Comparison, Expr, JoinTree, Query};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        Catalog::new().with_table(
            TableDef::new("t", &["id"])
                .with_columns(&["a", "b", "c"])
                .with_index(IndexDef::table("t_a", "t", &["a"]))
                .with_index(IndexDef::table("t_b", "t", &["b"]))
                .with_index(IndexDef::table("t_a2", "t", &["a"]))
                .with_index(IndexDef::table("t_c", "t", &["c"])),
        )
    }

    fn statistics() -> TableStatistics {
        TableStatistics::new()
            .with_count("t", 100_000)
            .with_distinct("t", "a", 100)
            .with_distinct("t", "b", 100)
    }

    fn query() -> Query {
        let mut q = Query::new(JoinTree::table("t", "t"));
        let a = q.add_condition(Expr::eq(Expr::column("t", "a"), Expr::literal(1)));
        let b = q.add_condition(Expr::eq(Expr::column("t", "b"), Expr::literal(2)));
        let c = q.add_condition(Expr::compare(
            Comparison::Gt,
            Expr::column("t", "c"),
            Expr::literal(3),
        ));
        q.where_conditions = vec![a, b, c];
        q
    }

    #[test]
    fn test_intersection_of_disjoint_legs() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let q = query();
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(0).unwrap(),
            BTreeSet::new(),
            q.where_conditions.clone(),
            true,
        );
        let indexes = &catalog.table("t").unwrap().indexes;
        let matches: Vec<_> = indexes
            .iter()
            .filter_map(|i| goal.match_index(0, i).unwrap())
            .collect();
        // t_c only has a range and cannot be a leg.
        assert_eq!(matches.len(), 4);

        let plan = goal.pick_intersection(&matches, None).unwrap().unwrap();
        let AccessKind::Intersection(scans) = &plan.kind else {
            panic!("expected intersection, got {:?}", plan.kind);
        };
        let names: Vec<&str> = scans.iter().map(|s| s.index.as_str()).collect();
        assert_eq!(names, vec!["t_a", "t_b"]);
        assert_eq!(plan.equalities(), 2);
        assert!(!plan.covering);
    }

    #[test]
    fn test_intersection_pruned_by_best() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let q = query();
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(0).unwrap(),
            BTreeSet::new(),
            q.where_conditions.clone(),
            true,
        );
        let indexes = &catalog.table("t").unwrap().indexes;
        let matches: Vec<_> = indexes
            .iter()
            .filter_map(|i| goal.match_index(0, i).unwrap())
            .collect();

        let cheap = CostEstimate::new(1, 0.1, 0.1);
        assert!(goal.pick_intersection(&matches, Some(cheap)).unwrap().is_none());

        let disabled = OptimizerConfig::default().max_intersection_depth(1);
        let goal = GroupGoal::new(
            &ctx,
            &disabled,
            &model,
            ctx.group(0).unwrap(),
            BTreeSet::new(),
            q.where_conditions.clone(),
            true,
        );
        assert!(goal.pick_intersection(&matches, None).unwrap().is_none());
    }
}
