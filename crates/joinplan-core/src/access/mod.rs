//! Access-path selection for one table group.
//!
//! A [`GroupGoal`] describes what one table group has to produce at one
//! point of a join order: the predicates it may evaluate, the tables whose
//! values are already bound, and whether it may satisfy the query's
//! ordering. [`GroupGoal::pick_best_scan`] compares every applicable access
//! (index scans, intersections, spatial and full-text scans, hierarchical
//! key lookups, group loops and the unindexed group scan) and returns the
//! cheapest.

mod fulltext;
mod goal;
mod index;
mod intersection;
mod lookup;
mod ordering;
mod range;
mod required;
mod spatial;

use joinplan_proto::{Comparison, ConditionId, Expr};

use crate::catalog::TableColumn;
use crate::cost::{CostEstimator, SelectivityKind};
use crate::error::Result;
use crate::query::QueryContext;

pub use fulltext::{FullTextBoolean, FullTextField, FullTextFieldKind, FullTextQuery};
pub use goal::GroupGoal;
pub use ordering::{
    determine_ordering, needs_sort, sort_fields, IndexOrder, OrderEffectiveness, OrderingMatch,
};
pub use range::{ColumnRanges, RangeSegment};
pub use required::RequiredColumns;

/// Combined selectivity of `conditions`, assumed independent.
///
/// Predicates that cannot be attributed to a column of the query are
/// ignored.
pub fn conditions_selectivity(
    ctx: &QueryContext<'_>,
    estimator: &dyn CostEstimator,
    conditions: &[ConditionId],
) -> Result<f64> {
    let classified: Vec<(TableColumn, SelectivityKind)> = conditions
        .iter()
        .filter_map(|id| classify(ctx, ctx.condition(*id)))
        .collect();
    if classified.is_empty() {
        return Ok(1.0);
    }
    estimator.conditions_selectivity(&classified)
}

fn table_column(ctx: &QueryContext<'_>, expr: &Expr) -> Option<TableColumn> {
    let column = expr.as_column()?;
    let info = ctx.table_info(&column.table)?;
    Some(TableColumn::new(info.table.clone(), column.column.clone()))
}

fn classify(ctx: &QueryContext<'_>, expr: &Expr) -> Option<(TableColumn, SelectivityKind)> {
    match expr {
        Expr::Compare { op, left, right } => {
            let column = table_column(ctx, left).or_else(|| table_column(ctx, right))?;
            let kind = match op {
                Comparison::Eq => SelectivityKind::Equal,
                Comparison::Ne => SelectivityKind::NotEqual,
                _ => SelectivityKind::Range,
            };
            Some((column, kind))
        }
        Expr::InList { operand, list } => {
            Some((table_column(ctx, operand)?, SelectivityKind::InList(list.len())))
        }
        Expr::Function { name, args } if name.eq_ignore_ascii_case("isNull") => {
            Some((table_column(ctx, args.first()?)?, SelectivityKind::Equal))
        }
        _ => {
            let first = expr.columns().into_iter().next()?;
            let info = ctx.table_info(&first.table)?;
            Some((
                TableColumn::new(info.table.clone(), first.column.clone()),
                SelectivityKind::Other,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, TableDef};
    use crate::cost::{StatisticsCostModel, TableStatistics};
    use joinplan_proto::{JoinTree, Query};

    #[test]
    fn test_conditions_selectivity() {
        let catalog =
            Catalog::new().with_table(TableDef::new("orders", &["id"]).with_columns(&["status", "total"]));
        let stats = TableStatistics::new()
            .with_count("orders", 1000)
            .with_distinct("orders", "status", 4);
        let model = StatisticsCostModel::new(&stats, &catalog);

        let mut q = Query::new(JoinTree::table("o", "orders"));
        let eq = q.add_condition(Expr::eq(Expr::column("o", "status"), Expr::literal("new")));
        let gt = q.add_condition(Expr::compare(
            Comparison::Gt,
            Expr::column("o", "total"),
            Expr::literal(100),
        ));
        let constant = q.add_condition(Expr::eq(Expr::literal(1), Expr::literal(1)));
        let ctx = QueryContext::new(&q, &catalog).unwrap();

        let sel = conditions_selectivity(&ctx, &model, &[eq, gt]).unwrap();
        assert!((sel - 0.075).abs() < 1e-9);
        assert_eq!(conditions_selectivity(&ctx, &model, &[constant]).unwrap(), 1.0);
        assert_eq!(conditions_selectivity(&ctx, &model, &[]).unwrap(), 1.0);
    }
}
