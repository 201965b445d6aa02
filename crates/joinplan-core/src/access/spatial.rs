//! Spatial index scans for distance predicates.

use joinplan_proto::{ColumnRef, Comparison, ConditionId, Expr};
use tracing::debug;

use super::goal::GroupGoal;
use super::ordering::OrderEffectiveness;
use crate::catalog::{IndexDef, IndexKind};
use crate::cost::PlanCostEstimator;
use crate::error::Result;
use crate::plan::{AccessKind, AccessPlan};

/// z-order ranges covering one search circle.
const SPATIAL_SCANS: usize = 4;

/// `distance(x, y, cx, cy)`
const DISTANCE_FUNCTION: &str = "distance";
/// `near(x, y, cx, cy, radius)`
const NEAR_FUNCTION: &str = "near";

impl<'a> GroupGoal<'a> {
    pub(super) fn pick_spatial(
        &self,
        node: usize,
        index: &'a IndexDef,
    ) -> Result<Option<AccessPlan>> {
        let IndexKind::Spatial {
            first_spatial_column,
            dimensions,
        } = index.kind
        else {
            return Ok(None);
        };
        if dimensions != 2 || !self.path_required(node) {
            return Ok(None);
        }

        let keys = self.key_columns(node, index)?;
        let mut equalities = Vec::new();
        for key in keys.iter().take(first_spatial_column) {
            let Some(column) = &key.column else {
                return Ok(None);
            };
            match self.find_equality(column, &equalities) {
                Some(id) => equalities.push(id),
                None => {
                    debug!(index = %index.name, column = %column, "Spatial index prefix not bound");
                    return Ok(None);
                }
            }
        }

        let (Some(Some(x)), Some(Some(y))) = (
            keys.get(first_spatial_column).map(|k| k.column.as_ref()),
            keys.get(first_spatial_column + 1).map(|k| k.column.as_ref()),
        ) else {
            return Ok(None);
        };
        let Some(spatial) = self.find_spatial_condition(x, y, &equalities) else {
            return Ok(None);
        };
        debug!(index = %index.name, condition = %spatial, "Matched spatial predicate");

        // The distance predicate is rechecked on every row.
        let required = self.required_after(&equalities);
        let mut estimator =
            PlanCostEstimator::new(self.estimator, self.config.insertion_sort_max_limit);
        estimator
            .spatial_scan(index, SPATIAL_SCANS)
            .flatten(&index.table, &self.output_tables(&required));
        let cost = self.finish_cost(
            &mut estimator,
            &equalities,
            self.need_sort(OrderEffectiveness::None),
        )?;

        Ok(Some(self.access_plan(
            AccessKind::Spatial {
                index: index.name.clone(),
                table: self.alias(node).to_string(),
                scans: SPATIAL_SCANS,
            },
            OrderEffectiveness::None,
            false,
            &required,
            cost,
        )))
    }

    fn find_spatial_condition(
        &self,
        x: &ColumnRef,
        y: &ColumnRef,
        used: &[ConditionId],
    ) -> Option<ConditionId> {
        self.conditions
            .iter()
            .copied()
            .filter(|id| !used.contains(id))
            .find(|id| self.is_spatial_condition(self.ctx.condition(*id), x, y))
    }

    fn is_spatial_condition(&self, expr: &Expr, x: &ColumnRef, y: &ColumnRef) -> bool {
        match expr {
            Expr::Compare { op, left, right } => {
                let (distance, radius, op) = match (left.as_ref(), right.as_ref()) {
                    (d @ Expr::Function { .. }, r) => (d, r, *op),
                    (r, d @ Expr::Function { .. }) => (d, r, op.reverse()),
                    _ => return false,
                };
                matches!(op, Comparison::Lt | Comparison::Le)
                    && self.is_bound_expr(radius)
                    && self.is_spatial_call(distance, DISTANCE_FUNCTION, 4, x, y)
            }
            Expr::Function { .. } => self.is_spatial_call(expr, NEAR_FUNCTION, 5, x, y),
            _ => false,
        }
    }

    /// `name(x, y, bound...)` with `arity` arguments.
    fn is_spatial_call(
        &self,
        expr: &Expr,
        function: &str,
        arity: usize,
        x: &ColumnRef,
        y: &ColumnRef,
    ) -> bool {
        let Expr::Function { name, args } = expr else {
            return false;
        };
        if !name.eq_ignore_ascii_case(function) || args.len() != arity {
            return false;
        }
        let coordinate = |arg: &Expr, key: &ColumnRef| {
            arg.as_column().is_some_and(|c| self.matches_key(c, key))
        };
        coordinate(&args[0], x)
            && coordinate(&args[1], y)
            && args[2..].iter().all(|a| self.is_bound_expr(a))
    }
}
