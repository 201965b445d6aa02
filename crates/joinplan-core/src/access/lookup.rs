//! Direct lookups by hierarchical key.

use joinplan_proto::ConditionId;
use tracing::debug;

use super::goal::GroupGoal;
use super::ordering::OrderEffectiveness;
use crate::cost::PlanCostEstimator;
use crate::error::Result;
use crate::plan::{AccessKind, AccessPlan};

impl GroupGoal<'_> {
    /// Fetch the single row of `node` whose hierarchical key is fully bound
    /// by equalities, together with its ancestors.
    pub(super) fn pick_hkey_row(&self, node: usize) -> Result<Option<AccessPlan>> {
        if !self.path_required(node) {
            return Ok(None);
        }
        let table = self.catalog_table(node);

        let mut equalities = Vec::new();
        for hkey in self.ctx.catalog().hkey_columns(table)? {
            let Some(column) = self.alias_column(node, &hkey.table, &hkey.column) else {
                return Ok(None);
            };
            match self.find_equality(&column, &equalities) {
                Some(id) => equalities.push(id),
                None => return Ok(None),
            }
        }

        let required = self.required_after(&equalities);
        let outputs = self.output_nodes(&required);
        // Descendants and siblings cannot be reached from one row.
        if !outputs
            .iter()
            .all(|out| self.group.is_ancestor_or_self(*out, node))
        {
            debug!(table = self.alias(node), "Rejecting hkey lookup with descendant outputs");
            return Ok(None);
        }

        let mut estimator =
            PlanCostEstimator::new(self.estimator, self.config.insertion_sort_max_limit);
        estimator.hkey_row(outputs.len());
        let cost = self.finish_cost(&mut estimator, &equalities, false)?;

        Ok(Some(self.access_plan(
            AccessKind::HKeyRow {
                table: self.alias(node).to_string(),
            },
            OrderEffectiveness::Sorted,
            false,
            &required,
            cost,
        )))
    }

    /// Nested lookup from a bound row of the same hierarchy through a
    /// parent/child join that was left out of the group.
    pub(super) fn pick_group_loop(&self) -> Result<Option<AccessPlan>> {
        if !self.config.enable_group_loops || self.need_sort(OrderEffectiveness::None) {
            return Ok(None);
        }

        for join in &self.group.rejected_joins {
            let (outer, inner) = if self.contains(&join.child) && self.bound.contains(&join.parent) {
                (&join.parent, &join.child)
            } else if self.contains(&join.parent) && self.bound.contains(&join.child) {
                (&join.child, &join.parent)
            } else {
                continue;
            };
            if join.conditions.is_empty()
                || !join.conditions.iter().all(|c| self.conditions.contains(c))
            {
                continue;
            }
            let (Some(outer_info), Some(inner_node)) =
                (self.ctx.table_info(outer), self.group.node_index(inner))
            else {
                continue;
            };

            let handled: Vec<ConditionId> = join.conditions.clone();
            let required = self.required_after(&handled);
            let mut estimator =
                PlanCostEstimator::new(self.estimator, self.config.insertion_sort_max_limit);
            estimator.group_loop(
                &outer_info.table,
                self.catalog_table(inner_node),
                &self.output_tables(&required),
            );
            let cost = self.finish_cost(&mut estimator, &handled, false)?;

            return Ok(Some(self.access_plan(
                AccessKind::GroupLoop {
                    outer: outer.clone(),
                    inner: inner.clone(),
                },
                OrderEffectiveness::None,
                false,
                &required,
                cost,
            )));
        }
        Ok(None)
    }
}
