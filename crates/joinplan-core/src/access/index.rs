//! Matching predicates against the key columns of one index.

use joinplan_proto::{ColumnRef, Comparison, ConditionId, Expr};
use tracing::debug;

use super::goal::GroupGoal;
use super::ordering::{determine_ordering, IndexOrder, OrderEffectiveness, OrderingMatch};
use super::range::ColumnRanges;
use crate::catalog::{GroupIndexJoin, IndexDef, IndexKind};
use crate::cost::{IndexScanShape, PlanCostEstimator};
use crate::error::Result;
use crate::plan::{AccessKind, AccessPlan, IndexScan};

/// One key column of an index as seen from the group.
#[derive(Debug, Clone)]
pub(super) struct KeyColumn {
    /// `None` when the column belongs to a table outside the group.
    pub column: Option<ColumnRef>,
    pub ascending: bool,
    pub recoverable: bool,
}

/// Bounds on the key column after the equalities.
#[derive(Debug, Clone)]
pub(super) struct RangeMatch {
    pub conditions: Vec<ConditionId>,
    pub segments: usize,
}

/// Outcome of the covering test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct Coverage {
    pub covering: bool,
    /// A needed column is only in the hierarchical key part of the entry.
    pub uses_all_columns: bool,
}

/// An index with the predicates it can consume.
#[derive(Debug, Clone)]
pub(super) struct IndexMatch<'a> {
    pub index: &'a IndexDef,
    /// Alias of the leaf table.
    pub table: String,
    /// One predicate per leading key column.
    pub equalities: Vec<ConditionId>,
    pub range: Option<RangeMatch>,
    pub ordering: OrderingMatch,
    pub covering: bool,
    /// The scan reads key columns past the declared ones.
    pub uses_all_columns: bool,
}

impl<'a> IndexMatch<'a> {
    /// Predicates turned into key bounds.
    pub fn handled(&self) -> Vec<ConditionId> {
        let mut out = self.equalities.clone();
        if let Some(range) = &self.range {
            out.extend(range.conditions.iter().copied());
        }
        out
    }

    pub fn range_segments(&self) -> usize {
        self.range.as_ref().map_or(0, |r| r.segments)
    }

    /// Every declared column is bound by equality.
    pub fn is_equality_complete(&self) -> bool {
        self.equalities.len() >= self.index.columns.len()
    }

    pub fn scan(&self) -> IndexScan {
        IndexScan {
            index: self.index.name.clone(),
            table: self.table.clone(),
            equalities: self.equalities.len(),
            range_segments: self.range_segments(),
            reversed: self.ordering.reversed.clone(),
            single_row: self.index.unique && self.is_equality_complete(),
            uses_all_columns: self.uses_all_columns,
            index_conditions: self.handled(),
        }
    }

    pub fn shape(&self) -> IndexScanShape<'a> {
        IndexScanShape {
            index: self.index,
            equalities: self.equalities.len(),
            range_segments: self.range_segments(),
        }
    }
}

impl<'a> GroupGoal<'a> {
    /// Nodes the index spans, root-most first, if its shape fits the group.
    pub(super) fn index_nodes(&self, leaf: usize, index: &IndexDef) -> Result<Option<Vec<usize>>> {
        let IndexKind::Group { root_table, join_type } = &index.kind else {
            // A single-table index drives the group only from an inner node.
            if !self.path_required(leaf) {
                debug!(index = %index.name, "Rejecting index on optional table");
                return Ok(None);
            }
            return Ok(Some(vec![leaf]));
        };

        let ancestry = self.ctx.catalog().ancestry(&index.table)?;
        let Some(start) = ancestry.iter().position(|t| t.name == *root_table) else {
            debug!(index = %index.name, "Rejecting group index outside its hierarchy");
            return Ok(None);
        };

        // Walk up from the leaf; every table of the index must be the parent
        // node of the one below it.
        let mut nodes = Vec::new();
        let mut current = Some(leaf);
        for table in ancestry[start..].iter().rev() {
            match current.and_then(|n| self.group.nodes.get(n).map(|node| (n, node))) {
                Some((n, node)) if node.source.table == table.name => {
                    nodes.push(n);
                    current = node.parent;
                }
                _ => {
                    debug!(index = %index.name, "Rejecting group index not contained in group");
                    return Ok(None);
                }
            }
        }
        nodes.reverse();

        let flags: Vec<bool> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| {
                if i == 0 {
                    self.path_required(*n)
                } else {
                    self.group.nodes[*n].required
                }
            })
            .collect();
        let compatible = match join_type {
            // Required tables first, then only optional ones.
            GroupIndexJoin::Left => flags[0] && !flags.windows(2).any(|w| !w[0] && w[1]),
            // The mirror: optional tables first, leaf required.
            GroupIndexJoin::Right => {
                flags.last().copied().unwrap_or(false) && !flags.windows(2).any(|w| w[0] && !w[1])
            }
        };
        if !compatible {
            debug!(
                index = %index.name,
                join = ?join_type,
                "Rejecting group index with incompatible join type"
            );
            return Ok(None);
        }
        Ok(Some(nodes))
    }

    /// Declared key columns followed by the hierarchical key columns the
    /// index stores implicitly.
    pub(super) fn key_columns(&self, leaf: usize, index: &IndexDef) -> Result<Vec<KeyColumn>> {
        let mut keys: Vec<KeyColumn> = index
            .columns
            .iter()
            .map(|c| KeyColumn {
                column: self.alias_column(leaf, &c.table, &c.column),
                ascending: c.ascending,
                recoverable: c.recoverable,
            })
            .collect();
        for hkey in self.ctx.catalog().hkey_columns(&index.table)? {
            let declared = index
                .columns
                .iter()
                .any(|c| c.table == hkey.table && c.column == hkey.column);
            if declared {
                continue;
            }
            keys.push(KeyColumn {
                column: self.alias_column(leaf, &hkey.table, &hkey.column),
                ascending: true,
                recoverable: true,
            });
        }
        Ok(keys)
    }

    /// Query column for a catalog column of `leaf` or one of its ancestors.
    ///
    /// An ancestor outside the group is reached through the join columns of
    /// the topmost group node below it.
    pub(super) fn alias_column(&self, leaf: usize, table: &str, column: &str) -> Option<ColumnRef> {
        if let Some(node) = self.ancestor_node(leaf, table) {
            return Some(ColumnRef::new(self.alias(node), column));
        }
        let mut top = leaf;
        while let Some(parent) = self.group.nodes.get(top).and_then(|n| n.parent) {
            top = parent;
        }
        let def = self.ctx.catalog().table(self.catalog_table(top)).ok()?;
        if def.parent_table() != Some(table) {
            return None;
        }
        def.child_column_for(column)
            .map(|child| ColumnRef::new(self.alias(top), child))
    }

    /// Predicates bounding `key` after the equalities.
    fn match_range(&self, key: &ColumnRef, used: &[ConditionId]) -> Option<RangeMatch> {
        let mut ranges: Option<ColumnRanges> = None;
        let mut ranges_usable = true;
        let mut bounds = Vec::new();
        for id in self.conditions.iter().copied().filter(|id| !used.contains(id)) {
            let expr = self.ctx.condition(id);
            let matches = |c: &ColumnRef| self.matches_key(c, key);
            if let Some(r) = ColumnRanges::from_condition(id, expr, &matches) {
                ranges = match ranges.take() {
                    None => Some(r),
                    Some(acc) => match acc.and(&r) {
                        Some(merged) => Some(merged),
                        None => {
                            ranges_usable = false;
                            None
                        }
                    },
                };
                continue;
            }
            if self.is_bound_inequality(expr, key) {
                bounds.push(id);
            }
        }

        let mut conditions = Vec::new();
        let mut segments = 0;
        if let Some(r) = ranges.filter(|_| ranges_usable) {
            if r.segments.len() > self.config.column_range_max_segments {
                debug!(column = %key, segments = r.segments.len(), "Range has too many segments");
            } else {
                segments = r.segments.len().max(1);
                conditions.extend(r.conditions);
            }
        }
        if !bounds.is_empty() {
            segments = segments.max(1);
            conditions.extend(bounds);
        }
        (!conditions.is_empty()).then_some(RangeMatch {
            conditions,
            segments,
        })
    }

    /// `key < bound` style comparison against a non-literal bound value.
    fn is_bound_inequality(&self, expr: &Expr, key: &ColumnRef) -> bool {
        let Expr::Compare { op, left, right } = expr else {
            return false;
        };
        if matches!(op, Comparison::Eq | Comparison::Ne) {
            return false;
        }
        [(left, right), (right, left)].into_iter().any(|(col, other)| {
            col.as_column().is_some_and(|c| self.matches_key(c, key))
                && other.as_literal().is_none()
                && self.is_bound_expr(other)
        })
    }

    /// Whether every column needed after `handled` is in the index entries.
    ///
    /// The first `declared` keys are the index's own columns; a needed column
    /// found only after them switches the scan to reading every column.
    pub(super) fn coverage(
        &self,
        aliases: &[String],
        keys: &[KeyColumn],
        declared: usize,
        handled: &[ConditionId],
    ) -> Result<Coverage> {
        let required = self.required_after(handled);
        let mut uses_all_columns = false;
        for node in self.output_nodes(&required) {
            let alias = self.alias(node);
            if !aliases.iter().any(|a| a == alias) {
                return Ok(Coverage::default());
            }
            let needed: Vec<String> = if required.all_columns(alias) {
                self.ctx.catalog().table(self.catalog_table(node))?.columns.clone()
            } else {
                required.columns_of(alias).map(String::from).collect()
            };
            for column in needed {
                let position = keys.iter().position(|k| {
                    k.recoverable
                        && k.column
                            .as_ref()
                            .is_some_and(|c| c.table == alias && c.column == column)
                });
                match position {
                    Some(p) => uses_all_columns |= p >= declared,
                    None => return Ok(Coverage::default()),
                }
            }
        }
        Ok(Coverage {
            covering: true,
            uses_all_columns,
        })
    }

    /// Match `index` against the goal, or `None` if it is of no use.
    pub(super) fn match_index(
        &self,
        leaf: usize,
        index: &'a IndexDef,
    ) -> Result<Option<IndexMatch<'a>>> {
        let Some(nodes) = self.index_nodes(leaf, index)? else {
            return Ok(None);
        };
        let keys = self.key_columns(leaf, index)?;

        let mut equalities = Vec::new();
        for key in &keys {
            let Some(column) = &key.column else {
                break;
            };
            match self.find_equality(column, &equalities) {
                Some(id) => equalities.push(id),
                None => break,
            }
        }

        let range = keys
            .get(equalities.len())
            .and_then(|k| k.column.as_ref())
            .and_then(|column| self.match_range(column, &equalities));

        let columns: Vec<Option<ColumnRef>> = keys.iter().map(|k| k.column.clone()).collect();
        let ascending: Vec<bool> = keys.iter().map(|k| k.ascending).collect();
        let ordering = determine_ordering(
            self.query_goal(),
            IndexOrder {
                columns: &columns,
                ascending: &ascending,
                equalities: equalities.len(),
                declared: index.columns.len(),
            },
            self.ctx.equivalences(),
        );

        let aliases: Vec<String> = nodes.iter().map(|n| self.alias(*n).to_string()).collect();
        let mut handled = equalities.clone();
        if let Some(r) = &range {
            handled.extend(r.conditions.iter().copied());
        }
        let coverage = self.coverage(&aliases, &keys, index.columns.len(), &handled)?;

        let useful_ordering =
            self.sort_allowed && ordering.effectiveness != OrderEffectiveness::None;
        if equalities.is_empty() && range.is_none() && !useful_ordering && !coverage.covering {
            debug!(index = %index.name, "Rejecting index with no bounds, order or coverage");
            return Ok(None);
        }

        let uses_all_columns =
            coverage.uses_all_columns || (useful_ordering && ordering.uses_all_columns);
        Ok(Some(IndexMatch {
            index,
            table: self.alias(leaf).to_string(),
            equalities,
            range,
            ordering,
            covering: coverage.covering,
            uses_all_columns,
        }))
    }

    pub(super) fn index_scan_plan(&self, candidate: &IndexMatch<'a>) -> Result<AccessPlan> {
        let handled = candidate.handled();
        let required = self.required_after(&handled);
        let need_sort = self.need_sort(candidate.ordering.effectiveness);

        let mut estimator =
            PlanCostEstimator::new(self.estimator, self.config.insertion_sort_max_limit);
        estimator.index_scan(candidate.shape());
        if !candidate.covering {
            estimator.flatten(&candidate.index.table, &self.output_tables(&required));
        }
        let cost = self.finish_cost(&mut estimator, &handled, need_sort)?;

        Ok(self.access_plan(
            AccessKind::IndexScan(candidate.scan()),
            candidate.ordering.effectiveness,
            candidate.covering,
            &required,
            cost,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::catalog::{Catalog, TableDef};
    use crate::config::OptimizerConfig;
    use crate::cost::{StatisticsCostModel, TableStatistics};
    use crate::query::QueryContext;
    use joinplan_proto::{Expr, JoinTree, OrderByItem, Query, TableGroup};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_table(TableDef::new("customers", &["id"]).with_column("name"))
            .with_table(
                TableDef::new("orders", &["id"])
                    .with_columns(&["total", "placed"])
                    .with_parent("customers", &[("cust_id", "id")]),
            )
            .with_table(
                TableDef::new("t", &["id"])
                    .with_columns(&["a", "b", "c", "d"])
                    .with_index(IndexDef::table("t_abc", "t", &["a", "b", "c"]))
                    .with_index(IndexDef::table("t_ab", "t", &["a", "b"]).unrecoverable("a")),
            )
            .with_group_index(IndexDef::group(
                "cust_name_total",
                "customers",
                "orders",
                GroupIndexJoin::Left,
                &[("customers", "name"), ("orders", "total")],
            ))
    }

    fn statistics() -> TableStatistics {
        TableStatistics::new()
            .with_count("customers", 100)
            .with_count("orders", 1000)
            .with_count("t", 10000)
    }

    fn compare(op: Comparison, column: &str, value: i64) -> Expr {
        Expr::compare(op, Expr::column("t", column), Expr::literal(value))
    }

    #[test]
    fn test_equality_prefix_then_range() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::table("t", "t"));
        let a = q.add_condition(compare(Comparison::Eq, "a", 1));
        let b = q.add_condition(compare(Comparison::Eq, "b", 2));
        let c = q.add_condition(compare(Comparison::Gt, "c", 5));
        q.where_conditions = vec![c, b, a];
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
        let index = &catalog.table("t").unwrap().indexes[0];

        let m = goal.match_index(0, index).unwrap().unwrap();
        assert_eq!(m.equalities, vec![a, b]);
        assert_eq!(m.range.as_ref().unwrap().conditions, vec![c]);
        assert_eq!(m.range_segments(), 1);
        assert!(!m.is_equality_complete());
    }

    fn covers(projection: &str) -> bool {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::table("t", "t"));
        let a = q.add_condition(compare(Comparison::Eq, "a", 1));
        q.where_conditions = vec![a];
        q.goal.projection = vec![Expr::column("t", projection)];
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(0).unwrap(),
            BTreeSet::new(),
            vec![a],
            true,
        );
        let index = &catalog.table("t").unwrap().indexes[1];
        goal.match_index(0, index).unwrap().unwrap().covering
    }

    #[test]
    fn test_covering_needs_recoverable_columns() {
        // `a` is consumed by the key, so only `b` is still needed.
        assert!(covers("b"));
        // `a` is a key column but cannot be read back from the entry.
        assert!(!covers("a"));
    }

    #[test]
    fn test_ordering_only_index_kept() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::table("t", "t"));
        q.goal.ordering = vec![OrderByItem::desc(Expr::column("t", "a"))];
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let group = ctx.group(0).unwrap();
        let index = &catalog.table("t").unwrap().indexes[0];

        let sortable = GroupGoal::new(&ctx, &config, &model, group, BTreeSet::new(), vec![], true);
        let m = sortable.match_index(0, index).unwrap().unwrap();
        assert_eq!(m.ordering.effectiveness, OrderEffectiveness::Sorted);
        assert!(m.scan().is_reverse());
        assert!(!m.scan().is_mixed());

        let nested = GroupGoal::new(&ctx, &config, &model, group, BTreeSet::new(), vec![], false);
        assert!(nested.match_index(0, index).unwrap().is_none());
    }

    #[test]
    fn test_hkey_columns_follow_declared() {
        let catalog = Catalog::new()
            .with_table(TableDef::new("customers", &["id"]))
            .with_table(
                TableDef::new("orders", &["id"])
                    .with_column("total")
                    .with_parent("customers", &[("cust_id", "id")])
                    .with_index(IndexDef::table("orders_total", "orders", &["total"])),
            );
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let q = Query::new(JoinTree::table("o", "orders"));
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(0).unwrap(),
            BTreeSet::new(),
            vec![],
            true,
        );
        let index = &catalog.table("orders").unwrap().indexes[0];
        let keys: Vec<Option<ColumnRef>> = goal
            .key_columns(0, index)
            .unwrap()
            .into_iter()
            .map(|k| k.column)
            .collect();
        assert_eq!(
            keys,
            vec![
                Some(ColumnRef::new("o", "total")),
                Some(ColumnRef::new("o", "cust_id")),
                Some(ColumnRef::new("o", "id")),
            ]
        );
    }

    /// Covering flag and scan of `orders_total` for a projection of `o`.
    fn orders_total_scan(projection: &[&str]) -> (bool, IndexScan) {
        let catalog = Catalog::new()
            .with_table(TableDef::new("customers", &["id"]))
            .with_table(
                TableDef::new("orders", &["id"])
                    .with_columns(&["total", "note"])
                    .with_parent("customers", &[("cust_id", "id")])
                    .with_index(IndexDef::table("orders_total", "orders", &["total"])),
            );
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let mut q = Query::new(JoinTree::table("o", "orders"));
        let total = q.add_condition(Expr::compare(
            Comparison::Gt,
            Expr::column("o", "total"),
            Expr::literal(10),
        ));
        q.where_conditions = vec![total];
        q.goal.projection = projection.iter().map(|c| Expr::column("o", *c)).collect();
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(0).unwrap(),
            BTreeSet::new(),
            vec![total],
            true,
        );
        let index = &catalog.table("orders").unwrap().indexes[0];
        let m = goal.match_index(0, index).unwrap().unwrap();
        (m.covering, m.scan())
    }

    #[test]
    fn test_covering_through_hkey_uses_all_columns() {
        let (covering, scan) = orders_total_scan(&["total"]);
        assert!(covering);
        assert!(!scan.uses_all_columns);

        // `id` is only in the hierarchical key part of the entry.
        let (covering, scan) = orders_total_scan(&["total", "id"]);
        assert!(covering);
        assert!(scan.uses_all_columns);

        let (covering, scan) = orders_total_scan(&["total", "note"]);
        assert!(!covering);
        assert!(!scan.uses_all_columns);
    }

    fn customer_orders(order_required: bool) -> Query {
        let group = TableGroup::single("c", "customers").with_child(
            0,
            "o",
            "orders",
            order_required,
            vec![],
        );
        Query::new(JoinTree::Group(group))
    }

    #[test]
    fn test_left_group_index_shape() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let index = catalog.group_indexes_for("orders").next().unwrap();

        for required in [true, false] {
            let q = customer_orders(required);
            let ctx = QueryContext::new(&q, &catalog).unwrap();
            let goal = GroupGoal::new(
                &ctx,
                &config,
                &model,
                ctx.group(0).unwrap(),
                BTreeSet::new(),
                vec![],
                true,
            );
            // Root required, child either way: both fit a LEFT index.
            assert_eq!(goal.index_nodes(1, index).unwrap(), Some(vec![0, 1]));
        }

        // The index spans two tables; a group of orders alone cannot use it.
        let q = Query::new(JoinTree::table("o", "orders"));
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(0).unwrap(),
            BTreeSet::new(),
            vec![],
            true,
        );
        assert_eq!(goal.index_nodes(0, index).unwrap(), None);
    }

    #[test]
    fn test_table_index_on_optional_node_rejected() {
        let catalog = catalog();
        let stats = statistics();
        let model = StatisticsCostModel::new(&stats, &catalog);
        let config = OptimizerConfig::default();
        let q = customer_orders(false);
        let ctx = QueryContext::new(&q, &catalog).unwrap();
        let goal = GroupGoal::new(
            &ctx,
            &config,
            &model,
            ctx.group(0).unwrap(),
            BTreeSet::new(),
            vec![],
            true,
        );
        let orders = IndexDef::table("orders_total", "orders", &["total"]);
        assert_eq!(goal.index_nodes(1, &orders).unwrap(), None);
        let customers = IndexDef::table("customers_name", "customers", &["name"]);
        assert_eq!(goal.index_nodes(0, &customers).unwrap(), Some(vec![0]));
    }
}
