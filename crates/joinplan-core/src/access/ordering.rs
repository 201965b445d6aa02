//! How well an index order serves ORDER BY, GROUP BY and DISTINCT.

use std::fmt;

use joinplan_proto::{ColumnRef, Expr, QueryGoal};

use crate::query::EquivalenceFinder;

/// Usefulness of an access's natural row order, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrderEffectiveness {
    None,
    /// Some leading grouping columns arrive together.
    PartialGrouped,
    /// Every group arrives contiguously.
    Grouped,
    /// Rows arrive in the requested order.
    Sorted,
}

impl OrderEffectiveness {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderEffectiveness::None => "NONE",
            OrderEffectiveness::PartialGrouped => "PARTIAL_GROUPED",
            OrderEffectiveness::Grouped => "GROUPED",
            OrderEffectiveness::Sorted => "SORTED",
        }
    }
}

impl fmt::Display for OrderEffectiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effectiveness plus the scan directions that achieve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingMatch {
    pub effectiveness: OrderEffectiveness,
    /// Key columns traversed against their stored direction, by key
    /// position. Empty when the whole scan runs forward.
    pub reversed: Vec<bool>,
    /// A key column past the declared ones serves the order.
    pub uses_all_columns: bool,
}

impl OrderingMatch {
    pub const NONE: OrderingMatch = OrderingMatch {
        effectiveness: OrderEffectiveness::None,
        reversed: Vec::new(),
        uses_all_columns: false,
    };

    fn forward(effectiveness: OrderEffectiveness, uses_all_columns: bool) -> Self {
        Self {
            effectiveness,
            reversed: Vec::new(),
            uses_all_columns,
        }
    }
}

/// Key order of one index scan.
#[derive(Debug, Clone, Copy)]
pub struct IndexOrder<'a> {
    /// Key columns as query columns; `None` where a key column has no
    /// counterpart in the query.
    pub columns: &'a [Option<ColumnRef>],
    pub ascending: &'a [bool],
    /// Leading columns fixed by equality predicates.
    pub equalities: usize,
    /// Declared key columns; the rest is the implicit hierarchical key.
    pub declared: usize,
}

impl IndexOrder<'_> {
    fn column_matches(&self, index: usize, column: &ColumnRef, eq: &EquivalenceFinder) -> bool {
        matches!(self.columns.get(index), Some(Some(c)) if eq.are_equivalent(c, column))
    }

    /// Fixed by an equality, so constant within the scan.
    fn is_constant(&self, column: &ColumnRef, eq: &EquivalenceFinder) -> bool {
        (0..self.equalities.min(self.columns.len())).any(|i| self.column_matches(i, column, eq))
    }

    /// Consume the key columns after the equalities while they belong to
    /// `wanted`; returns how many were consumed and what is left unmatched.
    fn match_set<'c>(
        &self,
        wanted: Vec<&'c ColumnRef>,
        eq: &EquivalenceFinder,
    ) -> (usize, Vec<&'c ColumnRef>) {
        let mut remaining: Vec<&ColumnRef> = wanted
            .into_iter()
            .filter(|c| !self.is_constant(c, eq))
            .collect();
        let mut matched = 0;
        let mut index = self.equalities;
        while !remaining.is_empty() {
            let Some(pos) = remaining
                .iter()
                .position(|c| self.column_matches(index, c, eq))
            else {
                break;
            };
            // Duplicates of the same column are satisfied together.
            let column = remaining.remove(pos);
            remaining.retain(|c| !eq.are_equivalent(c, column));
            matched += 1;
            index += 1;
        }
        (matched, remaining)
    }

    /// Whether consuming `matched` columns after the equalities reaches
    /// past the declared key.
    fn reaches_hkey(&self, matched: usize) -> bool {
        matched > 0 && self.equalities + matched > self.declared
    }
}

fn columns_of(exprs: &[Expr]) -> Option<Vec<ColumnRef>> {
    exprs.iter().map(|e| e.as_column().cloned()).collect()
}

/// Classify `order` against the goal's ORDER BY, else GROUP BY, else
/// DISTINCT.
pub fn determine_ordering(
    goal: &QueryGoal,
    order: IndexOrder<'_>,
    eq: &EquivalenceFinder,
) -> OrderingMatch {
    if !goal.ordering.is_empty() {
        return match_order_by(goal, order, eq);
    }
    if !goal.grouping.is_empty() {
        let Some(columns) = columns_of(&goal.grouping) else {
            return OrderingMatch::NONE;
        };
        let (matched, remaining) = order.match_set(columns.iter().collect(), eq);
        let effectiveness = if remaining.is_empty() {
            OrderEffectiveness::Grouped
        } else if matched > 0 {
            OrderEffectiveness::PartialGrouped
        } else {
            OrderEffectiveness::None
        };
        return OrderingMatch::forward(effectiveness, order.reaches_hkey(matched));
    }
    if goal.distinct {
        let Some(columns) = columns_of(&goal.projection) else {
            return OrderingMatch::NONE;
        };
        let (matched, remaining) = order.match_set(columns.iter().collect(), eq);
        if remaining.is_empty() && !columns.is_empty() {
            return OrderingMatch::forward(
                OrderEffectiveness::Sorted,
                order.reaches_hkey(matched),
            );
        }
    }
    OrderingMatch::NONE
}

/// ORDER BY columns must follow the key after the equalities. A column
/// whose direction differs from the stored one is scanned backwards on its
/// own, so mixed directions are served by a mixed-mode scan.
fn match_order_by(
    goal: &QueryGoal,
    order: IndexOrder<'_>,
    eq: &EquivalenceFinder,
) -> OrderingMatch {
    let mut reversed = vec![false; order.columns.len()];
    let mut uses_all_columns = false;
    let mut index = order.equalities;
    for item in &goal.ordering {
        let Some(column) = item.expr.as_column() else {
            return OrderingMatch::NONE;
        };
        if order.is_constant(column, eq) {
            continue;
        }
        if !order.column_matches(index, column, eq) {
            return OrderingMatch::NONE;
        }
        let ascending = order.ascending.get(index).copied().unwrap_or(true);
        if item.ascending != ascending {
            reversed[index] = true;
            if index == order.equalities {
                // The equality prefix follows the first ordered column.
                reversed[..index].fill(true);
            }
        }
        uses_all_columns |= index >= order.declared;
        index += 1;
    }
    // Columns after the ORDER BY follow the last one.
    if index > 0 && index < reversed.len() && reversed[index - 1] {
        reversed[index..].fill(true);
    }
    if !reversed.iter().any(|r| *r) {
        reversed.clear();
    }
    OrderingMatch {
        effectiveness: OrderEffectiveness::Sorted,
        reversed,
        uses_all_columns,
    }
}

/// Whether rows in `effectiveness` order still need a sort for `goal`.
pub fn needs_sort(goal: &QueryGoal, effectiveness: OrderEffectiveness) -> bool {
    if !goal.ordering.is_empty() {
        effectiveness != OrderEffectiveness::Sorted
    } else if !goal.grouping.is_empty() {
        effectiveness < OrderEffectiveness::Grouped
    } else if goal.distinct {
        effectiveness != OrderEffectiveness::Sorted
    } else {
        false
    }
}

/// Fields a sort for `goal` compares.
pub fn sort_fields(goal: &QueryGoal) -> usize {
    if !goal.ordering.is_empty() {
        goal.ordering.len()
    } else if !goal.grouping.is_empty() {
        goal.grouping.len()
    } else {
        goal.projection.len()
    }
}
