//! Chosen access to one table group.

use joinplan_proto::ConditionId;

use crate::access::{FullTextQuery, OrderEffectiveness};
use crate::cost::CostEstimate;

/// One index scan, alone or as a leg of an intersection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexScan {
    pub index: String,
    /// Alias of the table the index entries point at.
    pub table: String,
    /// Leading key columns bound by equality, hierarchical key included.
    pub equalities: usize,
    /// Segments of the range on the column after the equalities; 0 when
    /// unbounded.
    pub range_segments: usize,
    /// Key columns traversed backwards, by key position; empty for a
    /// forward scan.
    pub reversed: Vec<bool>,
    /// A unique index bound on every declared column.
    pub single_row: bool,
    /// Reads the hierarchical key part of the entries as well as the
    /// declared columns.
    pub uses_all_columns: bool,
    /// Predicates turned into key bounds.
    pub index_conditions: Vec<ConditionId>,
}

/// How the rows of a group are produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessKind {
    IndexScan(IndexScan),
    /// Merge of equality-bound scans over the same table.
    Intersection(Vec<IndexScan>),
    Spatial {
        index: String,
        table: String,
        scans: usize,
    },
    FullText {
        index: String,
        table: String,
        query: FullTextQuery,
    },
    /// Direct fetch by hierarchical key.
    HKeyRow { table: String },
    /// Nested lookup of `inner` below a bound row of `outer`.
    GroupLoop { outer: String, inner: String },
    /// Read every row of the group.
    GroupScan,
}

impl IndexScan {
    /// Every key column runs backwards.
    pub fn is_reverse(&self) -> bool {
        !self.reversed.is_empty() && self.reversed.iter().all(|r| *r)
    }

    /// Some key columns run backwards and others forwards.
    pub fn is_mixed(&self) -> bool {
        self.reversed.iter().any(|r| *r) && !self.is_reverse()
    }
}

impl AccessKind {
    pub fn name(&self) -> &'static str {
        match self {
            AccessKind::IndexScan(_) => "IndexScan",
            AccessKind::Intersection(_) => "Intersection",
            AccessKind::Spatial { .. } => "SpatialScan",
            AccessKind::FullText { .. } => "FullTextScan",
            AccessKind::HKeyRow { .. } => "HKeyRow",
            AccessKind::GroupLoop { .. } => "GroupLoop",
            AccessKind::GroupScan => "GroupScan",
        }
    }

    /// Index name(s), comma separated for intersections.
    pub fn index_name(&self) -> Option<String> {
        match self {
            AccessKind::IndexScan(scan) => Some(scan.index.clone()),
            AccessKind::Intersection(scans) => Some(
                scans
                    .iter()
                    .map(|s| s.index.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            AccessKind::Spatial { index, .. } | AccessKind::FullText { index, .. } => {
                Some(index.clone())
            }
            _ => None,
        }
    }
}

/// Access plan for one table group.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPlan {
    pub kind: AccessKind,
    /// Every alias of the group, in node order.
    pub tables: Vec<String>,
    /// Aliases whose rows are produced.
    pub required_tables: Vec<String>,
    /// Aliases outside the group the access reads values from.
    pub bound_tables: Vec<String>,
    /// Predicates evaluated by the access: key bounds and filters.
    pub conditions: Vec<ConditionId>,
    pub ordering: OrderEffectiveness,
    /// No base-row fetch is needed.
    pub covering: bool,
    pub cost: CostEstimate,
}

impl AccessPlan {
    /// Equality count of the driving scan.
    pub fn equalities(&self) -> usize {
        match &self.kind {
            AccessKind::IndexScan(scan) => scan.equalities,
            AccessKind::Intersection(scans) => scans.iter().map(|s| s.equalities).sum(),
            _ => 0,
        }
    }

    pub fn has_range(&self) -> bool {
        matches!(&self.kind, AccessKind::IndexScan(scan) if scan.range_segments > 0)
    }

    /// Produces at most one row per outer row, so a semi-join over it
    /// behaves like an inner join.
    pub fn semi_join_equivalent(&self) -> bool {
        match &self.kind {
            AccessKind::IndexScan(scan) => scan.single_row && self.required_tables.len() == 1,
            AccessKind::HKeyRow { .. } => self.required_tables.len() == 1,
            _ => false,
        }
    }

    /// Whether the access evaluates `condition`.
    pub fn evaluates(&self, condition: ConditionId) -> bool {
        self.conditions.contains(&condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(index: &str, single_row: bool) -> IndexScan {
        IndexScan {
            index: index.to_string(),
            table: "o".to_string(),
            equalities: 1,
            range_segments: 0,
            reversed: vec![],
            single_row,
            uses_all_columns: false,
            index_conditions: vec![ConditionId(0)],
        }
    }

    fn plan(kind: AccessKind) -> AccessPlan {
        AccessPlan {
            kind,
            tables: vec!["o".to_string()],
            required_tables: vec!["o".to_string()],
            bound_tables: vec![],
            conditions: vec![ConditionId(0)],
            ordering: OrderEffectiveness::None,
            covering: true,
            cost: CostEstimate::new(1, 1.0, 1.0),
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(plan(AccessKind::GroupScan).kind.name(), "GroupScan");
        let both = AccessKind::Intersection(vec![scan("a", false), scan("b", false)]);
        assert_eq!(both.index_name().as_deref(), Some("a, b"));
        assert_eq!(AccessKind::GroupScan.index_name(), None);
    }

    #[test]
    fn test_scan_direction() {
        let mut s = scan("a", false);
        assert!(!s.is_reverse() && !s.is_mixed());
        s.reversed = vec![true, true];
        assert!(s.is_reverse());
        s.reversed = vec![false, true];
        assert!(s.is_mixed());
    }

    #[test]
    fn test_semi_join_equivalent() {
        assert!(plan(AccessKind::IndexScan(scan("pk", true))).semi_join_equivalent());
        assert!(!plan(AccessKind::IndexScan(scan("by_cust", false))).semi_join_equivalent());
        assert!(!plan(AccessKind::GroupScan).semi_join_equivalent());
    }

    #[test]
    fn test_equalities_and_conditions() {
        let p = plan(AccessKind::Intersection(vec![scan("a", false), scan("b", false)]));
        assert_eq!(p.equalities(), 2);
        assert!(!p.has_range());
        assert!(p.evaluates(ConditionId(0)));
        assert!(!p.evaluates(ConditionId(1)));
    }
}
