//! Join operators: the hyperedge sources of the join graph.

use std::fmt;

use joinplan_proto::{ConditionId, JoinType};

use crate::bitset::TableBitSet;

/// Position of an operator in [`JoinGraph::operators`](super::JoinGraph::operators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorId(pub(crate) usize);

impl OperatorId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where an operator came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorOrigin {
    /// A join node of the input tree.
    Join,
    /// A single predicate lifted out of WHERE or out of an inner join.
    Condition,
    /// A synthetic edge added to connect a disconnected graph.
    Connector,
}

/// One join operator and its reordering constraints.
#[derive(Debug, Clone)]
pub struct JoinOperator {
    pub origin: OperatorOrigin,
    pub join_type: JoinType,
    /// Predicates evaluated when this operator's edge is crossed.
    pub conditions: Vec<ConditionId>,
    pub left_tables: TableBitSet,
    pub right_tables: TableBitSet,
    /// Tables referenced by the operator's own predicates.
    pub predicate_tables: TableBitSet,
    /// Tables that must be present before the operator can be applied.
    pub tes: TableBitSet,
    /// This operator and everything below it are inner joins.
    pub all_inner_joins: bool,
    pub(crate) parent: Option<usize>,
    pub(crate) left: Option<usize>,
    pub(crate) right: Option<usize>,
}

impl JoinOperator {
    /// Operator for a join node; sides and TES are filled in by the builder.
    pub(crate) fn for_join(join_type: JoinType, conditions: Vec<ConditionId>) -> Self {
        Self {
            origin: OperatorOrigin::Join,
            join_type,
            conditions,
            left_tables: TableBitSet::EMPTY,
            right_tables: TableBitSet::EMPTY,
            predicate_tables: TableBitSet::EMPTY,
            tes: TableBitSet::EMPTY,
            all_inner_joins: join_type == JoinType::Inner,
            parent: None,
            left: None,
            right: None,
        }
    }

    /// Inner operator for one predicate between two table sets.
    pub(crate) fn for_condition(
        condition: ConditionId,
        left_tables: TableBitSet,
        right_tables: TableBitSet,
    ) -> Self {
        let tables = left_tables | right_tables;
        Self {
            origin: OperatorOrigin::Condition,
            join_type: JoinType::Inner,
            conditions: vec![condition],
            left_tables,
            right_tables,
            predicate_tables: tables,
            tes: tables,
            all_inner_joins: false,
            parent: None,
            left: None,
            right: None,
        }
    }

    /// Predicate-free inner operator joining two disconnected parts.
    pub(crate) fn connector(left_tables: TableBitSet, right_tables: TableBitSet) -> Self {
        Self {
            origin: OperatorOrigin::Connector,
            join_type: JoinType::Inner,
            conditions: Vec::new(),
            left_tables,
            right_tables,
            predicate_tables: TableBitSet::EMPTY,
            tes: TableBitSet::EMPTY,
            all_inner_joins: false,
            parent: None,
            left: None,
            right: None,
        }
    }

    /// Both syntactic sides.
    pub fn tables(&self) -> TableBitSet {
        self.left_tables | self.right_tables
    }

    /// Parent operator in the input tree.
    pub fn parent(&self) -> Option<OperatorId> {
        self.parent.map(OperatorId)
    }

    /// Whether the operator may be applied with its inputs swapped.
    pub fn is_commutative(&self) -> bool {
        commute_join_type(self.join_type).is_some()
    }
}

impl fmt::Display for JoinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} {} {} tes={} [",
            self.origin, self.left_tables, self.join_type, self.right_tables, self.tes
        )?;
        for (i, c) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

/// Join type that holds when the two inputs are swapped, if any.
pub fn commute_join_type(join_type: JoinType) -> Option<JoinType> {
    match join_type {
        JoinType::Inner | JoinType::FullOuter => Some(join_type),
        JoinType::SemiAlreadyDistinct => Some(JoinType::Inner),
        JoinType::SemiIfDistinct => Some(JoinType::InnerNeedDistinct),
        _ => None,
    }
}

/// Whether a parent operator of type `parent` may not be reassociated
/// across a descendant of type `child`.
pub fn operator_conflict(parent: JoinType, child: JoinType) -> bool {
    match parent {
        JoinType::Inner => child == JoinType::FullOuter,
        JoinType::Left => child != JoinType::Left,
        JoinType::FullOuter => child == JoinType::Inner,
        _ => true,
    }
}
