//! Logical query description handed to the optimizer.
//!
//! A query is a binary tree of joins whose leaves are [`TableGroup`]s: sets
//! of tables from one parent/child hierarchy that are always accessed
//! together by a single scan. Predicates live in one arena on the
//! [`Query`] and are referred to everywhere else by [`ConditionId`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::expr::{ColumnRef, Expr};

/// Index of a predicate in [`Query::conditions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConditionId(pub usize);

impl ConditionId {
    /// Position in the condition arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Join semantics of a join node or join operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    FullOuter,
    /// Semi join with no duplicate-elimination requirement.
    Semi,
    /// Semi join whose inner side is already known to be distinct.
    SemiAlreadyDistinct,
    /// Semi join that may be turned into an inner join plus a distinct.
    SemiIfDistinct,
    /// Inner join that must be followed by duplicate elimination.
    InnerNeedDistinct,
}

impl JoinType {
    /// Any of the semi-join flavours.
    pub fn is_semi(self) -> bool {
        matches!(
            self,
            JoinType::Semi | JoinType::SemiAlreadyDistinct | JoinType::SemiIfDistinct
        )
    }

    /// Preserves unmatched rows of at least one input.
    pub fn is_outer(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Right | JoinType::FullOuter)
    }

    /// Can be evaluated by looping over the left input and probing the right.
    pub fn is_left_linear(self) -> bool {
        matches!(
            self,
            JoinType::Inner
                | JoinType::Left
                | JoinType::Semi
                | JoinType::SemiAlreadyDistinct
                | JoinType::SemiIfDistinct
                | JoinType::InnerNeedDistinct
        )
    }

    /// Can be evaluated by looping over the right input and probing the left.
    pub fn is_right_linear(self) -> bool {
        matches!(
            self,
            JoinType::Inner | JoinType::Right | JoinType::InnerNeedDistinct
        )
    }

    /// SQL-ish label used by explain output.
    pub fn as_str(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::FullOuter => "FULL OUTER",
            JoinType::Semi => "SEMI",
            JoinType::SemiAlreadyDistinct => "SEMI (already distinct)",
            JoinType::SemiIfDistinct => "SEMI (if distinct)",
            JoinType::InnerNeedDistinct => "INNER (need distinct)",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table occurrence in the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSource {
    /// Alias, unique within the query.
    pub alias: String,
    /// Catalog table name.
    pub table: String,
}

impl TableSource {
    pub fn new(alias: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            table: table.into(),
        }
    }
}

/// One table of a [`TableGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableGroupNode {
    pub source: TableSource,
    /// Index of the parent node in [`TableGroup::nodes`]; `None` for the root.
    pub parent: Option<usize>,
    /// False when the table is the optional side of an outer join to its parent.
    pub required: bool,
    /// Predicates joining this node to its parent.
    pub join_conditions: Vec<ConditionId>,
}

/// Parent/child join between two tables of the same hierarchy that was not
/// folded into a single group, typically because the parent sits in another
/// branch of the join tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupJoin {
    /// Alias of the parent table.
    pub parent: String,
    /// Alias of the child table.
    pub child: String,
    pub conditions: Vec<ConditionId>,
}

/// Tables of one hierarchy scanned together.
///
/// Nodes are stored parents first; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableGroup {
    pub nodes: Vec<TableGroupNode>,
    #[serde(default)]
    pub rejected_joins: Vec<GroupJoin>,
}

impl TableGroup {
    /// A group with a single table.
    pub fn single(alias: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            nodes: vec![TableGroupNode {
                source: TableSource::new(alias, table),
                parent: None,
                required: true,
                join_conditions: Vec::new(),
            }],
            rejected_joins: Vec::new(),
        }
    }

    /// Add a child of node `parent`.
    pub fn with_child(
        mut self,
        parent: usize,
        alias: impl Into<String>,
        table: impl Into<String>,
        required: bool,
        join_conditions: Vec<ConditionId>,
    ) -> Self {
        self.nodes.push(TableGroupNode {
            source: TableSource::new(alias, table),
            parent: Some(parent),
            required,
            join_conditions,
        });
        self
    }

    /// Record a parent/child join that was not folded into this group.
    pub fn with_rejected_join(
        mut self,
        parent: impl Into<String>,
        child: impl Into<String>,
        conditions: Vec<ConditionId>,
    ) -> Self {
        self.rejected_joins.push(GroupJoin {
            parent: parent.into(),
            child: child.into(),
            conditions,
        });
        self
    }

    /// Alias of the root table.
    pub fn root_alias(&self) -> Option<&str> {
        self.nodes.first().map(|n| n.source.alias.as_str())
    }

    /// Position of the node with this alias.
    pub fn node_index(&self, alias: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.source.alias == alias)
    }

    /// Whether a node with this alias is part of the group.
    pub fn contains(&self, alias: &str) -> bool {
        self.node_index(alias).is_some()
    }

    /// Aliases of all nodes, in node order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.source.alias.as_str())
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: usize, node: usize) -> bool {
        let mut current = Some(node);
        while let Some(idx) = current {
            if idx == ancestor {
                return true;
            }
            current = self.nodes.get(idx).and_then(|n| n.parent);
        }
        false
    }
}

/// Binary join of two subtrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinNode {
    pub join_type: JoinType,
    pub left: Box<JoinTree>,
    pub right: Box<JoinTree>,
    /// ON-clause predicates.
    pub conditions: Vec<ConditionId>,
}

/// Join tree over table groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinTree {
    Group(TableGroup),
    Join(JoinNode),
}

impl JoinTree {
    /// Leaf for a single-table group.
    pub fn table(alias: impl Into<String>, table: impl Into<String>) -> Self {
        JoinTree::Group(TableGroup::single(alias, table))
    }

    /// Join two subtrees.
    pub fn join(
        join_type: JoinType,
        left: JoinTree,
        right: JoinTree,
        conditions: Vec<ConditionId>,
    ) -> Self {
        JoinTree::Join(JoinNode {
            join_type,
            left: Box::new(left),
            right: Box::new(right),
            conditions,
        })
    }

    /// Table groups in left-to-right order.
    pub fn groups(&self) -> Vec<&TableGroup> {
        let mut out = Vec::new();
        self.collect_groups(&mut out);
        out
    }

    fn collect_groups<'a>(&'a self, out: &mut Vec<&'a TableGroup>) {
        match self {
            JoinTree::Group(g) => out.push(g),
            JoinTree::Join(j) => {
                j.left.collect_groups(out);
                j.right.collect_groups(out);
            }
        }
    }
}

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expr: Expr,
    pub ascending: bool,
}

impl OrderByItem {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: false,
        }
    }
}

/// What the consumer of the join result needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryGoal {
    #[serde(default)]
    pub ordering: Vec<OrderByItem>,
    #[serde(default)]
    pub grouping: Vec<Expr>,
    /// SELECT DISTINCT over the projection.
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub projection: Vec<Expr>,
    #[serde(default)]
    pub limit: Option<u64>,
    /// Aliases bound by an enclosing query.
    #[serde(default)]
    pub outer_tables: Vec<String>,
}

/// A bound query ready for join enumeration and access-path selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Predicate arena.
    pub conditions: Vec<Expr>,
    pub tree: JoinTree,
    /// Top-level WHERE predicates.
    #[serde(default)]
    pub where_conditions: Vec<ConditionId>,
    #[serde(default)]
    pub goal: QueryGoal,
    /// Column pairs proven equal by predicates.
    #[serde(default)]
    pub equivalences: Vec<(ColumnRef, ColumnRef)>,
}

impl Query {
    /// A query over `tree` with no predicates yet.
    pub fn new(tree: JoinTree) -> Self {
        Self {
            conditions: Vec::new(),
            tree,
            where_conditions: Vec::new(),
            goal: QueryGoal::default(),
            equivalences: Vec::new(),
        }
    }

    /// Add a predicate to the arena and return its id.
    pub fn add_condition(&mut self, expr: Expr) -> ConditionId {
        self.conditions.push(expr);
        ConditionId(self.conditions.len() - 1)
    }

    /// Predicate by id.
    pub fn condition(&self, id: ConditionId) -> Option<&Expr> {
        self.conditions.get(id.0)
    }

    /// Decode from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let query: Query = serde_json::from_str(json)?;
        query.validate()?;
        Ok(query)
    }

    /// Check structural consistency: condition ids in range, unique aliases,
    /// well-formed groups.
    pub fn validate(&self) -> Result<(), Error> {
        let count = self.conditions.len();
        let check = |ids: &[ConditionId]| -> Result<(), Error> {
            for id in ids {
                if id.0 >= count {
                    return Err(Error::ConditionOutOfRange { id: id.0, count });
                }
            }
            Ok(())
        };

        check(&self.where_conditions)?;

        let mut aliases = HashSet::new();
        let mut stack = vec![&self.tree];
        while let Some(tree) = stack.pop() {
            match tree {
                JoinTree::Group(group) => {
                    let root = group.root_alias().ok_or(Error::EmptyGroup)?.to_string();
                    for (idx, node) in group.nodes.iter().enumerate() {
                        if !aliases.insert(node.source.alias.as_str()) {
                            return Err(Error::DuplicateAlias(node.source.alias.clone()));
                        }
                        match node.parent {
                            None if idx != 0 => {
                                return Err(Error::InvalidQuery(format!(
                                    "node {} of group {} has no parent",
                                    idx, root
                                )));
                            }
                            Some(parent) if parent >= idx => {
                                return Err(Error::InvalidGroupParent {
                                    root,
                                    node: idx,
                                    parent,
                                });
                            }
                            _ => {}
                        }
                        check(&node.join_conditions)?;
                    }
                    for join in &group.rejected_joins {
                        check(&join.conditions)?;
                        if !group.contains(&join.parent) && !group.contains(&join.child) {
                            return Err(Error::InvalidQuery(format!(
                                "rejected join {} -> {} does not touch group {}",
                                join.parent, join.child, root
                            )));
                        }
                    }
                }
                JoinTree::Join(join) => {
                    check(&join.conditions)?;
                    stack.push(&join.right);
                    stack.push(&join.left);
                }
            }
        }

        for outer in &self.goal.outer_tables {
            if aliases.contains(outer.as_str()) {
                return Err(Error::DuplicateAlias(outer.clone()));
            }
        }
        Ok(())
    }
}
