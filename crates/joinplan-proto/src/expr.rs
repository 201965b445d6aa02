//! Scalar and boolean expressions over table columns.
//!
//! Expressions are already bound: every column reference names the alias of a
//! table source in the query and a column of that table.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Reference to a column of a table source, by alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Alias of the table source.
    pub table: String,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// Create a new column reference.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    /// The operator that holds with the operands swapped.
    pub fn reverse(self) -> Self {
        match self {
            Comparison::Eq => Comparison::Eq,
            Comparison::Ne => Comparison::Ne,
            Comparison::Lt => Comparison::Gt,
            Comparison::Le => Comparison::Ge,
            Comparison::Gt => Comparison::Lt,
            Comparison::Ge => Comparison::Le,
        }
    }

    /// Whether the operator accepts `left.cmp(right) == ordering`.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Le => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
        }
    }

    /// SQL symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// Boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// A bound expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column of a table source.
    Column(ColumnRef),
    /// Constant.
    Literal(Value),
    /// Positional query parameter, constant for the duration of one execution.
    Parameter(usize),
    /// Function call. `isNull(x)` is the IS NULL predicate.
    Function { name: String, args: Vec<Expr> },
    /// Binary comparison.
    Compare {
        op: Comparison,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `operand IN (list...)`.
    InList { operand: Box<Expr>, list: Vec<Expr> },
    /// AND / OR over any number of operands, NOT over exactly one.
    Logical { op: LogicalOp, operands: Vec<Expr> },
}

impl Expr {
    /// Column reference expression.
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(table, column))
    }

    /// Literal expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Function call expression.
    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// Comparison expression.
    pub fn compare(op: Comparison, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left = right`.
    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(Comparison::Eq, left, right)
    }

    /// `IS NULL`.
    pub fn is_null(operand: Expr) -> Self {
        Self::function("isNull", vec![operand])
    }

    /// `operand IN (list...)`.
    pub fn in_list(operand: Expr, list: Vec<Expr>) -> Self {
        Expr::InList {
            operand: Box::new(operand),
            list,
        }
    }

    /// Conjunction.
    pub fn and(operands: Vec<Expr>) -> Self {
        Expr::Logical {
            op: LogicalOp::And,
            operands,
        }
    }

    /// Disjunction.
    pub fn or(operands: Vec<Expr>) -> Self {
        Expr::Logical {
            op: LogicalOp::Or,
            operands,
        }
    }

    /// Negation.
    pub fn not(operand: Expr) -> Self {
        Expr::Logical {
            op: LogicalOp::Not,
            operands: vec![operand],
        }
    }

    /// Get the column reference if this is a bare column.
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(c) => Some(c),
            _ => None,
        }
    }

    /// Get the literal if this is a constant value.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the expression references no columns at all.
    pub fn is_constant(&self) -> bool {
        let mut constant = true;
        self.visit_columns(&mut |_| constant = false);
        constant
    }

    /// Call `f` for every column reference, depth first, left to right.
    pub fn visit_columns<'a>(&'a self, f: &mut dyn FnMut(&'a ColumnRef)) {
        match self {
            Expr::Column(c) => f(c),
            Expr::Literal(_) | Expr::Parameter(_) => {}
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.visit_columns(f);
                }
            }
            Expr::Compare { left, right, .. } => {
                left.visit_columns(f);
                right.visit_columns(f);
            }
            Expr::InList { operand, list } => {
                operand.visit_columns(f);
                for item in list {
                    item.visit_columns(f);
                }
            }
            Expr::Logical { operands, .. } => {
                for operand in operands {
                    operand.visit_columns(f);
                }
            }
        }
    }

    /// All column references, in visit order (duplicates kept).
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.visit_columns(&mut |c| out.push(c));
        out
    }

    /// Distinct table aliases referenced, sorted.
    pub fn tables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.visit_columns(&mut |c| out.push(c.table.as_str()));
        out.sort_unstable();
        out.dedup();
        out
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Parameter(i) => write!(f, "${}", i),
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Compare { op, left, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Expr::InList { operand, list } => {
                write!(f, "{} IN (", operand)?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Expr::Logical { op, operands } => match op {
                LogicalOp::Not => match operands.first() {
                    Some(inner) => write!(f, "NOT ({})", inner),
                    None => write!(f, "NOT ()"),
                },
                LogicalOp::And | LogicalOp::Or => {
                    let sep = if *op == LogicalOp::And { " AND " } else { " OR " };
                    write!(f, "(")?;
                    for (i, operand) in operands.iter().enumerate() {
                        if i > 0 {
                            write!(f, "{}", sep)?;
                        }
                        write!(f, "{}", operand)?;
                    }
                    write!(f, ")")
                }
            },
        }
    }
}
