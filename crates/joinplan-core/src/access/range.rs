//! Disjunctive ranges over one column.
//!
//! `a > 5`, `a <> 3`, `a IN (1, 2)` and `OR`s of these on the same column
//! normalise into a sorted list of disjoint segments. `AND`ed predicates
//! intersect their segment lists.

use std::cmp::Ordering;
use std::ops::Bound;

use joinplan_proto::{ColumnRef, Comparison, ConditionId, Expr, LogicalOp, Value};

/// One contiguous range of values.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSegment {
    pub low: Bound<Value>,
    pub high: Bound<Value>,
}

impl RangeSegment {
    pub fn point(value: Value) -> Self {
        Self {
            low: Bound::Included(value.clone()),
            high: Bound::Included(value),
        }
    }

    fn unbounded() -> Self {
        Self {
            low: Bound::Unbounded,
            high: Bound::Unbounded,
        }
    }

    /// Segment accepting `value OP literal` for a column on the left.
    fn from_comparison(op: Comparison, value: Value) -> Vec<Self> {
        let segment = |low, high| RangeSegment { low, high };
        match op {
            Comparison::Eq => vec![Self::point(value)],
            Comparison::Lt => vec![segment(Bound::Unbounded, Bound::Excluded(value))],
            Comparison::Le => vec![segment(Bound::Unbounded, Bound::Included(value))],
            Comparison::Gt => vec![segment(Bound::Excluded(value), Bound::Unbounded)],
            Comparison::Ge => vec![segment(Bound::Included(value), Bound::Unbounded)],
            Comparison::Ne => vec![
                segment(Bound::Unbounded, Bound::Excluded(value.clone())),
                segment(Bound::Excluded(value), Bound::Unbounded),
            ],
        }
    }

    /// Whether no value satisfies the segment. `None` when endpoints are
    /// not comparable.
    fn is_empty(&self) -> Option<bool> {
        let (low, low_inclusive) = match &self.low {
            Bound::Unbounded => return Some(false),
            Bound::Included(v) => (v, true),
            Bound::Excluded(v) => (v, false),
        };
        let (high, high_inclusive) = match &self.high {
            Bound::Unbounded => return Some(false),
            Bound::Included(v) => (v, true),
            Bound::Excluded(v) => (v, false),
        };
        Some(match low.compare(high)? {
            Ordering::Less => false,
            Ordering::Equal => !(low_inclusive && high_inclusive),
            Ordering::Greater => true,
        })
    }

    fn intersect(&self, other: &Self) -> Option<Self> {
        Some(Self {
            low: tighter_low(&self.low, &other.low)?,
            high: tighter_high(&self.high, &other.high)?,
        })
    }

    /// Whether the segment is a single value.
    pub fn is_point(&self) -> bool {
        match (&self.low, &self.high) {
            (Bound::Included(a), Bound::Included(b)) => a.compare(b) == Some(Ordering::Equal),
            _ => false,
        }
    }

    /// Whether `value` lies in the segment.
    pub fn contains(&self, value: &Value) -> bool {
        let above = match &self.low {
            Bound::Unbounded => true,
            Bound::Included(v) => {
                matches!(value.compare(v), Some(Ordering::Greater | Ordering::Equal))
            }
            Bound::Excluded(v) => value.compare(v) == Some(Ordering::Greater),
        };
        let below = match &self.high {
            Bound::Unbounded => true,
            Bound::Included(v) => {
                matches!(value.compare(v), Some(Ordering::Less | Ordering::Equal))
            }
            Bound::Excluded(v) => value.compare(v) == Some(Ordering::Less),
        };
        above && below
    }
}

fn tighter_low(a: &Bound<Value>, b: &Bound<Value>) -> Option<Bound<Value>> {
    Some(match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
            match x.compare(y)? {
                Ordering::Greater => a.clone(),
                Ordering::Less => b.clone(),
                Ordering::Equal if matches!(a, Bound::Excluded(_)) => a.clone(),
                Ordering::Equal => b.clone(),
            }
        }
    })
}

fn tighter_high(a: &Bound<Value>, b: &Bound<Value>) -> Option<Bound<Value>> {
    Some(match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
            match x.compare(y)? {
                Ordering::Less => a.clone(),
                Ordering::Greater => b.clone(),
                Ordering::Equal if matches!(a, Bound::Excluded(_)) => a.clone(),
                Ordering::Equal => b.clone(),
            }
        }
    })
}

/// Order of low endpoints, unbounded first.
fn compare_low(a: &Bound<Value>, b: &Bound<Value>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
            match x.compare(y).unwrap_or(Ordering::Equal) {
                Ordering::Equal => match (a, b) {
                    (Bound::Included(_), Bound::Excluded(_)) => Ordering::Less,
                    (Bound::Excluded(_), Bound::Included(_)) => Ordering::Greater,
                    _ => Ordering::Equal,
                },
                other => other,
            }
        }
    }
}

/// Whether a segment ending at `high` touches one starting at `low`.
fn touches(high: &Bound<Value>, low: &Bound<Value>) -> bool {
    match (high, low) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Included(h) | Bound::Excluded(h), Bound::Included(l) | Bound::Excluded(l)) => {
            match h.compare(l) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => {
                    matches!(high, Bound::Included(_)) || matches!(low, Bound::Included(_))
                }
                _ => false,
            }
        }
    }
}

/// Segments of the values of one column that satisfy a set of predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRanges {
    pub column: ColumnRef,
    /// Sorted and disjoint.
    pub segments: Vec<RangeSegment>,
    /// Predicates the segments stand for.
    pub conditions: Vec<ConditionId>,
}

impl ColumnRanges {
    /// Ranges for one predicate on a column matched by `matches`.
    ///
    /// Only literal comparands are understood; anything else yields `None`.
    pub fn from_condition(
        id: ConditionId,
        expr: &Expr,
        matches: &dyn Fn(&ColumnRef) -> bool,
    ) -> Option<Self> {
        let (column, segments) = Self::segments_of(expr, matches)?;
        Some(Self {
            column,
            segments: normalize(segments)?,
            conditions: vec![id],
        })
    }

    fn segments_of(
        expr: &Expr,
        matches: &dyn Fn(&ColumnRef) -> bool,
    ) -> Option<(ColumnRef, Vec<RangeSegment>)> {
        match expr {
            Expr::Compare { op, left, right } => {
                let (column, op, value) = match (left.as_ref(), right.as_ref()) {
                    (Expr::Column(c), Expr::Literal(v)) => (c, *op, v),
                    (Expr::Literal(v), Expr::Column(c)) => (c, op.reverse(), v),
                    _ => return None,
                };
                if !matches(column) || value.is_null() {
                    return None;
                }
                Some((column.clone(), RangeSegment::from_comparison(op, value.clone())))
            }
            Expr::InList { operand, list } => {
                let column = operand.as_column().filter(|c| matches(c))?;
                let mut segments = Vec::with_capacity(list.len());
                for item in list {
                    let value = item.as_literal().filter(|v| !v.is_null())?;
                    segments.push(RangeSegment::point(value.clone()));
                }
                Some((column.clone(), segments))
            }
            Expr::Logical {
                op: LogicalOp::Or,
                operands,
            } => {
                let mut column: Option<ColumnRef> = None;
                let mut segments = Vec::new();
                for operand in operands {
                    let (c, s) = Self::segments_of(operand, matches)?;
                    if column.as_ref().is_some_and(|prev| *prev != c) {
                        return None;
                    }
                    column = Some(c);
                    segments.extend(s);
                }
                Some((column?, segments))
            }
            Expr::Logical {
                op: LogicalOp::And,
                operands,
            } => {
                let mut column: Option<ColumnRef> = None;
                let mut segments = vec![RangeSegment::unbounded()];
                for operand in operands {
                    let (c, s) = Self::segments_of(operand, matches)?;
                    if column.as_ref().is_some_and(|prev| *prev != c) {
                        return None;
                    }
                    column = Some(c);
                    segments = intersect_segments(&segments, &normalize(s)?)?;
                }
                Some((column?, segments))
            }
            _ => None,
        }
    }

    /// Both sets of predicates at once.
    pub fn and(mut self, other: &ColumnRanges) -> Option<Self> {
        self.segments = intersect_segments(&self.segments, &other.segments)?;
        self.conditions.extend(other.conditions.iter().copied());
        Some(self)
    }

    /// No value can match.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `value` satisfies the ranges.
    pub fn contains(&self, value: &Value) -> bool {
        self.segments.iter().any(|s| s.contains(value))
    }
}

fn intersect_segments(a: &[RangeSegment], b: &[RangeSegment]) -> Option<Vec<RangeSegment>> {
    let mut out = Vec::new();
    for x in a {
        for y in b {
            let segment = x.intersect(y)?;
            if !segment.is_empty()? {
                out.push(segment);
            }
        }
    }
    normalize(out)
}

/// Sort segments and merge the ones that overlap or touch.
///
/// `None` when endpoints of different, unordered types are mixed.
fn normalize(segments: Vec<RangeSegment>) -> Option<Vec<RangeSegment>> {
    let mut reference: Option<&Value> = None;
    for segment in &segments {
        for bound in [&segment.low, &segment.high] {
            if let Bound::Included(v) | Bound::Excluded(v) = bound {
                match reference {
                    Some(r) => {
                        r.compare(v)?;
                    }
                    None => reference = Some(v),
                }
            }
        }
    }

    let mut kept = Vec::with_capacity(segments.len());
    for segment in segments {
        if !segment.is_empty()? {
            kept.push(segment);
        }
    }
    kept.sort_by(|a, b| compare_low(&a.low, &b.low));

    let mut out: Vec<RangeSegment> = Vec::with_capacity(kept.len());
    for segment in kept {
        match out.last_mut() {
            Some(last) if touches(&last.high, &segment.low) => {
                let high = match (&last.high, &segment.high) {
                    (Bound::Unbounded, _) | (_, Bound::Unbounded) => Bound::Unbounded,
                    _ => {
                        // The looser of the two upper ends.
                        if tighter_high(&last.high, &segment.high)? == last.high {
                            segment.high.clone()
                        } else {
                            last.high.clone()
                        }
                    }
                };
                last.high = high;
            }
            _ => out.push(segment),
        }
    }
    Some(out)
}
