//! Sets of join-graph tables packed into one machine word.
//!
//! Table `i` of a join graph is bit `i`. The raw value doubles as the index
//! of the set's slot in the [`PlanCache`](crate::plan::PlanCache), which is
//! why the width is capped well below 64.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Sub};

/// Largest number of tables a join graph may contain.
pub const MAX_TABLES: usize = 30;

/// A set of table positions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TableBitSet(u64);

impl TableBitSet {
    /// The empty set.
    pub const EMPTY: TableBitSet = TableBitSet(0);

    /// Wrap a raw value.
    pub const fn from_bits(bits: u64) -> Self {
        TableBitSet(bits)
    }

    /// Raw value.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Set containing only table `index`.
    pub fn single(index: usize) -> Self {
        debug_assert!(index < 64);
        TableBitSet(1u64 << index)
    }

    /// Tables `0..count`.
    pub fn first_n(count: usize) -> Self {
        if count >= 64 {
            TableBitSet(u64::MAX)
        } else {
            TableBitSet((1u64 << count) - 1)
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, index: usize) -> bool {
        index < 64 && self.0 & (1u64 << index) != 0
    }

    /// Number of members.
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn union(self, other: Self) -> Self {
        TableBitSet(self.0 | other.0)
    }

    pub fn intersection(self, other: Self) -> Self {
        TableBitSet(self.0 & other.0)
    }

    pub fn difference(self, other: Self) -> Self {
        TableBitSet(self.0 & !other.0)
    }

    /// Whether any member is shared.
    pub fn overlaps(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether every member of `self` is in `other`. The empty set is a
    /// subset of everything.
    pub fn is_subset_of(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// Set holding only the lowest member, or empty.
    pub fn min_subset(self) -> Self {
        TableBitSet(self.0 & self.0.wrapping_neg())
    }

    /// Position of the lowest member.
    pub fn min_index(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// All tables at or below the lowest member, i.e. `{0..=min}`.
    pub fn up_to_min(self) -> Self {
        let min = self.min_subset();
        if min.is_empty() {
            min
        } else {
            TableBitSet(min.0 | (min.0 - 1))
        }
    }

    /// Member positions in increasing order.
    pub fn iter(self) -> Members {
        Members(self.0)
    }

    /// Non-empty subsets in increasing numeric order.
    pub fn subsets(self) -> Subsets {
        Subsets {
            set: self.0,
            current: 0,
        }
    }
}

/// Iterator over member positions.
pub struct Members(u64);

impl Iterator for Members {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let idx = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(idx)
    }
}

/// Iterator over non-empty subsets.
pub struct Subsets {
    set: u64,
    current: u64,
}

impl Iterator for Subsets {
    type Item = TableBitSet;

    fn next(&mut self) -> Option<TableBitSet> {
        self.current = self.current.wrapping_sub(self.set) & self.set;
        if self.current == 0 {
            None
        } else {
            Some(TableBitSet(self.current))
        }
    }
}

impl FromIterator<usize> for TableBitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        iter.into_iter()
            .fold(TableBitSet::EMPTY, |acc, i| acc | TableBitSet::single(i))
    }
}

impl BitOr for TableBitSet {
    type Output = TableBitSet;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for TableBitSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TableBitSet {
    type Output = TableBitSet;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl BitAndAssign for TableBitSet {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Sub for TableBitSet {
    type Output = TableBitSet;

    fn sub(self, rhs: Self) -> Self {
        self.difference(rhs)
    }
}

impl fmt::Debug for TableBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for TableBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, idx) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", idx)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(members: &[usize]) -> TableBitSet {
        members.iter().copied().collect()
    }

    #[test]
    fn test_basic_ops() {
        let a = set(&[0, 2]);
        let b = set(&[2, 3]);
        assert_eq!(a | b, set(&[0, 2, 3]));
        assert_eq!(a & b, set(&[2]));
        assert_eq!(a - b, set(&[0]));
        assert!(a.overlaps(b));
        assert!(!set(&[1]).overlaps(a));
        assert_eq!((a | b).count(), 3);
    }

    #[test]
    fn test_subset() {
        assert!(set(&[1]).is_subset_of(set(&[0, 1])));
        assert!(!set(&[2]).is_subset_of(set(&[0, 1])));
        assert!(TableBitSet::EMPTY.is_subset_of(set(&[3])));
    }

    #[test]
    fn test_min() {
        let s = set(&[3, 5, 9]);
        assert_eq!(s.min_subset(), set(&[3]));
        assert_eq!(s.min_index(), Some(3));
        assert_eq!(s.up_to_min(), set(&[0, 1, 2, 3]));
        assert_eq!(TableBitSet::EMPTY.min_index(), None);
        assert!(TableBitSet::EMPTY.up_to_min().is_empty());
    }

    #[test]
    fn test_members() {
        let s = set(&[4, 1, 7]);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![1, 4, 7]);
        assert_eq!(s.to_string(), "{1,4,7}");
    }

    #[test]
    fn test_subsets_in_increasing_order() {
        let s = set(&[0, 2, 3]);
        let subsets: Vec<u64> = s.subsets().map(|x| x.bits()).collect();
        assert_eq!(subsets, vec![0b0001, 0b0100, 0b0101, 0b1000, 0b1001, 0b1100, 0b1101]);
        assert_eq!(TableBitSet::EMPTY.subsets().count(), 0);
    }

    #[test]
    fn test_first_n() {
        assert_eq!(TableBitSet::first_n(3), set(&[0, 1, 2]));
        assert_eq!(TableBitSet::first_n(0), TableBitSet::EMPTY);
    }
}
