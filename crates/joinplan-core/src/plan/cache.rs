//! Best plan per table subset.

use crate::bitset::{TableBitSet, MAX_TABLES};
use crate::error::{Error, Result};

/// Dense array of plans indexed by the raw value of a [`TableBitSet`].
///
/// Slot `s` holds the best plan found so far that joins exactly the tables
/// of `s`.
#[derive(Debug, Clone)]
pub struct PlanCache<P> {
    tables: usize,
    slots: Vec<Option<P>>,
}

impl<P> PlanCache<P> {
    /// Cache for a graph of `tables` tables.
    pub fn new(tables: usize) -> Result<Self> {
        if tables > MAX_TABLES {
            return Err(Error::TooManyTables {
                count: tables,
                max: MAX_TABLES,
            });
        }
        let mut slots = Vec::new();
        slots.resize_with(1usize << tables, || None);
        Ok(Self { tables, slots })
    }

    /// Number of tables the cache was sized for.
    pub fn table_count(&self) -> usize {
        self.tables
    }

    /// The set of every table.
    pub fn all_tables(&self) -> TableBitSet {
        TableBitSet::first_n(self.tables)
    }

    fn slot(&self, set: TableBitSet) -> Option<usize> {
        let index = set.bits() as usize;
        (index < self.slots.len()).then_some(index)
    }

    pub fn get(&self, set: TableBitSet) -> Option<&P> {
        self.slot(set).and_then(|i| self.slots[i].as_ref())
    }

    pub fn contains(&self, set: TableBitSet) -> bool {
        self.get(set).is_some()
    }

    /// Plans for two distinct sets at once.
    pub fn pair(&self, a: TableBitSet, b: TableBitSet) -> Option<(&P, &P)> {
        Some((self.get(a)?, self.get(b)?))
    }

    /// Store `plan` for `set`, replacing any previous entry.
    pub fn set(&mut self, set: TableBitSet, plan: P) {
        if let Some(i) = self.slot(set) {
            self.slots[i] = Some(plan);
        }
    }

    /// Remove and return the plan for `set`.
    pub fn take(&mut self, set: TableBitSet) -> Option<P> {
        self.slot(set).and_then(|i| self.slots[i].take())
    }

    /// Drop every plan.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    /// Sets that currently hold a plan, in increasing order.
    pub fn filled(&self) -> impl Iterator<Item = TableBitSet> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| TableBitSet::from_bits(i as u64))
    }

    /// Plan joining every table, once the search has found one.
    pub fn full_plan(&self) -> Option<&P> {
        self.get(self.all_tables())
    }
}
