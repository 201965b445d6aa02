//! Table statistics consumed by the default cost model.
//!
//! Row counts per table and distinct-value counts per column. Collection is
//! the host's job; this module only stores what it is told.

use std::collections::HashMap;

use dashmap::DashMap;

/// Statistics for cost estimation.
///
/// Thread-safe: hosts may refresh counts while optimizations run.
pub struct TableStatistics {
    /// Row count per catalog table.
    row_counts: DashMap<String, u64>,
    /// Distinct values per `(table, column)`.
    distinct_counts: DashMap<(String, String), u64>,
}

impl TableStatistics {
    /// Create a new empty statistics tracker.
    pub fn new() -> Self {
        Self {
            row_counts: DashMap::new(),
            distinct_counts: DashMap::new(),
        }
    }

    /// Set the row count for a table.
    pub fn set_count(&self, table: &str, count: u64) {
        self.row_counts.insert(table.to_string(), count);
    }

    /// Builder form of [`set_count`](Self::set_count).
    pub fn with_count(self, table: &str, count: u64) -> Self {
        self.set_count(table, count);
        self
    }

    /// Row count of a table, if known.
    pub fn row_count(&self, table: &str) -> Option<u64> {
        self.row_counts.get(table).map(|c| *c)
    }

    /// Increment the count for a table.
    pub fn increment(&self, table: &str) {
        *self.row_counts.entry(table.to_string()).or_insert(0) += 1;
    }

    /// Decrement the count for a table, stopping at zero.
    pub fn decrement(&self, table: &str) {
        if let Some(mut count) = self.row_counts.get_mut(table) {
            *count = count.saturating_sub(1);
        }
    }

    /// Set the number of distinct values of a column.
    pub fn set_distinct(&self, table: &str, column: &str, distinct: u64) {
        self.distinct_counts
            .insert((table.to_string(), column.to_string()), distinct);
    }

    /// Builder form of [`set_distinct`](Self::set_distinct).
    pub fn with_distinct(self, table: &str, column: &str, distinct: u64) -> Self {
        self.set_distinct(table, column, distinct);
        self
    }

    /// Distinct values of a column, if known.
    pub fn distinct_count(&self, table: &str, column: &str) -> Option<u64> {
        self.distinct_counts
            .get(&(table.to_string(), column.to_string()))
            .map(|c| *c)
    }

    /// Get all row counts as a snapshot.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.row_counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Get total rows across all tables.
    pub fn total_rows(&self) -> u64 {
        self.row_counts.iter().map(|entry| *entry.value()).sum()
    }
}

impl Default for TableStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_statistics() {
        let stats = TableStatistics::new();
        assert_eq!(stats.row_count("orders"), None);
        assert_eq!(stats.total_rows(), 0);
    }

    #[test]
    fn test_set_count() {
        let stats = TableStatistics::new();

        stats.set_count("orders", 100);
        assert_eq!(stats.row_count("orders"), Some(100));

        stats.set_count("orders", 50);
        assert_eq!(stats.row_count("orders"), Some(50));
    }

    #[test]
    fn test_increment_decrement() {
        let stats = TableStatistics::new();

        stats.increment("orders");
        stats.increment("orders");
        stats.increment("orders");
        assert_eq!(stats.row_count("orders"), Some(3));

        stats.decrement("orders");
        assert_eq!(stats.row_count("orders"), Some(2));

        // Decrement on an unknown table is a no-op
        stats.decrement("items");
        assert_eq!(stats.row_count("items"), None);
    }

    #[test]
    fn test_decrement_at_zero() {
        let stats = TableStatistics::new().with_count("orders", 1);
        stats.decrement("orders");
        stats.decrement("orders");
        assert_eq!(stats.row_count("orders"), Some(0));
    }

    #[test]
    fn test_distinct_counts() {
        let stats = TableStatistics::new().with_distinct("orders", "cust_id", 250);
        assert_eq!(stats.distinct_count("orders", "cust_id"), Some(250));
        assert_eq!(stats.distinct_count("orders", "total"), None);
    }

    #[test]
    fn test_snapshot() {
        let stats = TableStatistics::new()
            .with_count("customers", 10)
            .with_count("orders", 20);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.get("customers"), Some(&10));
        assert_eq!(snapshot.get("orders"), Some(&20));
        assert_eq!(stats.total_rows(), 30);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(TableStatistics::new());

        let mut handles = vec![];

        for _ in 0..10 {
            let stats_clone = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats_clone.increment("orders");
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.row_count("orders"), Some(1000));
    }
}
