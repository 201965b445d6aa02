//! Optimizer configuration.

use serde::{Deserialize, Serialize};

use crate::bitset::MAX_TABLES;

/// Tunables for one optimizer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Maximum tables in one join graph. Values above 30 are clamped.
    pub max_tables: usize,

    /// Disjunctive ranges with more segments are not used as index bounds.
    pub column_range_max_segments: usize,

    /// A LIMIT at or below this is costed as a bounded insertion sort.
    pub insertion_sort_max_limit: u64,

    /// Consider intersections of equality-only index scans.
    pub enable_intersections: bool,

    /// Maximum number of index scans combined in one intersection.
    pub max_intersection_depth: usize,

    /// Consider nested lookups driven by an outer row of the same hierarchy.
    pub enable_group_loops: bool,

    /// Retry with synthetic edges when the join graph is disconnected.
    pub disconnected_repair: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_tables: MAX_TABLES,
            column_range_max_segments: 16,
            insertion_sort_max_limit: 100,
            enable_intersections: true,
            max_intersection_depth: 4,
            enable_group_loops: true,
            disconnected_repair: true,
        }
    }
}

impl OptimizerConfig {
    /// Decode from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Effective table cap.
    pub fn table_limit(&self) -> usize {
        self.max_tables.min(MAX_TABLES)
    }

    /// Set the table cap.
    pub fn max_tables(mut self, max: usize) -> Self {
        self.max_tables = max;
        self
    }

    /// Set the maximum number of range segments.
    pub fn column_range_max_segments(mut self, max: usize) -> Self {
        self.column_range_max_segments = max;
        self
    }

    /// Set the limited-sort threshold.
    pub fn insertion_sort_max_limit(mut self, limit: u64) -> Self {
        self.insertion_sort_max_limit = limit;
        self
    }

    /// Enable or disable index intersections.
    pub fn enable_intersections(mut self, enable: bool) -> Self {
        self.enable_intersections = enable;
        self
    }

    /// Set the maximum intersection depth.
    pub fn max_intersection_depth(mut self, depth: usize) -> Self {
        self.max_intersection_depth = depth;
        self
    }

    /// Enable or disable group loops.
    pub fn enable_group_loops(mut self, enable: bool) -> Self {
        self.enable_group_loops = enable;
        self
    }

    /// Enable or disable the disconnected-graph retry.
    pub fn disconnected_repair(mut self, enable: bool) -> Self {
        self.disconnected_repair = enable;
        self
    }
}
