//! The cost estimator interface.

use crate::catalog::{IndexDef, TableColumn};
use crate::error::Result;

use super::estimate::CostEstimate;

/// Shape of a predicate whose selectivity is looked up per column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectivityKind {
    /// `col = value`
    Equal,
    /// `col <> value`
    NotEqual,
    /// One bounded range.
    Range,
    /// `col IN (...)` with this many values.
    InList(usize),
    /// Anything without a per-column estimate.
    Other,
}

/// Index access as seen by the estimator.
#[derive(Debug, Clone, Copy)]
pub struct IndexScanShape<'a> {
    pub index: &'a IndexDef,
    /// Leading columns bound by equality.
    pub equalities: usize,
    /// Segments of the range on the column after the equalities; 0 when
    /// that column is unbounded.
    pub range_segments: usize,
}

/// Row counts and costs for the building blocks of an access plan.
///
/// Table names are catalog names. Every method may fail; the optimizer
/// propagates the error unchanged.
pub trait CostEstimator {
    /// Rows stored in `table`.
    fn table_row_count(&self, table: &str) -> Result<u64>;

    /// Fraction of rows passing one predicate on `column`.
    fn selectivity(&self, column: &TableColumn, kind: SelectivityKind) -> Result<f64>;

    /// Combined selectivity of several predicates, assumed independent.
    fn conditions_selectivity(&self, conditions: &[(TableColumn, SelectivityKind)]) -> Result<f64> {
        let mut selectivity = 1.0;
        for (column, kind) in conditions {
            selectivity *= self.selectivity(column, *kind)?;
        }
        Ok(selectivity)
    }

    /// Index entries matched by `shape`.
    fn estimate_index_scan_rows(&self, shape: &IndexScanShape<'_>) -> Result<u64>;

    /// Reading `rows` consecutive entries of `index`, including the seek.
    fn estimate_index_scan(&self, index: &IndexDef, rows: u64) -> Result<CostEstimate>;

    /// `scans` z-order range scans of a spatial index.
    fn estimate_spatial_scan(&self, index: &IndexDef, scans: usize) -> Result<CostEstimate>;

    /// Reading every row of the given tables of one hierarchy.
    fn estimate_group_scan(&self, tables: &[&str]) -> Result<CostEstimate>;

    /// Fetching the `required` tables for one row of `index_table`.
    fn estimate_flatten(&self, index_table: &str, required: &[&str]) -> Result<CostEstimate>;

    /// Assembling `tables` tables from `rows` group-scan rows.
    fn estimate_flatten_group(&self, rows: u64, tables: usize) -> Result<CostEstimate>;

    /// Reaching the `inner_table` rows of one `outer_table` row by
    /// hierarchical key, then fetching `required`.
    fn estimate_flatten_nested(
        &self,
        outer_table: &str,
        inner_table: &str,
        required: &[&str],
    ) -> Result<CostEstimate>;

    /// Fetching one row by hierarchical key.
    fn estimate_hkey_row(&self, tables: usize) -> Result<CostEstimate>;

    /// Evaluating `weight` predicates on `input_rows` rows.
    fn estimate_select(&self, input_rows: u64, weight: usize, selectivity: f64)
        -> Result<CostEstimate>;

    /// Fully sorting `rows` rows.
    fn estimate_sort(&self, rows: u64) -> Result<CostEstimate>;

    /// Keeping the first `limit` of `rows` rows ordered on `fields` fields.
    fn estimate_sort_with_limit(&self, rows: u64, limit: u64, fields: usize)
        -> Result<CostEstimate>;

    /// Merging two ordered streams.
    fn estimate_intersect(&self, left_rows: u64, right_rows: u64) -> Result<CostEstimate>;
}
