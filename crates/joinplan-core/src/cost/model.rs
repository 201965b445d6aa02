//! Default cost model backed by [`TableStatistics`].

use crate::catalog::{Catalog, IndexDef, TableColumn};
use crate::error::{Error, Result};

use super::estimate::CostEstimate;
use super::estimator::{CostEstimator, IndexScanShape, SelectivityKind};
use super::statistics::TableStatistics;

/// Selectivity of `col = value` without a distinct count.
const DEFAULT_EQUALITY_SELECTIVITY: f64 = 0.1;
const RANGE_SELECTIVITY: f64 = 0.3;
/// Predicates the model cannot attribute to one column.
const MISSING_STATS_SELECTIVITY: f64 = 0.85;
/// Fraction of a spatial index read by one z-order range.
const SPATIAL_SCAN_FRACTION: f64 = 0.05;

/// One random access.
const SEEK_IO: f64 = 1.0;
/// Reading one row sequentially.
const ROW_IO: f64 = 0.1;
/// Producing one row.
const ROW_CPU: f64 = 1.0;
/// Evaluating one predicate or assembling one table per row.
const EXPR_CPU: f64 = 0.5;

/// Cost model for access-path decisions.
///
/// Row counts come from statistics; hierarchy fan-out comes from the
/// catalog's parent links. A table without statistics is an error.
pub struct StatisticsCostModel<'a> {
    statistics: &'a TableStatistics,
    catalog: &'a Catalog,
}

impl<'a> StatisticsCostModel<'a> {
    /// Create a new cost model with statistics and catalog references.
    pub fn new(statistics: &'a TableStatistics, catalog: &'a Catalog) -> Self {
        Self {
            statistics,
            catalog,
        }
    }

    fn equality_selectivity(&self, column: &TableColumn) -> f64 {
        match self.statistics.distinct_count(&column.table, &column.column) {
            Some(n) if n > 0 => 1.0 / n as f64,
            _ => DEFAULT_EQUALITY_SELECTIVITY,
        }
    }

    fn is_descendant(&self, table: &str, ancestor: &str) -> bool {
        table != ancestor
            && self
                .catalog
                .ancestry(table)
                .map(|chain| chain.iter().any(|t| t.name == ancestor))
                .unwrap_or(false)
    }

    /// Average rows of `descendant` per row of `ancestor`, at least 1.
    pub fn descendant_cardinality(&self, descendant: &str, ancestor: &str) -> Result<f64> {
        let child = self.table_row_count(descendant)? as f64;
        let parent = self.table_row_count(ancestor)? as f64;
        if parent <= 0.0 {
            return Ok(1.0);
        }
        Ok((child / parent).max(1.0))
    }
}

fn round_rows(rows: f64) -> u64 {
    rows.round().max(0.0) as u64
}

impl CostEstimator for StatisticsCostModel<'_> {
    fn table_row_count(&self, table: &str) -> Result<u64> {
        self.statistics
            .row_count(table)
            .ok_or_else(|| Error::CostEstimation(format!("no statistics for table {}", table)))
    }

    fn selectivity(&self, column: &TableColumn, kind: SelectivityKind) -> Result<f64> {
        let eq = self.equality_selectivity(column);
        Ok(match kind {
            SelectivityKind::Equal => eq,
            SelectivityKind::NotEqual => 1.0 - eq,
            SelectivityKind::Range => RANGE_SELECTIVITY,
            SelectivityKind::InList(n) => (n as f64 * eq).min(1.0),
            SelectivityKind::Other => MISSING_STATS_SELECTIVITY,
        })
    }

    fn estimate_index_scan_rows(&self, shape: &IndexScanShape<'_>) -> Result<u64> {
        let index = shape.index;
        let count = self.table_row_count(&index.table)?;
        if index.unique && shape.equalities >= index.columns.len() {
            return Ok(count.min(1));
        }
        if shape.equalities == 0 && shape.range_segments == 0 {
            return Ok(count);
        }
        let mut selectivity = 1.0;
        for i in 0..shape.equalities {
            selectivity *= match index.columns.get(i) {
                Some(column) => self.equality_selectivity(&column.table_column()),
                // Past the declared columns the entry continues with the
                // primary key.
                None => 1.0 / count.max(1) as f64,
            };
        }
        if shape.range_segments > 0 {
            selectivity *= (shape.range_segments as f64 * RANGE_SELECTIVITY).min(1.0);
        }
        Ok(round_rows(selectivity * count as f64).max(1).min(count.max(1)))
    }

    fn estimate_index_scan(&self, _index: &IndexDef, rows: u64) -> Result<CostEstimate> {
        Ok(CostEstimate::new(
            rows,
            SEEK_IO + rows as f64 * ROW_IO,
            rows as f64 * ROW_CPU,
        ))
    }

    fn estimate_spatial_scan(&self, index: &IndexDef, scans: usize) -> Result<CostEstimate> {
        let count = self.table_row_count(&index.table)?;
        let fraction = (scans as f64 * SPATIAL_SCAN_FRACTION).min(1.0);
        let rows = round_rows(count as f64 * fraction).max(1).min(count.max(1));
        Ok(CostEstimate::new(
            rows,
            scans as f64 * SEEK_IO + rows as f64 * ROW_IO,
            rows as f64 * ROW_CPU,
        ))
    }

    fn estimate_group_scan(&self, tables: &[&str]) -> Result<CostEstimate> {
        let mut rows = 0u64;
        for table in tables {
            rows = rows.saturating_add(self.table_row_count(table)?);
        }
        Ok(CostEstimate::new(
            rows,
            SEEK_IO + rows as f64 * ROW_IO,
            rows as f64 * ROW_CPU,
        ))
    }

    fn estimate_flatten(&self, index_table: &str, required: &[&str]) -> Result<CostEstimate> {
        let mut fanout = 1.0;
        let mut lookups = 0usize;
        for table in required {
            if *table == index_table {
                continue;
            }
            lookups += 1;
            if self.is_descendant(table, index_table) {
                fanout *= self.descendant_cardinality(table, index_table)?;
            }
        }
        Ok(CostEstimate::new(
            round_rows(fanout).max(1),
            lookups as f64 * SEEK_IO,
            required.len().max(1) as f64 * EXPR_CPU * fanout,
        ))
    }

    fn estimate_flatten_group(&self, rows: u64, tables: usize) -> Result<CostEstimate> {
        Ok(CostEstimate::new(
            rows,
            0.0,
            rows as f64 * tables as f64 * EXPR_CPU,
        ))
    }

    fn estimate_flatten_nested(
        &self,
        outer_table: &str,
        inner_table: &str,
        required: &[&str],
    ) -> Result<CostEstimate> {
        let rows = if self.is_descendant(inner_table, outer_table) {
            self.descendant_cardinality(inner_table, outer_table)?
        } else {
            1.0
        };
        Ok(CostEstimate::new(
            round_rows(rows).max(1),
            SEEK_IO + rows * ROW_IO,
            rows * (ROW_CPU + required.len() as f64 * EXPR_CPU),
        ))
    }

    fn estimate_hkey_row(&self, tables: usize) -> Result<CostEstimate> {
        Ok(CostEstimate::new(
            1,
            SEEK_IO,
            ROW_CPU + tables as f64 * EXPR_CPU,
        ))
    }

    fn estimate_select(
        &self,
        input_rows: u64,
        weight: usize,
        selectivity: f64,
    ) -> Result<CostEstimate> {
        let rows = if input_rows == 0 {
            0
        } else {
            round_rows(input_rows as f64 * selectivity).max(1)
        };
        Ok(CostEstimate::new(
            rows,
            0.0,
            input_rows as f64 * weight as f64 * EXPR_CPU,
        ))
    }

    fn estimate_sort(&self, rows: u64) -> Result<CostEstimate> {
        let n = rows as f64;
        Ok(CostEstimate::new(rows, 0.0, n * n.max(2.0).log2()))
    }

    fn estimate_sort_with_limit(
        &self,
        rows: u64,
        limit: u64,
        fields: usize,
    ) -> Result<CostEstimate> {
        let kept = limit.min(rows);
        let per_row = (kept as f64).max(2.0).log2() * (1.0 + fields as f64 * 0.1);
        Ok(CostEstimate::new(kept, 0.0, rows as f64 * per_row))
    }

    fn estimate_intersect(&self, left_rows: u64, right_rows: u64) -> Result<CostEstimate> {
        Ok(CostEstimate::new(
            left_rows.min(right_rows),
            0.0,
            (left_rows + right_rows) as f64 * EXPR_CPU,
        ))
    }
}
