//! Cost estimates and their composition rules.

use std::cmp::Ordering;

use joinplan_proto::CostSummary;

/// Cost estimate for a plan or sub-plan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostEstimate {
    /// Estimated number of rows returned.
    pub estimated_rows: u64,
    /// Estimated I/O cost (seeks and row fetches).
    pub io_cost: f64,
    /// Estimated CPU cost (comparisons, predicate evaluation).
    pub cpu_cost: f64,
    /// Total weighted cost (io_cost * IO_WEIGHT + cpu_cost * CPU_WEIGHT).
    pub total_cost: f64,
}

impl CostEstimate {
    /// Weight for I/O operations in total cost calculation.
    const IO_WEIGHT: f64 = 10.0;
    /// Weight for CPU operations in total cost calculation.
    const CPU_WEIGHT: f64 = 1.0;

    /// Create a new cost estimate.
    pub fn new(estimated_rows: u64, io_cost: f64, cpu_cost: f64) -> Self {
        let total_cost = (io_cost * Self::IO_WEIGHT) + (cpu_cost * Self::CPU_WEIGHT);
        Self {
            estimated_rows,
            io_cost,
            cpu_cost,
            total_cost,
        }
    }

    /// Create a zero-cost estimate.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Run `inner` once for every row of `self`.
    pub fn nest(&self, inner: &CostEstimate) -> CostEstimate {
        let loops = self.estimated_rows as f64;
        CostEstimate::new(
            self.estimated_rows.saturating_mul(inner.estimated_rows),
            self.io_cost + loops * inner.io_cost,
            self.cpu_cost + loops * inner.cpu_cost,
        )
    }

    /// Feed the output of `self` into `next`; the result has `next`'s rows.
    pub fn sequence(&self, next: &CostEstimate) -> CostEstimate {
        CostEstimate::new(
            next.estimated_rows,
            self.io_cost + next.io_cost,
            self.cpu_cost + next.cpu_cost,
        )
    }

    /// Concatenate two independent streams.
    pub fn union(&self, other: &CostEstimate) -> CostEstimate {
        CostEstimate::new(
            self.estimated_rows.saturating_add(other.estimated_rows),
            self.io_cost + other.io_cost,
            self.cpu_cost + other.cpu_cost,
        )
    }

    /// Scale rows and costs by `factor`, e.g. for a partially consumed scan.
    pub fn scale(&self, factor: f64) -> CostEstimate {
        CostEstimate::new(
            (self.estimated_rows as f64 * factor).round() as u64,
            self.io_cost * factor,
            self.cpu_cost * factor,
        )
    }

    /// Total order: total cost, then rows.
    pub fn compare(&self, other: &CostEstimate) -> Ordering {
        self.total_cost
            .total_cmp(&other.total_cost)
            .then(self.estimated_rows.cmp(&other.estimated_rows))
    }

    /// Strictly cheaper than `other`.
    pub fn is_cheaper_than(&self, other: &CostEstimate) -> bool {
        self.compare(other) == Ordering::Less
    }

    pub fn to_summary(&self) -> CostSummary {
        CostSummary {
            estimated_rows: self.estimated_rows,
            io_cost: self.io_cost,
            cpu_cost: self.cpu_cost,
            total_cost: self.total_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_estimate_new() {
        let cost = CostEstimate::new(100, 50.0, 200.0);
        assert_eq!(cost.estimated_rows, 100);
        // total = 50 * 10 + 200 * 1 = 700
        assert_eq!(cost.total_cost, 700.0);
    }

    #[test]
    fn test_nest() {
        let outer = CostEstimate::new(10, 2.0, 10.0);
        let inner = CostEstimate::new(3, 1.0, 3.0);
        let joined = outer.nest(&inner);
        assert_eq!(joined.estimated_rows, 30);
        // io = 2 + 10 * 1, cpu = 10 + 10 * 3
        assert_eq!(joined.io_cost, 12.0);
        assert_eq!(joined.cpu_cost, 40.0);
        assert_eq!(joined.total_cost, 160.0);
    }

    #[test]
    fn test_sequence_keeps_next_rows() {
        let scan = CostEstimate::new(1000, 101.0, 1000.0);
        let select = CostEstimate::new(100, 0.0, 500.0);
        let both = scan.sequence(&select);
        assert_eq!(both.estimated_rows, 100);
        assert_eq!(both.cpu_cost, 1500.0);
    }

    #[test]
    fn test_union_and_scale() {
        let a = CostEstimate::new(10, 1.0, 10.0);
        let b = CostEstimate::new(5, 1.0, 5.0);
        assert_eq!(a.union(&b), CostEstimate::new(15, 2.0, 15.0));
        assert_eq!(a.scale(0.5), CostEstimate::new(5, 0.5, 5.0));
    }

    #[test]
    fn test_compare_breaks_ties_on_rows() {
        let a = CostEstimate::new(10, 0.0, 20.0);
        let b = CostEstimate::new(20, 0.0, 20.0);
        assert!(a.is_cheaper_than(&b));
        assert!(!b.is_cheaper_than(&a));
        assert!(!a.is_cheaper_than(&a));
    }
}
