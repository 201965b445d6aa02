//! Costing of an access plan as a pipeline of stages.
//!
//! An access plan is built bottom-up: one source (an index scan, group scan,
//! ...) followed by optional flatten, select and sort stages. A row limit is
//! set on the end of the pipeline and pushed back toward the source, so a
//! scan that only has to produce a prefix of its rows is costed for that
//! prefix.

use crate::catalog::IndexDef;
use crate::error::{Error, Result};

use super::estimate::CostEstimate;
use super::estimator::{CostEstimator, IndexScanShape};

#[derive(Debug, Clone)]
enum Stage<'a> {
    IndexScan(IndexScanShape<'a>),
    SpatialScan {
        index: &'a IndexDef,
        scans: usize,
    },
    GroupScan {
        tables: Vec<String>,
        required: usize,
    },
    GroupLoop {
        outer: String,
        inner: String,
        required: Vec<String>,
    },
    HKeyRow {
        tables: usize,
    },
    FullText {
        limit: u64,
    },
    /// A source whose cost was computed elsewhere, e.g. an intersection.
    Fixed(CostEstimate),
    Flatten {
        table: String,
        required: Vec<String>,
    },
    Select {
        weight: usize,
        selectivity: f64,
    },
    Sort {
        fields: usize,
    },
}

impl Stage<'_> {
    fn is_source(&self) -> bool {
        !matches!(
            self,
            Stage::Flatten { .. } | Stage::Select { .. } | Stage::Sort { .. }
        )
    }

    fn name(&self) -> &'static str {
        match self {
            Stage::IndexScan(_) => "index scan",
            Stage::SpatialScan { .. } => "spatial scan",
            Stage::GroupScan { .. } => "group scan",
            Stage::GroupLoop { .. } => "group loop",
            Stage::HKeyRow { .. } => "hkey row",
            Stage::FullText { .. } => "full text scan",
            Stage::Fixed(_) => "fixed",
            Stage::Flatten { .. } => "flatten",
            Stage::Select { .. } => "select",
            Stage::Sort { .. } => "sort",
        }
    }
}

/// Accumulates the stages of one access plan and costs them.
pub struct PlanCostEstimator<'a> {
    estimator: &'a dyn CostEstimator,
    stages: Vec<Stage<'a>>,
    limit: Option<u64>,
    insertion_sort_max_limit: u64,
}

impl<'a> PlanCostEstimator<'a> {
    pub fn new(estimator: &'a dyn CostEstimator, insertion_sort_max_limit: u64) -> Self {
        Self {
            estimator,
            stages: Vec::new(),
            limit: None,
            insertion_sort_max_limit,
        }
    }

    /// Rows the consumer will read from the end of the pipeline.
    pub fn set_limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.limit = limit.filter(|l| *l > 0);
        self
    }

    pub fn index_scan(&mut self, shape: IndexScanShape<'a>) -> &mut Self {
        self.stages.push(Stage::IndexScan(shape));
        self
    }

    pub fn spatial_scan(&mut self, index: &'a IndexDef, scans: usize) -> &mut Self {
        self.stages.push(Stage::SpatialScan {
            index,
            scans: scans.max(1),
        });
        self
    }

    /// Scan of a whole hierarchy, flattened into `required` tables.
    pub fn group_scan(&mut self, tables: &[&str], required: usize) -> &mut Self {
        self.stages.push(Stage::GroupScan {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            required,
        });
        self
    }

    pub fn group_loop(&mut self, outer: &str, inner: &str, required: &[&str]) -> &mut Self {
        self.stages.push(Stage::GroupLoop {
            outer: outer.to_string(),
            inner: inner.to_string(),
            required: required.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn hkey_row(&mut self, tables: usize) -> &mut Self {
        self.stages.push(Stage::HKeyRow { tables });
        self
    }

    pub fn full_text(&mut self, limit: u64) -> &mut Self {
        self.stages.push(Stage::FullText { limit });
        self
    }

    pub fn fixed(&mut self, cost: CostEstimate) -> &mut Self {
        self.stages.push(Stage::Fixed(cost));
        self
    }

    /// Fetch `required` tables for every row of `table`.
    pub fn flatten(&mut self, table: &str, required: &[&str]) -> &mut Self {
        self.stages.push(Stage::Flatten {
            table: table.to_string(),
            required: required.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    /// Evaluate `weight` predicates passing `selectivity` of the rows.
    pub fn select(&mut self, weight: usize, selectivity: f64) -> &mut Self {
        if weight > 0 {
            self.stages.push(Stage::Select {
                weight,
                selectivity,
            });
        }
        self
    }

    pub fn sort(&mut self, fields: usize) -> &mut Self {
        self.stages.push(Stage::Sort { fields });
        self
    }

    /// Cost of the whole pipeline.
    pub fn estimate(&self) -> Result<CostEstimate> {
        let Some(first) = self.stages.first() else {
            return Err(Error::CostEstimation("empty access plan".to_string()));
        };
        if !first.is_source() {
            return Err(Error::CostEstimation(format!(
                "{} stage has no input",
                first.name()
            )));
        }

        if let Some(stage) = self.stages.iter().skip(1).find(|s| s.is_source()) {
            return Err(Error::CostEstimation(format!(
                "{} stage cannot follow another stage",
                stage.name()
            )));
        }

        let mut flatten_units = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            flatten_units.push(match stage {
                Stage::Flatten { table, required } => {
                    let required: Vec<&str> = required.iter().map(String::as_str).collect();
                    Some(self.estimator.estimate_flatten(table, &required)?)
                }
                _ => None,
            });
        }

        // Output limit of every stage, pushed back from the end.
        let count = self.stages.len();
        let mut limits = vec![None; count];
        limits[count - 1] = self.limit;
        for i in (1..count).rev() {
            limits[i - 1] = match (&self.stages[i], limits[i]) {
                (_, None) | (Stage::Sort { .. }, _) => None,
                (Stage::Select { selectivity, .. }, Some(limit)) => {
                    (*selectivity > 0.0)
                        .then(|| ((limit as f64 / selectivity).round() as u64).max(1))
                }
                (Stage::Flatten { .. }, Some(limit)) => {
                    let fanout = flatten_units[i].map_or(1, |u| u.estimated_rows.max(1));
                    Some(limit.div_ceil(fanout))
                }
                _ => None,
            };
        }

        let mut cost = CostEstimate::zero();
        for (i, stage) in self.stages.iter().enumerate() {
            let limit = limits[i];
            cost = match stage {
                Stage::IndexScan(shape) => self.index_scan_cost(shape, limit)?,
                Stage::SpatialScan { index, scans } => {
                    self.spatial_scan_cost(index, *scans, limit)?
                }
                Stage::GroupScan { tables, required } => {
                    let tables: Vec<&str> = tables.iter().map(String::as_str).collect();
                    let scan = self.estimator.estimate_group_scan(&tables)?;
                    let flatten = self
                        .estimator
                        .estimate_flatten_group(scan.estimated_rows, *required)?;
                    limit_proportionally(scan.sequence(&flatten), limit)
                }
                Stage::GroupLoop {
                    outer,
                    inner,
                    required,
                } => {
                    let required: Vec<&str> = required.iter().map(String::as_str).collect();
                    self.estimator.estimate_flatten_nested(outer, inner, &required)?
                }
                Stage::HKeyRow { tables } => self.estimator.estimate_hkey_row(*tables)?,
                Stage::FullText { limit } => CostEstimate::new((*limit).max(1), 0.0, 1.0),
                Stage::Fixed(fixed) => limit_proportionally(*fixed, limit),
                Stage::Flatten { .. } => {
                    let unit = flatten_units[i].unwrap_or_default();
                    cost.nest(&unit)
                }
                Stage::Select {
                    weight,
                    selectivity,
                } => {
                    let select =
                        self.estimator
                            .estimate_select(cost.estimated_rows, *weight, *selectivity)?;
                    cost.sequence(&select)
                }
                Stage::Sort { fields } => {
                    let sort = match self.limit {
                        Some(l) if i == count - 1 && l <= self.insertion_sort_max_limit => self
                            .estimator
                            .estimate_sort_with_limit(cost.estimated_rows, l, *fields)?,
                        _ => self.estimator.estimate_sort(cost.estimated_rows)?,
                    };
                    cost.sequence(&sort)
                }
            };
        }

        Ok(match self.limit {
            Some(limit) if limit < cost.estimated_rows => {
                CostEstimate::new(limit, cost.io_cost, cost.cpu_cost)
            }
            _ => cost,
        })
    }

    fn index_scan_cost(
        &self,
        shape: &IndexScanShape<'_>,
        limit: Option<u64>,
    ) -> Result<CostEstimate> {
        let rows = self.estimator.estimate_index_scan_rows(shape)?;
        if shape.range_segments <= 1 {
            let rows = limit.map_or(rows, |l| l.min(rows));
            return self.estimator.estimate_index_scan(shape.index, rows);
        }
        // Each segment of a disjunctive range is a separate seek.
        let setup = self.estimator.estimate_index_scan(shape.index, 0)?;
        let full = self.estimator.estimate_index_scan(shape.index, rows)?;
        let extra = setup.scale((shape.range_segments - 1) as f64);
        let scan = CostEstimate::new(
            rows,
            full.io_cost - setup.io_cost,
            full.cpu_cost - setup.cpu_cost,
        );
        let all_setup = setup.union(&extra);
        Ok(all_setup.union(&limit_proportionally(scan, limit)))
    }

    fn spatial_scan_cost(
        &self,
        index: &IndexDef,
        scans: usize,
        limit: Option<u64>,
    ) -> Result<CostEstimate> {
        let full = self.estimator.estimate_spatial_scan(index, scans)?;
        match limit {
            Some(l) if l < full.estimated_rows => {
                let setup = self.estimator.estimate_index_scan(index, 0)?.scale(scans as f64);
                let scan = CostEstimate::new(
                    full.estimated_rows,
                    (full.io_cost - setup.io_cost).max(0.0),
                    (full.cpu_cost - setup.cpu_cost).max(0.0),
                );
                Ok(setup.union(&limit_proportionally(scan, limit)))
            }
            _ => Ok(full),
        }
    }
}

/// Charge a stream read only up to `limit` rows for that fraction.
fn limit_proportionally(cost: CostEstimate, limit: Option<u64>) -> CostEstimate {
    match limit {
        Some(l) if l < cost.estimated_rows => cost.scale(l as f64 / cost.estimated_rows as f64),
        _ => cost,
    }
}
