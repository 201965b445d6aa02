//! Hypergraph dynamic programming (DPhyp).
//!
//! Moerkotte and Neumann, "Dynamic Programming Strikes Back", SIGMOD 2008.
//! Connected subgraphs are grown from each table in descending order; each
//! one is paired with every connected complement reachable through the
//! hyperedges, and only pairs joined by at least one edge are evaluated.

use joinplan_proto::JoinType;
use tracing::{debug, instrument, trace, warn};

use super::{JoinCandidate, JoinEvaluator};
use crate::bitset::TableBitSet;
use crate::config::OptimizerConfig;
use crate::error::{Error, Result};
use crate::graph::{commute_join_type, JoinGraph, OperatorId};
use crate::plan::PlanCache;

/// Drives the DPhyp search over one join graph.
pub struct JoinEnumerator<'a, E: JoinEvaluator> {
    graph: &'a mut JoinGraph,
    evaluator: &'a mut E,
    config: &'a OptimizerConfig,
    cache: PlanCache<E::Plan>,
    passes: usize,
}

impl<'a, E: JoinEvaluator> JoinEnumerator<'a, E> {
    pub fn new(
        graph: &'a mut JoinGraph,
        evaluator: &'a mut E,
        config: &'a OptimizerConfig,
    ) -> Result<Self> {
        let cache = PlanCache::new(graph.table_count())?;
        Ok(Self {
            graph,
            evaluator,
            config,
            cache,
            passes: 0,
        })
    }

    /// The graph, including any connector edges added by [`solve`](Self::solve).
    pub fn graph(&self) -> &JoinGraph {
        self.graph
    }

    /// Plans found by the last search, per table subset.
    pub fn cache(&self) -> &PlanCache<E::Plan> {
        &self.cache
    }

    pub fn into_cache(self) -> PlanCache<E::Plan> {
        self.cache
    }

    /// Passes the last search needed: 2 when the graph had to be connected.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Run the search and return the plan joining every table.
    #[instrument(skip(self), fields(tables = self.graph.table_count(), edges = self.graph.edge_count()))]
    pub fn solve(&mut self) -> Result<&E::Plan> {
        let count = self.graph.table_count();
        let all = self.graph.all_tables();
        let max_passes = if self.config.disconnected_repair { 2 } else { 1 };
        self.cache.clear();

        let mut solved = false;
        for pass in 1..=max_passes {
            self.passes = pass;
            for i in 0..count {
                let set = TableBitSet::single(i);
                let plan = self.evaluator.evaluate_table(self.graph, set, i)?;
                self.cache.set(set, plan);
            }
            for i in (0..count).rev() {
                let set = TableBitSet::single(i);
                self.emit_csg(set)?;
                self.enumerate_csg_rec(set, TableBitSet::first_n(i + 1))?;
            }
            if self.cache.contains(all) {
                solved = true;
                break;
            }
            if pass == max_passes {
                break;
            }
            let partial: Vec<String> = self.cache.filled().map(|s| s.to_string()).collect();
            trace!(plans = ?partial, "plan not complete");
            warn!(
                tables = count,
                "join graph is disconnected, connecting components with cross products"
            );
            self.add_extra_edges()?;
            self.cache.clear();
        }

        if !solved {
            return Err(self.creation_failed());
        }
        debug!(passes = self.passes, "join enumeration complete");
        self.cache
            .get(all)
            .ok_or_else(|| Error::GraphCreationFailed { tables: Vec::new() })
    }

    fn creation_failed(&self) -> Error {
        Error::GraphCreationFailed {
            tables: (0..self.graph.table_count())
                .map(|i| self.graph.table_label(i).to_string())
                .collect(),
        }
    }

    /// Minimal neighbors of `set` outside `exclude`: the lowest table of the
    /// far side of every edge whose near side lies within `set`.
    pub(crate) fn neighborhood(&self, set: TableBitSet, exclude: TableBitSet) -> TableBitSet {
        neighborhood(self.graph.edges(), set, exclude)
    }

    fn enumerate_csg_rec(&mut self, s1: TableBitSet, exclude: TableBitSet) -> Result<()> {
        let neighbors = self.neighborhood(s1, exclude);
        if neighbors.is_empty() {
            return Ok(());
        }
        for subset in neighbors.subsets() {
            let next = s1 | subset;
            if self.cache.contains(next) {
                self.emit_csg(next)?;
            }
        }
        let exclude = exclude | neighbors;
        for subset in neighbors.subsets() {
            self.enumerate_csg_rec(s1 | subset, exclude)?;
        }
        Ok(())
    }

    fn emit_csg(&mut self, s1: TableBitSet) -> Result<()> {
        let exclude = s1 | s1.up_to_min();
        let neighbors = self.neighborhood(s1, exclude);
        if neighbors.is_empty() {
            return Ok(());
        }
        for i in (0..self.graph.table_count()).rev() {
            let s2 = TableBitSet::single(i);
            if neighbors.overlaps(s2) {
                if self.is_connected(s1, s2) {
                    self.emit_csg_cmp(s1, s2)?;
                }
                self.enumerate_cmp_rec(s1, s2, exclude)?;
            }
        }
        Ok(())
    }

    fn enumerate_cmp_rec(
        &mut self,
        s1: TableBitSet,
        s2: TableBitSet,
        exclude: TableBitSet,
    ) -> Result<()> {
        let neighbors = self.neighborhood(s2, exclude);
        if neighbors.is_empty() {
            return Ok(());
        }
        for subset in neighbors.subsets() {
            let next = s2 | subset;
            if self.cache.contains(next) && self.is_connected(s1, next) {
                self.emit_csg_cmp(s1, next)?;
            }
        }
        let exclude = exclude | neighbors;
        for subset in neighbors.subsets() {
            self.enumerate_cmp_rec(s1, s2 | subset, exclude)?;
        }
        Ok(())
    }

    fn is_connected(&self, s1: TableBitSet, s2: TableBitSet) -> bool {
        let edges = self.graph.edges();
        (0..edges.len()).any(|e| is_evaluate_edge(edges, s1, s2, e))
    }

    fn emit_csg_cmp(&mut self, s1: TableBitSet, s2: TableBitSet) -> Result<()> {
        let joined = s1 | s2;
        let edges = self.graph.edges();
        let operators = self.graph.operators();

        let mut join12 = Some(JoinType::Inner);
        let mut join21 = Some(JoinType::Inner);
        let mut evaluate: Vec<OperatorId> = Vec::new();
        let mut connected = false;
        for e in 0..edges.len() {
            let is_evaluate = is_evaluate_edge(edges, s1, s2, e);
            connected |= is_evaluate;
            if !is_evaluate && !is_one_sided_edge(edges, s1, s2, e) {
                continue;
            }
            let id = self.graph.operator_of_edge(e);
            let join_type = operators[id.index()].join_type;
            if join_type != JoinType::Inner {
                join12 = Some(join_type);
                join21 = commute_join_type(join_type);
                if e & 1 != 0 {
                    std::mem::swap(&mut join12, &mut join21);
                }
            }
            if !evaluate.contains(&id) {
                evaluate.push(id);
            }
        }
        if !connected {
            return Ok(());
        }
        let outside: Vec<OperatorId> = operators
            .iter()
            .enumerate()
            .filter(|(i, op)| {
                let (near, far) = (edges[2 * i], edges[2 * i + 1]);
                let below = (near | far).is_subset_of(s1) || (near | far).is_subset_of(s2);
                op.predicate_tables.overlaps(joined)
                    && !below
                    && !evaluate.iter().any(|id| id.index() == *i)
            })
            .map(|(i, _)| OperatorId(i))
            .collect();

        let mut plan = self.cache.take(joined);
        for (left, right, join_type) in [(s1, s2, join12), (s2, s1, join21)] {
            let Some(join_type) = join_type else {
                continue;
            };
            let Some((left_plan, right_plan)) = self.cache.pair(left, right) else {
                continue;
            };
            let candidate = JoinCandidate {
                left,
                left_plan,
                right,
                right_plan,
                joined,
                join_type,
                operators: &evaluate,
                outside: &outside,
            };
            plan = Some(self.evaluator.evaluate_join(self.graph, candidate, plan)?);
        }
        if let Some(plan) = plan {
            trace!(tables = %joined, left = %s1, right = %s2, "installing plan");
            self.cache.set(joined, plan);
        }
        Ok(())
    }

    /// Connect the maximal solved subsets with predicate-free edges.
    fn add_extra_edges(&mut self) -> Result<()> {
        let mut filled: Vec<TableBitSet> = self.cache.filled().collect();
        filled.reverse();
        // A superset always has a larger raw value than its subsets.
        let mut maximal: Vec<TableBitSet> = Vec::new();
        for set in filled {
            if !maximal.iter().any(|m| set.is_subset_of(*m)) {
                maximal.push(set);
            }
        }
        if maximal.len() < 2 {
            return Err(self.creation_failed());
        }
        maximal.sort();

        let mut left = maximal[0];
        for right in maximal.into_iter().skip(1) {
            self.graph.add_connector(left, right);
            left |= right;
        }
        Ok(())
    }
}

pub(crate) fn neighborhood(
    edges: &[TableBitSet],
    set: TableBitSet,
    exclude: TableBitSet,
) -> TableBitSet {
    let exclude = exclude | set;
    let mut result = TableBitSet::EMPTY;
    for e in 0..edges.len() {
        let (near, far) = (edges[e], edges[e ^ 1]);
        if !near.is_empty() && !far.is_empty() && near.is_subset_of(set) && !far.overlaps(exclude)
        {
            result |= far.min_subset();
        }
    }
    result
}

/// Edge `e` joins `s1` on its near side to `s2` on its far side.
fn is_evaluate_edge(edges: &[TableBitSet], s1: TableBitSet, s2: TableBitSet, e: usize) -> bool {
    let (near, far) = (edges[e], edges[e ^ 1]);
    !near.is_empty() && !far.is_empty() && near.is_subset_of(s1) && far.is_subset_of(s2)
}

/// Edge `e` has one empty side and the other is exactly `s1` or `s2`.
fn is_one_sided_edge(edges: &[TableBitSet], s1: TableBitSet, s2: TableBitSet, e: usize) -> bool {
    let (near, far) = (edges[e], edges[e ^ 1]);
    match (near.is_empty(), far.is_empty()) {
        (true, true) => true,
        (true, false) => far == s2,
        (false, true) => near == s1,
        (false, false) => false,
    }
}
