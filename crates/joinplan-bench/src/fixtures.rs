//! Query generation for benchmarks.
//!
//! Every generator is seeded, so a benchmark sees the same catalog,
//! statistics and query on every run.

use joinplan_core::{Catalog, IndexDef, TableDef, TableStatistics};
use joinplan_proto::{Comparison, ConditionId, Expr, JoinTree, JoinType, Query};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Join graph topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// `t0 - t1 - ... - tn`
    Chain,
    /// Every table joined to `t0`.
    Star,
    /// Every pair of tables joined.
    Clique,
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Chain => "chain",
            Shape::Star => "star",
            Shape::Clique => "clique",
        }
    }
}

/// Catalog, statistics and query for one benchmark case.
pub struct Fixture {
    pub catalog: Catalog,
    pub statistics: TableStatistics,
    pub query: Query,
}

fn alias(i: usize) -> String {
    format!("t{}", i)
}

/// Generate `tables` joined in `shape`.
///
/// Tables get 10 to 100,000 rows; roughly two thirds carry an index on the
/// join key. `t0` also has a range filter.
pub fn generate(shape: Shape, tables: usize, seed: u64) -> Fixture {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut catalog = Catalog::new();
    let statistics = TableStatistics::new();

    for i in 0..tables {
        let name = alias(i);
        let mut table = TableDef::new(name.as_str(), &["id"]).with_columns(&["k", "x", "y"]);
        if rng.gen_bool(0.66) {
            table = table.with_index(IndexDef::table(format!("{}_k", name), name.as_str(), &["k"]));
        }
        if rng.gen_bool(0.33) {
            table = table.with_index(IndexDef::table(
                format!("{}_xy", name),
                name.as_str(),
                &["x", "y"],
            ));
        }
        catalog.add_table(table);

        let rows: u64 = rng.gen_range(10..=100_000);
        statistics.set_count(&name, rows);
        statistics.set_distinct(&name, "k", (rows / rng.gen_range(1..=10)).max(1));
    }

    let mut query = Query::new(JoinTree::table(alias(0), alias(0)));
    let mut tree = JoinTree::table(alias(0), alias(0));
    for i in 1..tables {
        let conditions: Vec<ConditionId> = match shape {
            Shape::Chain => vec![join_on(&mut query, i - 1, "k", i)],
            Shape::Star => vec![join_on(&mut query, 0, "x", i)],
            Shape::Clique => (0..i).map(|j| join_on(&mut query, j, "k", i)).collect(),
        };
        tree = JoinTree::join(
            JoinType::Inner,
            tree,
            JoinTree::table(alias(i), alias(i)),
            conditions,
        );
    }
    query.tree = tree;

    let filter = query.add_condition(Expr::compare(
        Comparison::Gt,
        Expr::column(alias(0), "y"),
        Expr::literal(rng.gen_range(0..1_000i64)),
    ));
    query.where_conditions.push(filter);

    Fixture {
        catalog,
        statistics,
        query,
    }
}

fn join_on(query: &mut Query, left: usize, column: &str, right: usize) -> ConditionId {
    query.add_condition(Expr::eq(
        Expr::column(alias(left), column),
        Expr::column(alias(right), "k"),
    ))
}

/// One table with `indexes` single-column indexes and an equality on each
/// indexed column, for access path selection alone.
pub fn wide_table(indexes: usize, seed: u64) -> Fixture {
    let mut rng = StdRng::seed_from_u64(seed);
    let columns: Vec<String> = (0..indexes).map(|i| format!("c{}", i)).collect();
    let mut table = TableDef::new("w", &["id"]);
    for column in &columns {
        table = table
            .with_column(column.as_str())
            .with_index(IndexDef::table(format!("w_{}", column), "w", &[column.as_str()]));
    }
    let catalog = Catalog::new().with_table(table);

    let statistics = TableStatistics::new().with_count("w", 1_000_000);
    let mut query = Query::new(JoinTree::table("w", "w"));
    for column in &columns {
        statistics.set_distinct("w", column, rng.gen_range(2..=10_000));
        let id = query.add_condition(Expr::eq(
            Expr::column("w", column.as_str()),
            Expr::literal(rng.gen_range(0..100i64)),
        ));
        query.where_conditions.push(id);
    }

    Fixture {
        catalog,
        statistics,
        query,
    }
}
