//! joinplan Benchmark Suite
//!
//! Criterion benchmarks for the optimizer over generated queries.
//!
//! # Benchmark Categories
//!
//! - **Enumerate**: DPhyp search alone over chain, star and clique graphs
//! - **Optimize**: graph build, search and access selection end to end
//! - **Access**: access path selection for one table with many indexes
//!
//! Set `JOINPLAN_LOG` (an `EnvFilter` directive such as `joinplan_core=debug`)
//! to see the optimizer's tracing output while benchmarking.

pub mod fixtures;

pub use fixtures::{generate, wide_table, Fixture, Shape};

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "JOINPLAN_LOG";

/// Install a formatting subscriber when `JOINPLAN_LOG` is set.
pub fn init_tracing() {
    if std::env::var_os(LOG_ENV).is_none() {
        return;
    }
    if tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env(LOG_ENV))
        .try_init()
        .is_ok()
    {
        tracing::info!(env = LOG_ENV, "Benchmark tracing enabled");
    }
}
