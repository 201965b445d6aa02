//! Query resolution: alias lookup and column equivalences.

mod context;
mod equivalence;

pub use context::{QueryContext, TableInfo};
pub use equivalence::EquivalenceFinder;
