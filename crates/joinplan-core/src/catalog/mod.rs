//! Catalog metadata used for access-path selection.
//!
//! Tables form hierarchies through [`ParentJoin`] links. Indexes are either
//! attached to one table, span a root-to-leaf path of a hierarchy, index
//! spatial coordinates, or are full-text indexes.

mod index;
mod schema;
mod table;

pub use index::{FullTextIndexDef, GroupIndexJoin, IndexColumn, IndexDef, IndexKind};
pub use schema::Catalog;
pub use table::{ParentJoin, TableColumn, TableDef};
