//! Casefile Store — SQLite documents, entity/mention index, derived analysis
//! tables, and the petgraph-backed network graph.

mod derived;
mod entities;
pub mod graph;
mod records;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use graph::{GraphStats, NetworkGraph};
pub use sqlite::SqliteStore;
pub use types::*;
