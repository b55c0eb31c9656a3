//! Consolidation pipeline — orphan pruning, entity dedup, counter repair.
//!
//! Keeps the entity store tidy after bulk ingestion: surface variants of
//! the same name ("Mr. Jeffrey Smith", "JEFFREY SMITH") are folded into one
//! canonical entity so the co-occurrence table counts them together.

pub mod pipeline;
pub mod types;

pub use pipeline::{canonical_key, ConsolidationPipeline};
pub use types::*;
