//! Runtime orchestrator — the context object every entry point goes through.
//!
//! Owns the store handle and analysis configuration, exposes the verbs
//! (ingest, rebuild, consolidate, merge, project), and serializes derived
//! table rebuilds behind a single-writer guard.

pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::*;
