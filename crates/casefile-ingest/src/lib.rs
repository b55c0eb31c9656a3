//! Casefile Ingest — file text extraction, heuristic entity extraction, document ingestion.

pub mod extract;
pub mod file;
pub mod ingest;

pub use extract::{extract_mentions, ExtractOptions, ExtractedMention};
pub use ingest::{content_hash, IngestOutcome, Ingester};
