//! Document ingestion pipeline: file → text → store → entity mentions.

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::extract::{extract_mentions, ExtractOptions};
use crate::file;
use casefile_core::{Error, Result};
use casefile_store::{AddDocumentOptions, NewMention, SqliteStore};

/// Result of ingesting (or re-extracting) one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub doc_id: i64,
    pub filename: String,
    pub mentions: usize,
    pub entities: usize,
}

/// Handles document ingestion: text extraction, storage, and mention indexing.
pub struct Ingester<'a> {
    store: &'a SqliteStore,
    options: ExtractOptions,
}

impl<'a> Ingester<'a> {
    pub fn new(store: &'a SqliteStore, options: ExtractOptions) -> Self {
        Self { store, options }
    }

    /// Ingest a file. Returns `None` when the file has no readable text.
    pub fn ingest_file(&self, path: &Path) -> Result<Option<IngestOutcome>> {
        let text = match file::extract_text(path)? {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                debug!("No text extracted from {}", path.display());
                return Ok(None);
            }
        };

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        self.ingest_text(filename, &text).map(Some)
    }

    /// Store raw text as a document and index its entity mentions.
    pub fn ingest_text(&self, filename: &str, text: &str) -> Result<IngestOutcome> {
        let hash = content_hash(text);
        if self.store.find_document_by_hash(&hash)?.is_some() {
            debug!("Duplicate content, skipping: {}", filename);
            return Err(Error::DuplicateContent(hash));
        }

        let doc_id = self.store.add_document(
            filename,
            text,
            AddDocumentOptions {
                content_hash: Some(hash),
                ..Default::default()
            },
        )?;

        let outcome = self.index_mentions(doc_id, filename, text)?;
        info!(
            "Ingested document {} ({}): {} mentions of {} entities",
            doc_id, filename, outcome.mentions, outcome.entities
        );
        Ok(outcome)
    }

    /// Replace a document's content (e.g. text recovered after the fact)
    /// and re-extract its mentions.
    pub fn replace_content(&self, doc_id: i64, text: &str) -> Result<IngestOutcome> {
        let doc = self
            .store
            .get_document(doc_id)?
            .ok_or_else(|| Error::NotFound(format!("document {}", doc_id)))?;

        let hash = content_hash(text);
        if let Some(existing) = self.store.find_document_by_hash(&hash)? {
            if existing.id != doc_id {
                return Err(Error::DuplicateContent(hash));
            }
        }

        let (mentions, entities) = self.extract(text);
        let swap = self
            .store
            .replace_content_and_mentions(doc_id, text, Some(&hash), &mentions)?;
        info!(
            "Replaced content of document {}: {} old mentions removed, {} new",
            doc_id, swap.removed, swap.recorded
        );
        Ok(IngestOutcome {
            doc_id,
            filename: doc.filename,
            mentions: swap.recorded,
            entities,
        })
    }

    /// Re-run extraction over a document's stored content.
    pub fn reextract(&self, doc_id: i64) -> Result<IngestOutcome> {
        let doc = self
            .store
            .get_document(doc_id)?
            .ok_or_else(|| Error::NotFound(format!("document {}", doc_id)))?;
        let (mentions, entities) = self.extract(&doc.content);
        let swap = self.store.replace_document_mentions(doc_id, &mentions)?;
        Ok(IngestOutcome {
            doc_id,
            filename: doc.filename,
            mentions: swap.recorded,
            entities,
        })
    }

    fn index_mentions(&self, doc_id: i64, filename: &str, text: &str) -> Result<IngestOutcome> {
        let (mentions, entities) = self.extract(text);
        let recorded = self.store.record_mentions(doc_id, &mentions)?;
        Ok(IngestOutcome {
            doc_id,
            filename: filename.to_string(),
            mentions: recorded,
            entities,
        })
    }

    /// Mentions to record plus the number of distinct entities among them.
    fn extract(&self, text: &str) -> (Vec<NewMention>, usize) {
        let extracted = extract_mentions(text, self.options);
        let entities = extracted
            .iter()
            .map(|m| (m.name.as_str(), m.entity_type.as_str()))
            .collect::<std::collections::HashSet<_>>()
            .len();
        (extracted.into_iter().map(NewMention::from).collect(), entities)
    }
}

/// Compute SHA-256 content hash.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_store::EntityType;
    use tempfile::TempDir;

    fn setup() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_ingest_text_indexes_mentions() {
        let (store, _dir) = setup();
        let ingester = Ingester::new(&store, ExtractOptions::default());

        let outcome = ingester
            .ingest_text("memo.txt", "Call between Alice Smith and Bob Jones about Acme Holdings.")
            .unwrap();
        assert_eq!(outcome.mentions, 3);
        assert_eq!(outcome.entities, 3);

        let people = store.list_entities(Some(&EntityType::Person), 10).unwrap();
        assert_eq!(people.len(), 2);
        let mentions = store.mentions_for_document(outcome.doc_id).unwrap();
        assert!(mentions.iter().all(|m| m.context.contains("Call between")));
    }

    #[test]
    fn test_duplicate_content_rejected() {
        let (store, _dir) = setup();
        let ingester = Ingester::new(&store, ExtractOptions::default());
        ingester.ingest_text("a.txt", "same text").unwrap();
        let err = ingester.ingest_text("b.txt", "same text").unwrap_err();
        assert!(matches!(err, Error::DuplicateContent(_)));
    }

    #[test]
    fn test_replace_content_reextracts() {
        let (store, _dir) = setup();
        let ingester = Ingester::new(&store, ExtractOptions::default());
        let first = ingester.ingest_text("scan.pdf", "x Alice Smith").unwrap();

        let second = ingester
            .replace_content(first.doc_id, "Recovered: x Carol White met Carol White")
            .unwrap();
        assert_eq!(second.doc_id, first.doc_id);
        assert_eq!(second.mentions, 2);

        let names: Vec<String> = store.all_entities().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Carol White"]);
        assert_eq!(store.all_entities().unwrap()[0].mention_count, 2);
        assert!(matches!(
            ingester.replace_content(999, "text"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_replace_content_keeps_state_on_duplicate() {
        let (store, _dir) = setup();
        let ingester = Ingester::new(&store, ExtractOptions::default());
        ingester.ingest_text("a.txt", "x Alice Smith").unwrap();
        let b = ingester.ingest_text("b.txt", "y Bob Jones").unwrap();

        let err = ingester.replace_content(b.doc_id, "x Alice Smith").unwrap_err();
        assert!(matches!(err, Error::DuplicateContent(_)));
        assert_eq!(store.get_document(b.doc_id).unwrap().unwrap().content, "y Bob Jones");
        let mentions = store.mentions_for_document(b.doc_id).unwrap();
        assert_eq!(mentions.len(), 1);
    }

    #[test]
    fn test_reextract_is_stable() {
        let (store, _dir) = setup();
        let ingester = Ingester::new(&store, ExtractOptions::default());
        let first = ingester.ingest_text("memo.txt", "x Alice Smith met Bob Jones").unwrap();

        let again = ingester.reextract(first.doc_id).unwrap();
        assert_eq!((again.mentions, again.entities), (first.mentions, first.entities));
        assert!(store.all_entities().unwrap().iter().all(|e| e.mention_count == 1));
        assert!(matches!(ingester.reextract(42), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_ingest_file() {
        let (store, dir) = setup();
        let ingester = Ingester::new(&store, ExtractOptions::default());

        let path = dir.path().join("log.txt");
        std::fs::write(&path, "Flight from Teterboro with Bob Jones").unwrap();
        let outcome = ingester.ingest_file(&path).unwrap().unwrap();
        assert_eq!(outcome.filename, "log.txt");
        assert_eq!(outcome.mentions, 2);

        let empty = dir.path().join("blank.txt");
        std::fs::write(&empty, "   ").unwrap();
        assert!(ingester.ingest_file(&empty).unwrap().is_none());
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
