//! SQLite-backed store: documents, FTS5 search, and stats.
//!
//! Entity/mention, source-record, and derived-table operations live in
//! sibling modules as further `impl SqliteStore` blocks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use crate::entities::clear_mentions_in;
use crate::schema::{
    DERIVED_SCHEMA_SQL, FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL, RECORDS_SCHEMA_SQL, SCHEMA_SQL,
};
use crate::types::*;
use casefile_core::{Error, Result};

pub const DB_FILENAME: &str = "casefile.db";

/// SQLite store. All access goes through a single serialized connection.
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
    db_path: PathBuf,
}

pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

/// A UNIQUE violation on a content write means another document already
/// holds the hash.
pub(crate) fn content_err(e: rusqlite::Error, content_hash: Option<&str>) -> Error {
    if e.to_string().contains("UNIQUE constraint") {
        Error::DuplicateContent(content_hash.unwrap_or_default().to_string())
    } else {
        db_err(e)
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SqliteStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be `db_dir/casefile.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join(DB_FILENAME);

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        info!(
            "SqliteStore initialized: {} documents, {} entities, path={}",
            store.count_documents()?,
            store.count_table("entities")?,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -65536;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!(
            "{}\n{}\n{}\n{}\n{}",
            SCHEMA_SQL, RECORDS_SCHEMA_SQL, DERIVED_SCHEMA_SQL, FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL
        );
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Document CRUD
    // ---------------------------------------------------------------

    /// Insert a document. Returns the new document ID.
    pub fn add_document(&self, filename: &str, content: &str, opts: AddDocumentOptions) -> Result<i64> {
        let now = opts.uploaded_at.unwrap_or_else(now_millis);

        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO documents (filename, content, content_hash, uploaded_at) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(db_err)?
            .insert(params![filename, content, opts.content_hash, now])
            .map_err(|e| content_err(e, opts.content_hash.as_deref()))?;
        Ok(id)
    }

    /// Find a document by content hash.
    pub fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM documents WHERE content_hash = ?1")
            .map_err(db_err)?
            .query_row(params![content_hash], Self::row_to_document)
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    /// Get a document by ID.
    pub fn get_document(&self, doc_id: i64) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM documents WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![doc_id], Self::row_to_document)
            .optional()
            .map_err(db_err)?;
        Ok(row)
    }

    /// Delete a document, its mentions, and any entity left with no mentions.
    pub fn delete_document(&self, doc_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        clear_mentions_in(&tx, doc_id).map_err(db_err)?;
        let count = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![doc_id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(count > 0)
    }

    /// Count total documents.
    pub fn count_documents(&self) -> Result<i64> {
        self.count_table("documents")
    }

    /// List documents, newest first. Returns (page, total_count).
    pub fn get_documents_paginated(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<DocumentSummary>, i64)> {
        let total = self.count_documents()?;
        let offset = page.saturating_sub(1) * page_size;

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT d.id, d.filename, length(d.content), d.uploaded_at, \
                        (SELECT COUNT(*) FROM mentions m WHERE m.doc_id = d.id) \
                 FROM documents d ORDER BY d.uploaded_at DESC, d.id DESC LIMIT ?1 OFFSET ?2",
            )
            .map_err(db_err)?;
        let docs = stmt
            .query_map(params![page_size as i64, offset as i64], |row| {
                Ok(DocumentSummary {
                    id: row.get(0)?,
                    filename: row.get(1)?,
                    content_length: row.get(2)?,
                    uploaded_at: row.get(3)?,
                    mention_count: row.get(4)?,
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok((docs, total))
    }

    /// IDs of every document, ascending.
    pub fn all_document_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id FROM documents ORDER BY id")
            .map_err(db_err)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(db_err)?;
        Ok(ids)
    }

    // ---------------------------------------------------------------
    // Full-text search (FTS5)
    // ---------------------------------------------------------------

    /// BM25-ranked search over filename + content.
    pub fn search_documents(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT d.id, d.filename, \
                        snippet(documents_fts, 1, '[', ']', '…', 16) AS snip, \
                        documents_fts.rank AS bm25_score \
                 FROM documents_fts \
                 JOIN documents d ON d.id = documents_fts.rowid \
                 WHERE documents_fts MATCH ?1 \
                 ORDER BY documents_fts.rank \
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let hits = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                let bm25_score: f64 = row.get("bm25_score")?;
                Ok(SearchHit {
                    doc_id: row.get(0)?,
                    filename: row.get(1)?,
                    snippet: row.get(2)?,
                    score: -bm25_score, // FTS5 rank is negative; negate for positive
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(hits)
    }

    /// Sanitize a user query for FTS5 MATCH syntax.
    /// Wraps each token in double quotes and joins with OR.
    fn sanitize_fts_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(|t| t.replace('"', ""))
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    pub(crate) fn count_table(&self, table: &str) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count)
    }

    /// Get store statistics.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let entities_by_type = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached("SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type")
                .map_err(db_err)?;
            let by_type = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(db_err)?
                .collect::<rusqlite::Result<BTreeMap<_, _>>>()
                .map_err(db_err)?;
            by_type
        };

        let db_size = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        Ok(StoreStats {
            documents: self.count_documents()?,
            entities: self.count_table("entities")?,
            entities_by_type,
            mentions: self.count_table("mentions")?,
            cooccurrences: self.count_table("co_occurrences")?,
            flights: self.count_table("flights")?,
            emails: self.count_table("emails")?,
            transactions: self.count_table("transactions")?,
            timeline_events: self.count_table("timeline_events")?,
            clusters: self.count_table("event_clusters")?,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
        })
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
        Ok(Document {
            id: row.get("id")?,
            filename: row.get("filename")?,
            content: row.get("content")?,
            content_hash: row.get("content_hash")?,
            uploaded_at: row.get("uploaded_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_add_and_get_document() {
        let (store, _dir) = test_store();

        let doc_id = store
            .add_document(
                "memo.txt",
                "Hello world, this is a test document.",
                AddDocumentOptions {
                    content_hash: Some("hash123".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let doc = store.get_document(doc_id).unwrap().unwrap();
        assert_eq!(doc.filename, "memo.txt");
        assert_eq!(doc.content, "Hello world, this is a test document.");
        assert_eq!(doc.content_hash.as_deref(), Some("hash123"));
        assert!(store.find_document_by_hash("hash123").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_content_hash() {
        let (store, _dir) = test_store();
        let opts = || AddDocumentOptions {
            content_hash: Some("dup_hash".into()),
            ..Default::default()
        };

        store.add_document("a.txt", "First doc", opts()).unwrap();
        let result = store.add_document("b.txt", "Second doc", opts());
        assert!(matches!(result, Err(Error::DuplicateContent(_))));
    }

    #[test]
    fn test_search_documents() {
        let (store, _dir) = test_store();
        store
            .add_document("flight-log.txt", "Passenger manifest for the Teterboro departure", Default::default())
            .unwrap();
        store
            .add_document("ledger.txt", "Wire transfer recorded in the quarterly ledger", Default::default())
            .unwrap();

        let hits = store.search_documents("manifest", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "flight-log.txt");
        assert!(hits[0].snippet.contains("[manifest]"));
        assert!(hits[0].score > 0.0);

        assert!(store.search_documents("  \"\" ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_replace_content_reindexes_fts() {
        let (store, _dir) = test_store();
        let doc_id = store.add_document("scan.pdf", "", Default::default()).unwrap();
        assert!(store.search_documents("backfilled", 10).unwrap().is_empty());

        store
            .replace_content_and_mentions(doc_id, "OCR text backfilled later", None, &[])
            .unwrap();
        let doc = store.get_document(doc_id).unwrap().unwrap();
        assert_eq!(doc.content, "OCR text backfilled later");
        assert!(doc.updated_at.is_some());
        assert_eq!(store.search_documents("backfilled", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_pagination() {
        let (store, _dir) = test_store();
        for i in 0..5 {
            store
                .add_document(
                    &format!("doc{}.txt", i),
                    &format!("Document number {}", i),
                    AddDocumentOptions {
                        uploaded_at: Some(1000 + i),
                        ..Default::default()
                    },
                )
                .unwrap();
        }

        let (docs, total) = store.get_documents_paginated(1, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "doc4.txt");

        let (last, _) = store.get_documents_paginated(3, 2).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].filename, "doc0.txt");
    }

    #[test]
    fn test_stats_empty() {
        let (store, _dir) = test_store();
        let stats = store.get_stats().unwrap();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.entities, 0);
        assert_eq!(stats.cooccurrences, 0);
        assert!(stats.entities_by_type.is_empty());
        assert!(stats.db_path.ends_with(DB_FILENAME));
    }
}
