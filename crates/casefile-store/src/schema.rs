//! Database schema SQL.

/// Base tables: documents, entities, mentions.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT UNIQUE,
    uploaded_at INTEGER NOT NULL,
    updated_at INTEGER
);

CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    entity_type TEXT NOT NULL,
    mention_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE (name, entity_type)
);

CREATE TABLE IF NOT EXISTS mentions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    entity_id INTEGER NOT NULL REFERENCES entities(id),
    context TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(content_hash);
CREATE INDEX IF NOT EXISTS idx_entities_type_count ON entities(entity_type, mention_count DESC);
CREATE INDEX IF NOT EXISTS idx_mentions_doc ON mentions(doc_id);
CREATE INDEX IF NOT EXISTS idx_mentions_entity ON mentions(entity_id);
"#;

/// Source records produced by the flight / email / transaction parsers.
pub const RECORDS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS flights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_date TEXT,
    origin TEXT NOT NULL DEFAULT '',
    destination TEXT NOT NULL DEFAULT '',
    passengers_json TEXT NOT NULL DEFAULT '[]',
    aircraft TEXT,
    doc_id INTEGER REFERENCES documents(id) ON DELETE SET NULL,
    suspicion_level INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS emails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sent_date TEXT,
    sender TEXT NOT NULL DEFAULT '',
    recipients_json TEXT NOT NULL DEFAULT '[]',
    subject TEXT NOT NULL DEFAULT '',
    doc_id INTEGER REFERENCES documents(id) ON DELETE SET NULL,
    suspicion_score REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_date TEXT,
    amount REAL NOT NULL DEFAULT 0,
    currency TEXT NOT NULL DEFAULT 'USD',
    from_party TEXT NOT NULL DEFAULT '',
    to_party TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    doc_id INTEGER REFERENCES documents(id) ON DELETE SET NULL,
    suspicion_level INTEGER NOT NULL DEFAULT 0
);
"#;

/// Derived tables. Always fully replaced by a rebuild.
pub const DERIVED_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS co_occurrences (
    entity_a INTEGER NOT NULL,
    entity_b INTEGER NOT NULL,
    count INTEGER NOT NULL,
    document_ids_json TEXT NOT NULL,
    PRIMARY KEY (entity_a, entity_b),
    CHECK (entity_a < entity_b)
);

CREATE INDEX IF NOT EXISTS idx_cooc_b ON co_occurrences(entity_b);
CREATE INDEX IF NOT EXISTS idx_cooc_count ON co_occurrences(count DESC);

CREATE TABLE IF NOT EXISTS timeline_events (
    id INTEGER PRIMARY KEY,
    event_date TEXT NOT NULL,
    event_type TEXT NOT NULL,
    subtype TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    entities_json TEXT NOT NULL DEFAULT '[]',
    is_suspicious INTEGER NOT NULL DEFAULT 0,
    suspicion_level INTEGER NOT NULL DEFAULT 0,
    source_table TEXT NOT NULL,
    source_id INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_timeline_date ON timeline_events(event_date);

CREATE TABLE IF NOT EXISTS event_clusters (
    id INTEGER PRIMARY KEY,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    span_days INTEGER NOT NULL,
    event_count INTEGER NOT NULL,
    avg_suspicion REAL NOT NULL,
    severity TEXT NOT NULL,
    event_ids_json TEXT NOT NULL,
    type_counts_json TEXT NOT NULL DEFAULT '{}',
    top_entities_json TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_clusters_start ON event_clusters(start_date);
"#;

/// FTS5 virtual table over document filename + content.
pub const FTS_SCHEMA_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    filename, content,
    content='documents', content_rowid='id',
    tokenize='porter unicode61'
);
"#;

/// Triggers to keep the FTS index in sync with the documents table.
pub const FTS_TRIGGERS_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
    INSERT INTO documents_fts(rowid, filename, content)
    VALUES (new.id, new.filename, new.content);
END;

CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, filename, content)
    VALUES ('delete', old.id, old.filename, old.content);
END;

CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, filename, content)
    VALUES ('delete', old.id, old.filename, old.content);
    INSERT INTO documents_fts(rowid, filename, content)
    VALUES (new.id, new.filename, new.content);
END;
"#;

/// Tables a valid database must contain, with the columns readers rely on.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("documents", &["id", "filename", "content", "content_hash", "uploaded_at"]),
    ("entities", &["id", "name", "entity_type", "mention_count"]),
    ("mentions", &["id", "doc_id", "entity_id", "context"]),
    ("co_occurrences", &["entity_a", "entity_b", "count", "document_ids_json"]),
    ("timeline_events", &["id", "event_date", "event_type", "source_table", "source_id"]),
    ("event_clusters", &["id", "start_date", "end_date", "severity", "event_ids_json"]),
    ("flights", &["id", "flight_date", "passengers_json", "suspicion_level"]),
    ("emails", &["id", "sent_date", "sender", "recipients_json", "suspicion_score"]),
    ("transactions", &["id", "transaction_date", "amount", "suspicion_level"]),
];
