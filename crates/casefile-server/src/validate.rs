//! Data directory validation — checks that an existing database has the
//! tables and columns Casefile expects, and reports row counts.
//!
//! The database is opened read-only; nothing is created or repaired.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use tracing::{info, warn};

use casefile_store::schema::REQUIRED_COLUMNS;
use casefile_store::sqlite::DB_FILENAME;

/// Result of validating a data directory.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub db_valid: bool,
    pub documents: i64,
    pub entities: i64,
    pub mentions: i64,
    pub cooccurrences: i64,
    pub timeline_events: i64,
    pub clusters: i64,
    pub source_records: i64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Validate that a data directory contains a compatible Casefile database.
pub fn validate(data_dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    let db_path = data_dir.join("db").join(DB_FILENAME);
    if !db_path.exists() {
        report
            .errors
            .push(format!("Database not found: {}", db_path.display()));
        return report;
    }

    let conn = match Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(format!("Failed to open database: {}", e));
            return report;
        }
    };

    for (table, columns) in REQUIRED_COLUMNS {
        match table_exists(&conn, table) {
            Ok(true) => {}
            Ok(false) => {
                report.errors.push(format!("Missing required table: {}", table));
                continue;
            }
            Err(e) => {
                report
                    .errors
                    .push(format!("Error checking table {}: {}", table, e));
                continue;
            }
        }
        let present = get_column_names(&conn, table);
        for col in columns.iter() {
            if !present.iter().any(|c| c == col) {
                report
                    .errors
                    .push(format!("{} table missing column: {}", table, col));
            }
        }
    }

    match table_exists(&conn, "documents_fts") {
        Ok(true) => {}
        _ => report
            .warnings
            .push("Full-text index missing; search will be unavailable".to_string()),
    }

    if !report.errors.is_empty() {
        return report;
    }

    report.db_valid = true;

    report.documents = count_rows(&conn, "documents").unwrap_or(0);
    report.entities = count_rows(&conn, "entities").unwrap_or(0);
    report.mentions = count_rows(&conn, "mentions").unwrap_or(0);
    report.cooccurrences = count_rows(&conn, "co_occurrences").unwrap_or(0);
    report.timeline_events = count_rows(&conn, "timeline_events").unwrap_or(0);
    report.clusters = count_rows(&conn, "event_clusters").unwrap_or(0);
    report.source_records = ["flights", "emails", "transactions"]
        .iter()
        .map(|t| count_rows(&conn, t).unwrap_or(0))
        .sum();

    if let Ok(orphans) = conn.query_row(
        "SELECT COUNT(*) FROM mentions WHERE doc_id NOT IN (SELECT id FROM documents) \
            OR entity_id NOT IN (SELECT id FROM entities)",
        [],
        |row| row.get::<_, i64>(0),
    ) {
        if orphans > 0 {
            report
                .warnings
                .push(format!("{} orphaned mentions found (run consolidate)", orphans));
        }
    }

    if report.mentions > 0 && report.cooccurrences == 0 {
        report
            .warnings
            .push("Mentions present but no co-occurrences; run 'casefile rebuild cooccurrences'".to_string());
    }
    if report.source_records > 0 && report.timeline_events == 0 {
        report
            .warnings
            .push("Source records present but no timeline; run 'casefile rebuild timeline'".to_string());
    }

    if report.warnings.is_empty() {
        info!("Validated {}", db_path.display());
    } else {
        warn!(
            "Validated {} with {} warning(s)",
            db_path.display(),
            report.warnings.len()
        );
    }
    report
}

pub fn print_report(report: &ValidationReport) {
    println!("=== Casefile Validation Report ===");
    println!();
    println!("Database valid:     {}", if report.db_valid { "YES" } else { "NO" });
    println!("Documents:          {}", report.documents);
    println!("Entities:           {}", report.entities);
    println!("Mentions:           {}", report.mentions);
    println!("Co-occurrences:     {}", report.cooccurrences);
    println!("Source records:     {}", report.source_records);
    println!("Timeline events:    {}", report.timeline_events);
    println!("Clusters:           {}", report.clusters);

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }

    println!();
    if report.errors.is_empty() && report.db_valid {
        println!("Status: READY FOR USE");
    } else {
        println!("Status: INVALID");
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn get_column_names(conn: &Connection, table: &str) -> Vec<String> {
    // Table names come from REQUIRED_COLUMNS, never from input.
    let query = format!("PRAGMA table_info({})", table);
    let mut names = Vec::new();
    if let Ok(mut stmt) = conn.prepare(&query) {
        if let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(1)) {
            for name in rows.flatten() {
                names.push(name);
            }
        }
    }
    names
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64, rusqlite::Error> {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    conn.query_row(&query, [], |row| row.get(0))
}
