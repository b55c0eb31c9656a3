//! Row types for documents, entities, mentions, source records, and the
//! derived analysis tables.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Storage format for all dates in derived tables.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------
// Documents
// ---------------------------------------------------------------

/// A document row from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub uploaded_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Document listing entry without the body.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: i64,
    pub filename: String,
    pub content_length: i64,
    pub mention_count: i64,
    pub uploaded_at: i64,
}

/// Options for adding a document.
#[derive(Debug, Clone, Default)]
pub struct AddDocumentOptions {
    pub content_hash: Option<String>,
    pub uploaded_at: Option<i64>,
}

/// A full-text search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: i64,
    pub filename: String,
    pub snippet: String,
    pub score: f64,
}

// ---------------------------------------------------------------
// Entities & mentions
// ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Date,
    Amount,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Date => "date",
            Self::Amount => "amount",
            Self::Other => "other",
        }
    }

    /// Parse a stored type name. Unknown names map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "person" | "persons" | "people" => Self::Person,
            "organization" | "organisation" | "org" => Self::Organization,
            "location" | "place" => Self::Location,
            "date" => Self::Date,
            "amount" | "money" => Self::Amount,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity row: unique by (name, entity_type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub entity_type: EntityType,
    pub mention_count: i64,
}

/// A stored mention of an entity in a document.
#[derive(Debug, Clone, Serialize)]
pub struct Mention {
    pub id: i64,
    pub doc_id: i64,
    pub entity_id: i64,
    pub context: String,
    pub created_at: i64,
}

/// A mention to be recorded; the entity is upserted by (name, type).
#[derive(Debug, Clone, PartialEq)]
pub struct NewMention {
    pub name: String,
    pub entity_type: EntityType,
    pub context: String,
}

/// Distinct entity in a document along with its corpus-wide mention count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentEntity {
    pub entity_id: i64,
    pub mention_count: i64,
}

/// All distinct entities mentioned in one document.
#[derive(Debug, Clone)]
pub struct DocumentEntities {
    pub doc_id: i64,
    pub entities: Vec<DocumentEntity>,
}

/// Mention counts from swapping a document's mention set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MentionSwap {
    pub removed: usize,
    pub recorded: usize,
}

/// Outcome of folding one entity into another.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub survivor_id: i64,
    pub duplicate_id: i64,
    pub mentions_moved: usize,
    pub survivor_mention_count: i64,
}

// ---------------------------------------------------------------
// Co-occurrence & network
// ---------------------------------------------------------------

/// A pair to be written to the co-occurrence table. `entity_a < entity_b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoOccurrenceRecord {
    pub entity_a: i64,
    pub entity_b: i64,
    pub count: i64,
    pub document_ids: Vec<i64>,
}

/// A co-occurrence row joined with entity names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoOccurrence {
    pub entity_a: i64,
    pub entity_a_name: String,
    pub entity_b: i64,
    pub entity_b_name: String,
    pub count: i64,
    pub document_ids: Vec<i64>,
}

/// Filters for listing co-occurrence pairs.
#[derive(Debug, Clone, Default)]
pub struct CoOccurrenceFilter {
    pub min_count: Option<i64>,
    /// Substring match on either entity name (case-insensitive).
    pub entity_name: Option<String>,
    pub limit: Option<usize>,
}

/// A node in the projected relationship network.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkNode {
    pub id: i64,
    pub label: String,
    pub entity_type: EntityType,
    pub weight: i64,
}

/// An undirected edge in the projected relationship network.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkEdge {
    pub from: i64,
    pub to: i64,
    pub weight: i64,
}

/// One partner of an entity in the co-occurrence table.
#[derive(Debug, Clone, Serialize)]
pub struct EntityConnection {
    pub entity: Entity,
    pub count: i64,
    pub document_ids: Vec<i64>,
}

// ---------------------------------------------------------------
// Source records (timeline inputs)
// ---------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFlight {
    /// Raw date text as found in the source.
    pub flight_date: Option<String>,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub passengers: Vec<String>,
    #[serde(default)]
    pub aircraft: Option<String>,
    #[serde(default)]
    pub doc_id: Option<i64>,
    #[serde(default)]
    pub suspicion_level: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Flight {
    pub id: i64,
    #[serde(flatten)]
    pub record: NewFlight,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEmail {
    pub sent_date: Option<String>,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub doc_id: Option<i64>,
    /// Heuristic score on a 0–10 scale.
    #[serde(default)]
    pub suspicion_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub id: i64,
    #[serde(flatten)]
    pub record: NewEmail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTransaction {
    pub transaction_date: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub from_party: String,
    #[serde(default)]
    pub to_party: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub doc_id: Option<i64>,
    #[serde(default)]
    pub suspicion_level: i64,
}

fn default_currency() -> String {
    "USD".into()
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    #[serde(flatten)]
    pub record: NewTransaction,
}

// ---------------------------------------------------------------
// Timeline & clusters
// ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Flight,
    Email,
    Transaction,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flight => "flight",
            Self::Email => "email",
            Self::Transaction => "transaction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "flight" | "flights" => Some(Self::Flight),
            "email" | "emails" => Some(Self::Email),
            "transaction" | "transactions" => Some(Self::Transaction),
            _ => None,
        }
    }

    /// Table the event's source record lives in.
    pub fn source_table(&self) -> &'static str {
        match self {
            Self::Flight => "flights",
            Self::Email => "emails",
            Self::Transaction => "transactions",
        }
    }
}

/// A normalized event ready to be written to the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTimelineEvent {
    pub event_date: NaiveDate,
    pub event_type: EventType,
    pub subtype: String,
    pub title: String,
    pub description: String,
    pub entities: Vec<String>,
    pub is_suspicious: bool,
    pub suspicion_level: i64,
    pub source_id: i64,
}

/// A stored timeline event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEvent {
    pub id: i64,
    #[serde(flatten)]
    pub event: NewTimelineEvent,
    pub source_table: String,
}

/// Filters for listing timeline events.
#[derive(Debug, Clone, Default)]
pub struct TimelineFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub event_type: Option<EventType>,
    /// Substring match on any involved entity name (case-insensitive).
    pub entity_name: Option<String>,
    pub suspicious_only: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }
}

/// A cluster to be written. `member_indices` index into the event slice it
/// was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCluster {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub avg_suspicion: f64,
    pub severity: Severity,
    pub member_indices: Vec<usize>,
    pub type_counts: BTreeMap<String, usize>,
    pub top_entities: Vec<String>,
}

/// A stored cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub span_days: i64,
    pub event_count: i64,
    pub avg_suspicion: f64,
    pub severity: Severity,
    pub event_ids: Vec<i64>,
    pub type_counts: BTreeMap<String, usize>,
    pub top_entities: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterFilter {
    pub severity: Option<Severity>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ---------------------------------------------------------------
// Stats
// ---------------------------------------------------------------

/// Store-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub entities: i64,
    pub entities_by_type: BTreeMap<String, i64>,
    pub mentions: i64,
    pub cooccurrences: i64,
    pub flights: i64,
    pub emails: i64,
    pub transactions: i64,
    pub timeline_events: i64,
    pub clusters: i64,
    pub db_path: String,
    pub db_size_mb: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_parse() {
        assert_eq!(EntityType::parse("Person"), EntityType::Person);
        assert_eq!(EntityType::parse(" org "), EntityType::Organization);
        assert_eq!(EntityType::parse("vessel"), EntityType::Other);
        assert_eq!(EntityType::Location.to_string(), "location");
    }

    #[test]
    fn test_severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Medium).unwrap();
        assert_eq!(json, "\"MEDIUM\"");
        assert_eq!(Severity::parse("high"), Some(Severity::High));
        assert_eq!(Severity::parse("urgent"), None);
    }

    #[test]
    fn test_event_type_source_table() {
        assert_eq!(EventType::parse("Flights"), Some(EventType::Flight));
        assert_eq!(EventType::Transaction.source_table(), "transactions");
    }
}
