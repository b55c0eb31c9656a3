//! Derived tables: co-occurrence pairs, timeline events, event clusters.
//!
//! Every writer here replaces its table wholesale inside one IMMEDIATE
//! transaction, so readers see either the old rows or the new ones.

use chrono::NaiveDate;
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::debug;

use crate::entities::row_to_entity;
use crate::records::from_json;
use crate::sqlite::{db_err, SqliteStore};
use crate::types::*;
use casefile_core::{Error, Result};

fn date_str(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|l| l as i64).unwrap_or(-1)
}

fn like_pattern(needle: Option<&str>) -> Option<String> {
    needle
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s))
}

fn read_date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Derived rows are numbered 1..n in builder order so a rebuild over
/// unchanged inputs writes identical ids.
fn insert_cluster(conn: &Connection, id: i64, cluster: &NewCluster, event_ids: &[i64]) -> Result<()> {
    let type_counts = serde_json::to_string(&cluster.type_counts)?;
    let top_entities = serde_json::to_string(&cluster.top_entities)?;
    let ids = serde_json::to_string(event_ids)?;
    conn.prepare_cached(
        "INSERT INTO event_clusters \
         (id, start_date, end_date, span_days, event_count, avg_suspicion, severity, event_ids_json, type_counts_json, top_entities_json) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .map_err(db_err)?
    .execute(params![
        id,
        date_str(cluster.start_date),
        date_str(cluster.end_date),
        (cluster.end_date - cluster.start_date).num_days(),
        event_ids.len() as i64,
        cluster.avg_suspicion,
        cluster.severity.as_str(),
        ids,
        type_counts,
        top_entities,
    ])
    .map_err(db_err)?;
    Ok(())
}

/// Resolve cluster member indices against the ids of the events they were
/// computed from.
fn member_ids(cluster: &NewCluster, event_ids: &[i64]) -> Result<Vec<i64>> {
    cluster
        .member_indices
        .iter()
        .map(|&i| {
            event_ids.get(i).copied().ok_or_else(|| {
                Error::Internal(format!(
                    "cluster member index {} out of range ({} events)",
                    i,
                    event_ids.len()
                ))
            })
        })
        .collect()
}

impl SqliteStore {
    // ---------------------------------------------------------------
    // Co-occurrence
    // ---------------------------------------------------------------

    /// Replace the whole co-occurrence table.
    pub fn replace_cooccurrences(&self, records: &[CoOccurrenceRecord]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        tx.execute("DELETE FROM co_occurrences", []).map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO co_occurrences (entity_a, entity_b, count, document_ids_json) \
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(db_err)?;
            for r in records {
                stmt.execute(params![
                    r.entity_a,
                    r.entity_b,
                    r.count,
                    serde_json::to_string(&r.document_ids)?,
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        debug!("Co-occurrence table replaced: {} pairs", records.len());
        Ok(records.len())
    }

    /// Pairs joined with entity names, strongest first.
    pub fn list_cooccurrences(&self, filter: &CoOccurrenceFilter) -> Result<Vec<CoOccurrence>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT c.entity_a, ea.name, c.entity_b, eb.name, c.count, c.document_ids_json \
                 FROM co_occurrences c \
                 JOIN entities ea ON ea.id = c.entity_a \
                 JOIN entities eb ON eb.id = c.entity_b \
                 WHERE c.count >= ?1 AND (?2 IS NULL OR ea.name LIKE ?2 OR eb.name LIKE ?2) \
                 ORDER BY c.count DESC, c.entity_a, c.entity_b \
                 LIMIT ?3",
            )
            .map_err(db_err)?;
        let pairs = stmt
            .query_map(
                params![
                    filter.min_count.unwrap_or(0),
                    like_pattern(filter.entity_name.as_deref()),
                    sql_limit(filter.limit),
                ],
                |row| {
                    Ok(CoOccurrence {
                        entity_a: row.get(0)?,
                        entity_a_name: row.get(1)?,
                        entity_b: row.get(2)?,
                        entity_b_name: row.get(3)?,
                        count: row.get(4)?,
                        document_ids: from_json(&row.get::<_, String>(5)?),
                    })
                },
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(pairs)
    }

    /// Edges whose both endpoints are in `entity_ids`.
    pub fn network_edges(&self, entity_ids: &[i64], min_weight: i64) -> Result<Vec<NetworkEdge>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = serde_json::to_string(entity_ids)?;
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT entity_a, entity_b, count FROM co_occurrences \
                 WHERE count >= ?1 \
                   AND entity_a IN (SELECT value FROM json_each(?2)) \
                   AND entity_b IN (SELECT value FROM json_each(?2)) \
                 ORDER BY count DESC, entity_a, entity_b",
            )
            .map_err(db_err)?;
        let edges = stmt
            .query_map(params![min_weight, ids], |row| {
                Ok(NetworkEdge {
                    from: row.get(0)?,
                    to: row.get(1)?,
                    weight: row.get(2)?,
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(edges)
    }

    /// Partners of one entity, strongest first.
    pub fn entity_connections(&self, entity_id: i64, limit: usize) -> Result<Vec<EntityConnection>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT e.id, e.name, e.entity_type, e.mention_count, c.count, c.document_ids_json \
                 FROM co_occurrences c \
                 JOIN entities e ON e.id = CASE WHEN c.entity_a = ?1 THEN c.entity_b ELSE c.entity_a END \
                 WHERE c.entity_a = ?1 OR c.entity_b = ?1 \
                 ORDER BY c.count DESC, e.id \
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let connections = stmt
            .query_map(params![entity_id, limit as i64], |row| {
                Ok(EntityConnection {
                    entity: row_to_entity(row)?,
                    count: row.get(4)?,
                    document_ids: from_json(&row.get::<_, String>(5)?),
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(connections)
    }

    // ---------------------------------------------------------------
    // Timeline & clusters
    // ---------------------------------------------------------------

    /// Replace timeline events and clusters together. Cluster member
    /// indices refer to positions in `events`.
    pub fn replace_timeline(
        &self,
        events: &[NewTimelineEvent],
        clusters: &[NewCluster],
    ) -> Result<(usize, usize)> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        tx.execute("DELETE FROM event_clusters", []).map_err(db_err)?;
        tx.execute("DELETE FROM timeline_events", []).map_err(db_err)?;

        let mut event_ids = Vec::with_capacity(events.len());
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO timeline_events \
                     (id, event_date, event_type, subtype, title, description, entities_json, is_suspicious, suspicion_level, source_table, source_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )
                .map_err(db_err)?;
            for (e, id) in events.iter().zip(1i64..) {
                stmt.execute(params![
                    id,
                    date_str(e.event_date),
                    e.event_type.as_str(),
                    e.subtype,
                    e.title,
                    e.description,
                    serde_json::to_string(&e.entities)?,
                    e.is_suspicious,
                    e.suspicion_level,
                    e.event_type.source_table(),
                    e.source_id,
                ])
                .map_err(db_err)?;
                event_ids.push(id);
            }
        }
        for (cluster, id) in clusters.iter().zip(1i64..) {
            insert_cluster(&tx, id, cluster, &member_ids(cluster, &event_ids)?)?;
        }
        tx.commit().map_err(db_err)?;
        debug!(
            "Timeline replaced: {} events, {} clusters",
            events.len(),
            clusters.len()
        );
        Ok((events.len(), clusters.len()))
    }

    /// Replace clusters only. Member indices refer to positions in `events`,
    /// which must be stored timeline events.
    pub fn replace_clusters(&self, events: &[TimelineEvent], clusters: &[NewCluster]) -> Result<usize> {
        let event_ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        tx.execute("DELETE FROM event_clusters", []).map_err(db_err)?;
        for (cluster, id) in clusters.iter().zip(1i64..) {
            insert_cluster(&tx, id, cluster, &member_ids(cluster, &event_ids)?)?;
        }
        tx.commit().map_err(db_err)?;
        Ok(clusters.len())
    }

    /// Timeline events in chronological order (date, then insertion order).
    pub fn list_timeline_events(&self, filter: &TimelineFilter) -> Result<Vec<TimelineEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, event_date, event_type, subtype, title, description, entities_json, \
                        is_suspicious, suspicion_level, source_table, source_id \
                 FROM timeline_events \
                 WHERE (?1 IS NULL OR event_date >= ?1) \
                   AND (?2 IS NULL OR event_date <= ?2) \
                   AND (?3 IS NULL OR event_type = ?3) \
                   AND (?4 = 0 OR is_suspicious = 1) \
                   AND (?5 IS NULL OR EXISTS (SELECT 1 FROM json_each(entities_json) WHERE value LIKE ?5)) \
                 ORDER BY event_date, id \
                 LIMIT ?6",
            )
            .map_err(db_err)?;
        let events = stmt
            .query_map(
                params![
                    filter.from.map(date_str),
                    filter.to.map(date_str),
                    filter.event_type.map(|t| t.as_str()),
                    filter.suspicious_only,
                    like_pattern(filter.entity_name.as_deref()),
                    sql_limit(filter.limit),
                ],
                |row| {
                    let type_name: String = row.get(2)?;
                    let event_type = EventType::parse(&type_name).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            format!("unknown event type {}", type_name).into(),
                        )
                    })?;
                    Ok(TimelineEvent {
                        id: row.get(0)?,
                        event: NewTimelineEvent {
                            event_date: read_date(row, 1)?,
                            event_type,
                            subtype: row.get(3)?,
                            title: row.get(4)?,
                            description: row.get(5)?,
                            entities: from_json(&row.get::<_, String>(6)?),
                            is_suspicious: row.get(7)?,
                            suspicion_level: row.get(8)?,
                            source_id: row.get(10)?,
                        },
                        source_table: row.get(9)?,
                    })
                },
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(events)
    }

    /// Clusters ordered by start date. Date bounds select clusters that
    /// overlap the range.
    pub fn list_clusters(&self, filter: &ClusterFilter) -> Result<Vec<Cluster>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, start_date, end_date, span_days, event_count, avg_suspicion, severity, \
                        event_ids_json, type_counts_json, top_entities_json \
                 FROM event_clusters \
                 WHERE (?1 IS NULL OR severity = ?1) \
                   AND (?2 IS NULL OR end_date >= ?2) \
                   AND (?3 IS NULL OR start_date <= ?3) \
                 ORDER BY start_date, id",
            )
            .map_err(db_err)?;
        let clusters = stmt
            .query_map(
                params![
                    filter.severity.map(|s| s.as_str()),
                    filter.from.map(date_str),
                    filter.to.map(date_str),
                ],
                |row| {
                    let severity: String = row.get(6)?;
                    Ok(Cluster {
                        id: row.get(0)?,
                        start_date: read_date(row, 1)?,
                        end_date: read_date(row, 2)?,
                        span_days: row.get(3)?,
                        event_count: row.get(4)?,
                        avg_suspicion: row.get(5)?,
                        severity: Severity::parse(&severity).unwrap_or(Severity::Low),
                        event_ids: from_json(&row.get::<_, String>(7)?),
                        type_counts: serde_json::from_str(&row.get::<_, String>(8)?)
                            .unwrap_or_default(),
                        top_entities: from_json(&row.get::<_, String>(9)?),
                    })
                },
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(clusters)
    }
}
