//! Entity store and mention index.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::sqlite::{content_err, db_err, now_millis, SqliteStore};
use crate::types::*;
use casefile_core::{Error, Result};

const UPSERT_ENTITY_SQL: &str = "INSERT INTO entities (name, entity_type, mention_count) \
     VALUES (?1, ?2, ?3) \
     ON CONFLICT(name, entity_type) DO UPDATE SET mention_count = mention_count + excluded.mention_count \
     RETURNING id";

/// Remove a document's mentions and give back their counts.
/// Entities left with no mentions are deleted.
pub(crate) fn clear_mentions_in(conn: &Connection, doc_id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE entities SET mention_count = mention_count - \
             (SELECT COUNT(*) FROM mentions m WHERE m.doc_id = ?1 AND m.entity_id = entities.id) \
         WHERE id IN (SELECT entity_id FROM mentions WHERE doc_id = ?1)",
        params![doc_id],
    )?;
    let removed = conn.execute("DELETE FROM mentions WHERE doc_id = ?1", params![doc_id])?;
    conn.execute(
        "DELETE FROM entities WHERE mention_count <= 0 \
         AND id NOT IN (SELECT entity_id FROM mentions)",
        [],
    )?;
    Ok(removed)
}

/// Upsert each mention's entity and insert the mention row.
pub(crate) fn insert_mentions_in(
    conn: &Connection,
    doc_id: i64,
    mentions: &[NewMention],
) -> rusqlite::Result<()> {
    let now = now_millis();
    let mut upsert = conn.prepare_cached(UPSERT_ENTITY_SQL)?;
    let mut insert = conn.prepare_cached(
        "INSERT INTO mentions (doc_id, entity_id, context, created_at) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for mention in mentions {
        let entity_id: i64 = upsert.query_row(
            params![mention.name, mention.entity_type.as_str(), 1],
            |row| row.get(0),
        )?;
        insert.execute(params![doc_id, entity_id, mention.context, now])?;
    }
    Ok(())
}

impl SqliteStore {
    /// Atomic insert-or-increment. Returns the entity id.
    pub fn upsert_entity(&self, name: &str, entity_type: &EntityType) -> Result<i64> {
        let conn = self.conn.lock();
        let id: i64 = conn
            .prepare_cached(UPSERT_ENTITY_SQL)
            .map_err(db_err)?
            .query_row(params![name, entity_type.as_str(), 1], |row| row.get(0))
            .map_err(db_err)?;
        Ok(id)
    }

    /// Record mentions for a document in one transaction. Each mention
    /// upserts its entity and bumps the counter by one.
    pub fn record_mentions(&self, doc_id: i64, mentions: &[NewMention]) -> Result<usize> {
        if mentions.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        insert_mentions_in(&tx, doc_id, mentions).map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        debug!("Recorded {} mentions for document {}", mentions.len(), doc_id);
        Ok(mentions.len())
    }

    /// Swap a document's mention set in one transaction: the old mentions
    /// are cleared and `mentions` recorded, or nothing changes.
    pub fn replace_document_mentions(
        &self,
        doc_id: i64,
        mentions: &[NewMention],
    ) -> Result<MentionSwap> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let removed = clear_mentions_in(&tx, doc_id).map_err(db_err)?;
        insert_mentions_in(&tx, doc_id, mentions).map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(MentionSwap {
            removed,
            recorded: mentions.len(),
        })
    }

    /// Replace a document's content and its mention set together.
    /// `NotFound` when the document does not exist, `DuplicateContent` when
    /// another document already holds `content_hash`.
    pub fn replace_content_and_mentions(
        &self,
        doc_id: i64,
        content: &str,
        content_hash: Option<&str>,
        mentions: &[NewMention],
    ) -> Result<MentionSwap> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let updated = tx
            .execute(
                "UPDATE documents SET content = ?1, content_hash = ?2, updated_at = ?3 WHERE id = ?4",
                params![content, content_hash, now_millis(), doc_id],
            )
            .map_err(|e| content_err(e, content_hash))?;
        if updated == 0 {
            return Err(Error::NotFound(format!("document {}", doc_id)));
        }
        let removed = clear_mentions_in(&tx, doc_id).map_err(db_err)?;
        insert_mentions_in(&tx, doc_id, mentions).map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        debug!(
            "Document {} content replaced: {} mentions removed, {} recorded",
            doc_id,
            removed,
            mentions.len()
        );
        Ok(MentionSwap {
            removed,
            recorded: mentions.len(),
        })
    }

    /// Remove all mentions of a document (before re-extraction).
    pub fn clear_document_mentions(&self, doc_id: i64) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let removed = clear_mentions_in(&tx, doc_id).map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(removed)
    }

    pub fn get_entity(&self, entity_id: i64) -> Result<Option<Entity>> {
        let conn = self.conn.lock();
        let entity = conn
            .prepare_cached("SELECT id, name, entity_type, mention_count FROM entities WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![entity_id], row_to_entity)
            .optional()
            .map_err(db_err)?;
        Ok(entity)
    }

    /// Entities ordered by mention count (desc), then id.
    pub fn list_entities(&self, entity_type: Option<&EntityType>, limit: usize) -> Result<Vec<Entity>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, name, entity_type, mention_count FROM entities \
                 WHERE (?1 IS NULL OR entity_type = ?1) \
                 ORDER BY mention_count DESC, id ASC LIMIT ?2",
            )
            .map_err(db_err)?;
        let entities = stmt
            .query_map(
                params![entity_type.map(|t| t.as_str()), limit as i64],
                row_to_entity,
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(entities)
    }

    /// Every entity, ordered by id.
    pub fn all_entities(&self) -> Result<Vec<Entity>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id, name, entity_type, mention_count FROM entities ORDER BY id")
            .map_err(db_err)?;
        let entities = stmt
            .query_map([], row_to_entity)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(entities)
    }

    pub fn mentions_for_document(&self, doc_id: i64) -> Result<Vec<Mention>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM mentions WHERE doc_id = ?1 ORDER BY id")
            .map_err(db_err)?;
        let mentions = stmt
            .query_map(params![doc_id], row_to_mention)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(mentions)
    }

    pub fn mentions_for_entity(&self, entity_id: i64, limit: usize) -> Result<Vec<Mention>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM mentions WHERE entity_id = ?1 ORDER BY id LIMIT ?2")
            .map_err(db_err)?;
        let mentions = stmt
            .query_map(params![entity_id, limit as i64], row_to_mention)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(mentions)
    }

    /// Fold `duplicate_id` into `survivor_id`: mentions are re-pointed, the
    /// counter is added to the survivor, the duplicate is deleted.
    ///
    /// Co-occurrence rows naming the duplicate are dropped; the table must be
    /// rebuilt for correct counts.
    pub fn merge_entities(&self, survivor_id: i64, duplicate_id: i64) -> Result<MergeOutcome> {
        if survivor_id == duplicate_id {
            return Err(Error::InvalidInput(format!(
                "cannot merge entity {} into itself",
                survivor_id
            )));
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let lookup = |id: i64| -> Result<Entity> {
            tx.query_row(
                "SELECT id, name, entity_type, mention_count FROM entities WHERE id = ?1",
                params![id],
                row_to_entity,
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| Error::NotFound(format!("entity {}", id)))
        };
        let survivor = lookup(survivor_id)?;
        let duplicate = lookup(duplicate_id)?;

        let mentions_moved = tx
            .execute(
                "UPDATE mentions SET entity_id = ?1 WHERE entity_id = ?2",
                params![survivor.id, duplicate.id],
            )
            .map_err(db_err)?;
        tx.execute(
            "UPDATE entities SET mention_count = mention_count + ?1 WHERE id = ?2",
            params![duplicate.mention_count, survivor.id],
        )
        .map_err(db_err)?;
        tx.execute(
            "DELETE FROM co_occurrences WHERE entity_a = ?1 OR entity_b = ?1",
            params![duplicate.id],
        )
        .map_err(db_err)?;
        tx.execute("DELETE FROM entities WHERE id = ?1", params![duplicate.id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        debug!(
            "Merged entity {} ({}) into {} ({})",
            duplicate.id, duplicate.name, survivor.id, survivor.name
        );

        Ok(MergeOutcome {
            survivor_id: survivor.id,
            duplicate_id: duplicate.id,
            mentions_moved,
            survivor_mention_count: survivor.mention_count + duplicate.mention_count,
        })
    }

    /// Delete mentions pointing at missing entities and entities with no
    /// mentions. Returns (mentions, entities) removed.
    pub fn prune_orphans(&self) -> Result<(usize, usize)> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let mentions = tx
            .execute(
                "DELETE FROM mentions WHERE entity_id NOT IN (SELECT id FROM entities)",
                [],
            )
            .map_err(db_err)?;
        let entities = tx
            .execute(
                "DELETE FROM entities WHERE id NOT IN (SELECT entity_id FROM mentions)",
                [],
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok((mentions, entities))
    }

    /// Reset every counter to its actual mention count. Returns rows changed.
    pub fn recount_mentions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE entities SET mention_count = \
                     (SELECT COUNT(*) FROM mentions m WHERE m.entity_id = entities.id) \
                 WHERE mention_count != (SELECT COUNT(*) FROM mentions m WHERE m.entity_id = entities.id)",
                [],
            )
            .map_err(db_err)?;
        Ok(changed)
    }

    /// Distinct entities per document, grouped by document id (ascending).
    /// Each entity carries its corpus-wide mention count.
    pub fn document_entity_sets(
        &self,
        entity_type: Option<&EntityType>,
    ) -> Result<Vec<DocumentEntities>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT m.doc_id, m.entity_id, e.mention_count \
                 FROM mentions m JOIN entities e ON e.id = m.entity_id \
                 WHERE (?1 IS NULL OR e.entity_type = ?1) \
                 GROUP BY m.doc_id, m.entity_id \
                 ORDER BY m.doc_id, m.entity_id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![entity_type.map(|t| t.as_str())], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    DocumentEntity {
                        entity_id: row.get(1)?,
                        mention_count: row.get(2)?,
                    },
                ))
            })
            .map_err(db_err)?;

        let mut sets: Vec<DocumentEntities> = Vec::new();
        for row in rows {
            let (doc_id, entity) = row.map_err(db_err)?;
            match sets.last_mut() {
                Some(last) if last.doc_id == doc_id => last.entities.push(entity),
                _ => sets.push(DocumentEntities {
                    doc_id,
                    entities: vec![entity],
                }),
            }
        }
        Ok(sets)
    }
}

pub(crate) fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        name: row.get(1)?,
        entity_type: EntityType::parse(&row.get::<_, String>(2)?),
        mention_count: row.get(3)?,
    })
}

fn row_to_mention(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mention> {
    Ok(Mention {
        id: row.get("id")?,
        doc_id: row.get("doc_id")?,
        entity_id: row.get("entity_id")?,
        context: row.get("context")?,
        created_at: row.get("created_at")?,
    })
}
