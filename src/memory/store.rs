//! Storage layer (C4): transactional writes and reads for the `memories`
//! and `vectors` tables. Grounded in the teacher's `memory/store.rs`
//! transactional write path (dedup/supersession dropped — no counterpart
//! in this data model).

use super::types::{new_id, now_ms, Memory};
use crate::sector::Sector;
use crate::vector::to_blob;
use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as Json;

pub struct NewMemory<'a> {
    pub user_id: Option<&'a str>,
    pub content: &'a str,
    pub tags: Vec<String>,
    pub metadata: Json,
    pub primary_sector: Sector,
    pub segment: i64,
}

/// Inserts a memory plus its per-sector vectors using `conn`, which may be a
/// plain `Connection` or a `rusqlite::Transaction` (it derefs to
/// `Connection`) already opened by the caller. Does not commit — callers
/// that need atomicity across several inserts (e.g. ingestion's root+child+
/// waypoint writes) open one transaction and call this once per memory.
fn insert_memory(conn: &Connection, new: &NewMemory, vectors: &[(Sector, Vec<f32>)]) -> Result<String> {
    if new.content.is_empty() {
        bail!("content must not be empty");
    }
    if vectors.is_empty() {
        bail!("at least one sector vector is required before a memory becomes visible");
    }

    let id = new_id();
    let now = now_ms();
    let tags_json = serde_json::to_string(&new.tags)?;
    let meta_json = serde_json::to_string(&new.metadata)?;

    conn.execute(
        "INSERT INTO memories (id, user_id, segment, content, primary_sector, tags, meta, \
         salience, decay_lambda, created_at, updated_at, last_seen_at, version) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0.5, 1.0, ?8, ?8, ?8, 1)",
        params![
            id,
            new.user_id,
            new.segment,
            new.content,
            new.primary_sector.as_str(),
            tags_json,
            meta_json,
            now
        ],
    )?;

    for (sector, vec) in vectors {
        let blob = to_blob(vec);
        conn.execute(
            "INSERT INTO vectors (memory_id, sector, user_id, vec_blob, dim) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, sector.as_str(), new.user_id, blob, vec.len() as i64],
        )?;
    }

    conn.execute(
        "INSERT INTO embed_logs (id, kind, status, created_at) VALUES (?1, 'add_memory', 'completed', ?2)",
        params![new_id(), now],
    )?;

    tracing::debug!(id = %id, user_id = ?new.user_id, "memory added");
    Ok(id)
}

/// Insert a memory plus its per-sector vectors inside a single transaction
/// — the memory is never visible to retrieval without its embeddings
/// (spec §3 Lifecycle, §5 ordering guarantees).
pub fn add_memory(
    conn: &mut Connection,
    new: NewMemory,
    vectors: &[(Sector, Vec<f32>)],
) -> Result<Memory> {
    let tx = conn.transaction()?;
    let id = insert_memory(&tx, &new, vectors)?;
    tx.commit()?;

    get_memory(conn, &id)?.ok_or_else(|| anyhow::anyhow!("memory {id} vanished after insert"))
}

/// Insert a memory using an already-open transaction; the caller commits.
/// Used by ingestion so the root (or a child+waypoint pair) writes as one
/// atomic unit (spec §4.7 step 5, §7 "no partial persistence").
pub fn add_memory_in_tx(
    tx: &rusqlite::Transaction,
    new: NewMemory,
    vectors: &[(Sector, Vec<f32>)],
) -> Result<String> {
    insert_memory(tx, &new, vectors)
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let tags_json: String = row.get("tags")?;
    let meta_json: String = row.get("meta")?;
    let sector_str: String = row.get("primary_sector")?;
    Ok(Memory {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        segment: row.get("segment")?,
        content: row.get("content")?,
        primary_sector: sector_str
            .parse()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        metadata: serde_json::from_str(&meta_json).unwrap_or(Json::Null),
        salience: row.get("salience")?,
        decay_lambda: row.get("decay_lambda")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        last_seen_at: row.get("last_seen_at")?,
        version: row.get("version")?,
        summary: row.get("summary")?,
        feedback_score: row.get("feedback_score")?,
    })
}

const MEMORY_COLUMNS: &str = "id, user_id, segment, content, primary_sector, tags, meta, \
     salience, decay_lambda, created_at, updated_at, last_seen_at, version, summary, feedback_score";

pub fn get_memory(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
    let memory = conn
        .query_row(&sql, params![id], row_to_memory)
        .optional()?;
    Ok(memory)
}

/// List memories scoped by `user_id` and optionally filtered by sector,
/// with `(limit, offset)` pagination (spec §4.4).
pub fn list_memories(
    conn: &Connection,
    user_id: Option<&str>,
    sector: Option<Sector>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Memory>> {
    let limit = limit.clamp(1, 1000);
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories \
         WHERE (user_id = ?1 OR (?1 IS NULL AND user_id IS NULL)) \
         AND (?2 IS NULL OR primary_sector = ?2) \
         ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![user_id, sector.map(|s| s.as_str()), limit, offset],
            row_to_memory,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Content update: bumps `version` and `updated_at`. Callers that change
/// `content` MUST re-embed and pass the fresh vectors — old vectors for
/// touched sectors are replaced in the same transaction so the new
/// version and its vectors commit atomically (spec §5 ordering
/// guarantees).
pub fn update_memory(
    conn: &mut Connection,
    id: &str,
    new_content: Option<&str>,
    new_tags: Option<Vec<String>>,
    new_metadata: Option<Json>,
    new_vectors: &[(Sector, Vec<f32>)],
) -> Result<Memory> {
    let now = now_ms();
    let tx = conn.transaction()?;

    if let Some(content) = new_content {
        tx.execute(
            "UPDATE memories SET content = ?1, version = version + 1, updated_at = ?2 WHERE id = ?3",
            params![content, now, id],
        )?;
    }
    if let Some(tags) = &new_tags {
        let tags_json = serde_json::to_string(tags)?;
        tx.execute(
            "UPDATE memories SET tags = ?1, updated_at = ?2 WHERE id = ?3",
            params![tags_json, now, id],
        )?;
    }
    if let Some(meta) = &new_metadata {
        let meta_json = serde_json::to_string(meta)?;
        tx.execute(
            "UPDATE memories SET meta = ?1, updated_at = ?2 WHERE id = ?3",
            params![meta_json, now, id],
        )?;
    }
    for (sector, vec) in new_vectors {
        let blob = to_blob(vec);
        let user_id: Option<String> = tx
            .query_row("SELECT user_id FROM memories WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?
            .flatten();
        tx.execute(
            "INSERT INTO vectors (memory_id, sector, user_id, vec_blob, dim) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(memory_id, sector, user_id) DO UPDATE SET vec_blob = excluded.vec_blob, dim = excluded.dim",
            params![id, sector.as_str(), user_id, blob, vec.len() as i64],
        )?;
    }
    let rows_touched = tx.changes();
    tx.commit()?;
    if rows_touched == 0 && new_content.is_none() && new_tags.is_none() && new_metadata.is_none() && new_vectors.is_empty() {
        bail!("update_memory called with no changes");
    }

    get_memory(conn, id)?.ok_or_else(|| anyhow::anyhow!("memory {id} not found"))
}

/// Raise salience toward 1 (spec §4.8 / DESIGN.md Open Question #1):
/// `salience' = min(1, salience + eta*(1-salience))`.
pub const REINFORCE_ETA: f64 = 0.18;

pub fn reinforce(salience: f64, eta: f64) -> f64 {
    (salience + eta * (1.0 - salience)).clamp(0.0, 1.0)
}

pub fn reinforce_memory(conn: &Connection, id: &str, eta: f64) -> Result<Option<f64>> {
    let current: Option<f64> = conn
        .query_row("SELECT salience FROM memories WHERE id = ?1", params![id], |r| r.get(0))
        .optional()?;
    let Some(current) = current else {
        return Ok(None);
    };
    let updated = reinforce(current, eta);
    let now = now_ms();
    conn.execute(
        "UPDATE memories SET salience = ?1, last_seen_at = ?2, updated_at = ?2 WHERE id = ?3",
        params![updated, now, id],
    )?;
    Ok(Some(updated))
}
