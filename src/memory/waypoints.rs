//! Waypoint graph (directed weighted edges). Grounded in the teacher's
//! `memory/relations.rs`, generalized from entity-only triples to edges
//! between any two memories sharing a `user_id`.

use super::types::now_ms;
use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Insert or update a waypoint `(src -> dst)`. Self-loops are rejected;
/// both memories must exist and share `user_id` (spec §3 invariants).
pub fn link(
    conn: &Connection,
    src_id: &str,
    dst_id: &str,
    user_id: Option<&str>,
    weight: f64,
) -> Result<()> {
    if src_id == dst_id {
        bail!("waypoint self-loops are disallowed");
    }
    if !(0.0..=1.0).contains(&weight) {
        bail!("waypoint weight {weight} out of range [0,1]");
    }

    let src_user: Option<String> = conn
        .query_row("SELECT user_id FROM memories WHERE id = ?1", params![src_id], |r| r.get(0))
        .optional()?
        .flatten();
    let dst_user: Option<String> = conn
        .query_row("SELECT user_id FROM memories WHERE id = ?1", params![dst_id], |r| r.get(0))
        .optional()?
        .flatten();

    if src_user.is_none() && conn.query_row("SELECT 1 FROM memories WHERE id = ?1", params![src_id], |_| Ok(())).optional()?.is_none() {
        bail!("source memory {src_id} does not exist");
    }
    if dst_user.is_none() && conn.query_row("SELECT 1 FROM memories WHERE id = ?1", params![dst_id], |_| Ok(())).optional()?.is_none() {
        bail!("destination memory {dst_id} does not exist");
    }
    if src_user.as_deref() != dst_user.as_deref() {
        bail!("waypoint endpoints must share user_id");
    }
    if user_id != src_user.as_deref() {
        bail!("waypoint user_id must match both endpoints");
    }

    let now = now_ms();
    conn.execute(
        "INSERT INTO waypoints (src_id, dst_id, user_id, weight, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
         ON CONFLICT(src_id, dst_id, user_id) DO UPDATE SET weight = excluded.weight, updated_at = excluded.updated_at",
        params![src_id, dst_id, user_id, weight, now],
    )?;
    Ok(())
}

pub struct Edge {
    pub dst_id: String,
    pub weight: f64,
}

/// Outgoing edges from `src_id`, used by spreading activation (C8).
pub fn outgoing(conn: &Connection, src_id: &str) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare("SELECT dst_id, weight FROM waypoints WHERE src_id = ?1")?;
    let rows = stmt
        .query_map(params![src_id], |r| {
            Ok(Edge {
                dst_id: r.get(0)?,
                weight: r.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
