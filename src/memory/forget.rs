//! Deletion: explicit delete and per-user wipe, cascading to vectors and
//! waypoints (spec §3 invariants). Grounded in the teacher's
//! `memory/forget.rs` per-transaction delete shape.

use anyhow::Result;
use rusqlite::{params, Connection};

/// Delete a single memory. Cascades to its vectors and every waypoint
/// where it is source or destination, inside one transaction.
pub fn delete_memory(conn: &mut Connection, id: &str) -> Result<bool> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM waypoints WHERE src_id = ?1 OR dst_id = ?1", params![id])?;
    tx.execute("DELETE FROM vectors WHERE memory_id = ?1", params![id])?;
    let affected = tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    tx.commit()?;
    if affected > 0 {
        tracing::info!(id = %id, "memory deleted");
    }
    Ok(affected > 0)
}

/// Delete every memory (and its vectors/waypoints) owned by `user_id`.
/// Requires an explicit `user_id` — there is no `_global` wipe entrypoint
/// in this crate's public API (spec §4.4 tenant scoping).
pub fn wipe_user(conn: &mut Connection, user_id: &str) -> Result<u64> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM waypoints WHERE user_id = ?1",
        params![user_id],
    )?;
    tx.execute("DELETE FROM vectors WHERE user_id = ?1", params![user_id])?;
    let affected = tx.execute("DELETE FROM memories WHERE user_id = ?1", params![user_id])?;
    tx.execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
    tx.commit()?;
    tracing::info!(user_id = %user_id, count = affected, "user memories wiped");
    Ok(affected as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::memory::store::{add_memory, get_memory, NewMemory};
    use crate::memory::waypoints::{link, outgoing};
    use crate::sector::Sector;
    use serde_json::Value as Json;

    fn add(conn: &mut Connection, user_id: Option<&str>, content: &str) -> String {
        add_memory(
            conn,
            NewMemory {
                user_id,
                content,
                tags: vec![],
                metadata: Json::Null,
                primary_sector: Sector::Semantic,
                segment: 0,
            },
            &[(Sector::Semantic, crate::embedding::synthetic::gen_synth(content, Sector::Semantic, 64))],
        )
        .unwrap()
        .id
    }

    #[test]
    fn delete_cascades_to_vectors_and_waypoints() {
        let mut conn = open_memory_database().unwrap();
        let a = add(&mut conn, Some("u1"), "root");
        let b = add(&mut conn, Some("u1"), "child");
        link(&conn, &a, &b, Some("u1"), 1.0).unwrap();

        assert!(delete_memory(&mut conn, &a).unwrap());

        assert!(get_memory(&conn, &a).unwrap().is_none());
        let vec_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vectors WHERE memory_id = ?1", params![a], |r| r.get(0))
            .unwrap();
        assert_eq!(vec_count, 0);
        assert!(outgoing(&conn, &a).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_memory_returns_false() {
        let mut conn = open_memory_database().unwrap();
        assert!(!delete_memory(&mut conn, "nonexistent").unwrap());
    }

    #[test]
    fn wipe_user_removes_only_that_tenant() {
        let mut conn = open_memory_database().unwrap();
        add(&mut conn, Some("u1"), "a");
        add(&mut conn, Some("u2"), "b");

        let removed = wipe_user(&mut conn, "u1").unwrap();
        assert_eq!(removed, 1);

        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0)).unwrap();
        assert_eq!(remaining, 1);
    }
}
