//! Per-user aggregates and profile management. Grounded in the teacher's
//! `memory/stats.rs` aggregation queries, re-scoped to a single tenant.

use super::types::{now_ms, UserProfile};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct UserStats {
    pub user_id: String,
    pub memory_count: i64,
    pub waypoint_count: i64,
    pub by_sector: HashMap<String, i64>,
    pub avg_salience: f64,
    pub oldest_created_at: Option<i64>,
    pub newest_created_at: Option<i64>,
}

pub fn get_user_profile(conn: &Connection, user_id: &str) -> Result<Option<UserProfile>> {
    let profile = conn
        .query_row(
            "SELECT user_id, summary, reflection_count, created_at, updated_at FROM users WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserProfile {
                    user_id: row.get(0)?,
                    summary: row.get(1)?,
                    reflection_count: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}

/// Inserts or updates a user's reflective summary, bumping `reflection_count`.
pub fn upsert_summary(conn: &Connection, user_id: &str, summary: &str) -> Result<()> {
    let now = now_ms();
    conn.execute(
        "INSERT INTO users (user_id, summary, reflection_count, created_at, updated_at) \
         VALUES (?1, ?2, 1, ?3, ?3) \
         ON CONFLICT(user_id) DO UPDATE SET summary = excluded.summary, \
         reflection_count = users.reflection_count + 1, updated_at = excluded.updated_at",
        params![user_id, summary, now],
    )?;
    Ok(())
}

/// Aggregate stats for one tenant (spec §6 `/users/:id`).
pub fn user_stats(conn: &Connection, user_id: &str) -> Result<UserStats> {
    let memory_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;
    let waypoint_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM waypoints WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;
    let avg_salience: Option<f64> = conn.query_row(
        "SELECT AVG(salience) FROM memories WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;
    let oldest: Option<i64> = conn.query_row(
        "SELECT MIN(created_at) FROM memories WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;
    let newest: Option<i64> = conn.query_row(
        "SELECT MAX(created_at) FROM memories WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;

    let mut by_sector = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT primary_sector, COUNT(*) FROM memories WHERE user_id = ?1 GROUP BY primary_sector",
    )?;
    let rows = stmt.query_map(params![user_id], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (sector, count) = row?;
        by_sector.insert(sector, count);
    }

    Ok(UserStats {
        user_id: user_id.to_string(),
        memory_count,
        waypoint_count,
        by_sector,
        avg_salience: avg_salience.unwrap_or(0.0),
        oldest_created_at: oldest,
        newest_created_at: newest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::memory::store::{add_memory, NewMemory};
    use crate::sector::Sector;
    use serde_json::Value as Json;

    #[test]
    fn upsert_summary_bumps_reflection_count() {
        let conn = open_memory_database().unwrap();
        upsert_summary(&conn, "u1", "first summary").unwrap();
        upsert_summary(&conn, "u1", "second summary").unwrap();
        let profile = get_user_profile(&conn, "u1").unwrap().unwrap();
        assert_eq!(profile.reflection_count, 2);
        assert_eq!(profile.summary.as_deref(), Some("second summary"));
    }

    #[test]
    fn user_stats_counts_memories_and_sectors() {
        let mut conn = open_memory_database().unwrap();
        add_memory(
            &mut conn,
            NewMemory {
                user_id: Some("u1"),
                content: "one",
                tags: vec![],
                metadata: Json::Null,
                primary_sector: Sector::Semantic,
                segment: 0,
            },
            &[(Sector::Semantic, crate::embedding::synthetic::gen_synth("one", Sector::Semantic, 64))],
        )
        .unwrap();

        let stats = user_stats(&conn, "u1").unwrap();
        assert_eq!(stats.memory_count, 1);
        assert_eq!(stats.by_sector.get("semantic"), Some(&1));
    }
}
