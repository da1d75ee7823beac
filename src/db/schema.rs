//! Physical schema (SQLite realization of the logical tables in spec §4.4).

use anyhow::{Context, Result};
use rusqlite::Connection;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id              TEXT PRIMARY KEY,
    user_id         TEXT,
    segment         INTEGER NOT NULL DEFAULT 0,
    content         TEXT NOT NULL,
    primary_sector  TEXT NOT NULL CHECK (primary_sector IN ('episodic','semantic','procedural','emotional','reflective')),
    tags            TEXT NOT NULL DEFAULT '[]',
    meta            TEXT NOT NULL DEFAULT '{}',
    salience        REAL NOT NULL DEFAULT 0.5 CHECK (salience >= 0.0 AND salience <= 1.0),
    decay_lambda    REAL NOT NULL DEFAULT 1.0,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    last_seen_at    INTEGER NOT NULL,
    version         INTEGER NOT NULL DEFAULT 1,
    summary         TEXT,
    feedback_score  REAL NOT NULL DEFAULT 0.0
);

CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);
CREATE INDEX IF NOT EXISTS idx_memories_user_sector ON memories(user_id, primary_sector);
CREATE INDEX IF NOT EXISTS idx_memories_last_seen ON memories(last_seen_at);

CREATE TABLE IF NOT EXISTS vectors (
    memory_id   TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    sector      TEXT NOT NULL CHECK (sector IN ('episodic','semantic','procedural','emotional','reflective')),
    user_id     TEXT,
    vec_blob    BLOB NOT NULL,
    dim         INTEGER NOT NULL,
    PRIMARY KEY (memory_id, sector, user_id)
);

CREATE INDEX IF NOT EXISTS idx_vectors_user_sector ON vectors(user_id, sector);

CREATE TABLE IF NOT EXISTS waypoints (
    src_id      TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    dst_id      TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    user_id     TEXT,
    weight      REAL NOT NULL CHECK (weight >= 0.0 AND weight <= 1.0),
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (src_id, dst_id, user_id),
    CHECK (src_id != dst_id)
);

CREATE INDEX IF NOT EXISTS idx_waypoints_src ON waypoints(src_id);
CREATE INDEX IF NOT EXISTS idx_waypoints_dst ON waypoints(dst_id);

CREATE TABLE IF NOT EXISTS embed_logs (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    status      TEXT NOT NULL CHECK (status IN ('pending','completed','failed')),
    created_at  INTEGER NOT NULL,
    error       TEXT
);

CREATE TABLE IF NOT EXISTS users (
    user_id             TEXT PRIMARY KEY,
    summary             TEXT,
    reflection_count    INTEGER NOT NULL DEFAULT 0,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key     TEXT PRIMARY KEY,
    value   TEXT NOT NULL
);
"#;

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)
        .context("failed to initialize schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        for expected in ["memories", "vectors", "waypoints", "embed_logs", "users", "schema_meta"] {
            assert!(names.iter().any(|n| n == expected), "missing table {expected}");
        }
    }

    #[test]
    fn rejects_bad_sector() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let res = conn.execute(
            "INSERT INTO memories (id, primary_sector, content, created_at, updated_at, last_seen_at) \
             VALUES ('a', 'bogus', 'x', 0, 0, 0)",
            [],
        );
        assert!(res.is_err());
    }

    #[test]
    fn rejects_self_loop_waypoint() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO memories (id, primary_sector, content, created_at, updated_at, last_seen_at) \
             VALUES ('a', 'semantic', 'x', 0, 0, 0)",
            [],
        )
        .unwrap();
        let res = conn.execute(
            "INSERT INTO waypoints (src_id, dst_id, user_id, weight, created_at, updated_at) \
             VALUES ('a', 'a', NULL, 1.0, 0, 0)",
            [],
        );
        assert!(res.is_err());
    }
}
