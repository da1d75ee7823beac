//! Forward-only migration framework, following the teacher's
//! `schema_meta`-backed version tracking.

use anyhow::{Context, Result};
use rusqlite::Connection;

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version = current_version(conn)?;
    if version > CURRENT_SCHEMA_VERSION {
        anyhow::bail!(
            "database schema version {version} is newer than this binary supports ({CURRENT_SCHEMA_VERSION})"
        );
    }
    // No migration steps yet beyond the v1 baseline created by `init_schema`.
    set_version(conn, CURRENT_SCHEMA_VERSION).context("failed to record schema version")?;
    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .map(|v| v.parse().unwrap_or(0))
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(0),
        other => Err(other.into()),
    })
}

fn set_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}
