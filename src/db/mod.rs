pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the HSG database at the given path, with WAL mode,
/// foreign keys, and the schema/migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database for testing.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

#[derive(Debug)]
pub struct HealthReport {
    pub schema_version: i64,
    pub memory_count: i64,
    pub vector_count: i64,
    pub waypoint_count: i64,
    pub user_count: i64,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Run diagnostics and produce a health report, backing the `doctor` CLI
/// command (teacher: `cli/doctor.rs`).
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::current_version(conn)?;
    let memory_count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
    let vector_count: i64 = conn.query_row("SELECT COUNT(*) FROM vectors", [], |r| r.get(0))?;
    let waypoint_count: i64 = conn.query_row("SELECT COUNT(*) FROM waypoints", [], |r| r.get(0))?;
    let user_count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;

    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;
    let integrity_ok = integrity_details == "ok";

    Ok(HealthReport {
        schema_version,
        memory_count,
        vector_count,
        waypoint_count,
        user_count,
        integrity_ok,
        integrity_details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_check_on_fresh_db() {
        let conn = open_memory_database().unwrap();
        let report = check_database_health(&conn).unwrap();
        assert_eq!(report.memory_count, 0);
        assert!(report.integrity_ok);
        assert_eq!(report.schema_version, migrations::CURRENT_SCHEMA_VERSION);
    }
}
