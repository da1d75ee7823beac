//! CLI `reset` command — wipe one tenant's memories after confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use crate::config::HsgConfig;

/// Delete every memory, vector, and waypoint owned by `user_id` after an
/// interactive confirmation. There is no bare `reset` with no tenant — HSG
/// has no `_global` wipe entrypoint (spec §4.4 tenant scoping).
pub fn reset(config: &HsgConfig, user_id: &str) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("WARNING: This will permanently delete ALL memories, vectors, and waypoints for user {user_id:?}.");
    println!("Database: {}", db_path.display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    let mut conn = crate::db::open_database(&db_path)?;
    let removed = crate::memory::forget::wipe_user(&mut conn, user_id)?;

    println!("Deleted {removed} memories for user {user_id:?}.");
    Ok(())
}
