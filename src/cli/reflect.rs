//! CLI `reflect` command — run a reflection pass for one user immediately.

use anyhow::Result;

use crate::config::HsgConfig;

/// Run a reflection pass for `user_id` and print the resulting summary.
pub fn reflect(config: &HsgConfig, user_id: &str) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    match crate::memory::reflection::run_reflection(&conn, user_id)? {
        Some(summary) => println!("Summary for {user_id:?}:\n  {summary}"),
        None => println!("Not enough memories for {user_id:?} to reflect on yet."),
    }

    Ok(())
}
