//! CLI `doctor` command — run database diagnostics and print a health report.

use anyhow::{Context, Result};

use crate::config::HsgConfig;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &HsgConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `hsg serve` to initialize it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = crate::db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = crate::db::check_database_health(&conn).context("failed to run health check")?;

    println!("HSG Health Report");
    println!("=================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", super::format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Memories:        {}", report.memory_count);
    println!("  Vectors:         {}", report.vector_count);
    println!("  Waypoints:       {}", report.waypoint_count);
    println!("  Users:           {}", report.user_count);
    println!();
    println!("Router tier:       {}", config.router.tier);
    println!("Vector dim:        {}", config.router.vector_dim);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }

    Ok(())
}
