//! CLI `stats` command — display per-user aggregate statistics.

use anyhow::Result;

use crate::config::HsgConfig;

/// Display memory statistics for one tenant in the terminal.
pub fn stats(config: &HsgConfig, user_id: &str) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let stats = crate::memory::users::user_stats(&conn, user_id)?;
    let profile = crate::memory::users::get_user_profile(&conn, user_id)?;

    println!("Memory Statistics for {user_id:?}");
    println!("{}", "=".repeat(40));
    println!("  Memories:            {}", stats.memory_count);
    println!("  Waypoints:           {}", stats.waypoint_count);
    println!("  Average salience:    {:.3}", stats.avg_salience);
    println!();

    println!("By sector:");
    for sector in crate::sector::ALL_SECTORS {
        let count = stats.by_sector.get(sector.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", sector.as_str(), count);
    }
    println!();

    if let Some(oldest) = stats.oldest_created_at {
        println!("Oldest memory:         {oldest}");
    }
    if let Some(newest) = stats.newest_created_at {
        println!("Newest memory:         {newest}");
    }

    match profile {
        Some(p) => {
            println!();
            println!("Reflections run:       {}", p.reflection_count);
            if let Some(summary) = p.summary {
                println!("Latest summary:        {summary}");
            }
        }
        None => println!("\nNo reflective summary yet — run `hsg reflect {user_id}`."),
    }

    Ok(())
}
