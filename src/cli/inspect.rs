//! CLI `inspect` command — display full details for a single memory.

use anyhow::{Context, Result};

use crate::config::HsgConfig;

/// Inspect a single memory by ID and display full details.
pub fn inspect(config: &HsgConfig, id: &str) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let memory = crate::memory::store::get_memory(&conn, id)?
        .with_context(|| format!("memory {id} not found"))?;

    println!("Memory: {}", memory.id);
    println!("{}", "=".repeat(50));
    println!("  User:           {}", memory.user_id.as_deref().unwrap_or("(none)"));
    println!("  Sector:         {}", memory.primary_sector.as_str());
    println!("  Salience:       {:.3}", memory.salience);
    println!("  Decay lambda:   {:.4}", memory.decay_lambda);
    println!("  Version:        {}", memory.version);
    println!("  Created:        {}", memory.created_at);
    println!("  Updated:        {}", memory.updated_at);
    println!("  Last seen:      {}", memory.last_seen_at);
    println!("  Feedback score: {:.3}", memory.feedback_score);
    if !memory.tags.is_empty() {
        println!("  Tags:           {}", memory.tags.join(", "));
    }
    if memory.metadata != serde_json::Value::Null {
        println!("  Metadata:       {}", serde_json::to_string_pretty(&memory.metadata)?);
    }
    println!();
    println!("Content:");
    println!("  {}", memory.summary.as_deref().unwrap_or(&memory.content));

    let outgoing = crate::memory::waypoints::outgoing(&conn, id)?;
    if !outgoing.is_empty() {
        println!();
        println!("Waypoints:");
        for edge in &outgoing {
            println!("  --[{:.2}]--> {}", edge.weight, edge.dst_id);
        }
    }

    Ok(())
}
