//! CLI `decay` command — run one decay/compression sweep immediately.

use anyhow::Result;
use std::sync::atomic::AtomicUsize;

use crate::config::HsgConfig;

/// Run a single decay sweep over the whole database and print the resulting
/// stats. Unlike the server's background loop, this always runs (no
/// `active_queries` quiescence gate to wait on from a one-shot CLI).
pub async fn decay(config: &HsgConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let active_queries = AtomicUsize::new(0);
    let now = crate::memory::types::now_ms();
    let stats = crate::memory::decay::run_sweep(
        &conn,
        config.decay.page_size as i64,
        config.decay.yield_every as u64,
        config.router.min_vec_dim,
        now,
        &active_queries,
    )
    .await?;

    println!("Decay sweep complete");
    println!("  Scanned:      {}", stats.scanned);
    println!("  Changed:      {}", stats.changed);
    println!("  Compressed:   {}", stats.compressed);
    println!("  Fingerprinted:{}", stats.fingerprinted);

    Ok(())
}
