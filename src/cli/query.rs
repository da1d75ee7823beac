//! CLI `query` command — run a retrieval query from the terminal.

use anyhow::Result;

use crate::config::HsgConfig;
use crate::embedding::router::EmbeddingRouter;
use crate::memory::retrieval::{hsg_query, QueryFilter};

/// Run an interactive HSG query from the terminal.
pub async fn query(config: &HsgConfig, text: &str, user_id: Option<&str>, k: usize) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;
    let router = EmbeddingRouter::new(config.router.clone())?;

    let sector = crate::sector::classify(text);
    let results = hsg_query(
        &conn,
        &router,
        text,
        sector,
        k,
        QueryFilter { user_id: user_id.map(String::from), sector: None },
        config.retrieval.base_threshold,
        config.retrieval.candidate_window,
        config.retrieval.decay_reinforce_on_query,
    )
    .await?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s), classified sector: {}\n", results.len(), sector.as_str());
    for (i, r) in results.iter().enumerate() {
        let preview: String = r.memory.content.chars().take(120).collect();
        println!(
            "  {}. [{}] {} (score: {:.4}, resonance: {:.3}, activation: {:.3})",
            i + 1,
            r.memory.primary_sector.as_str(),
            r.memory.id,
            r.score,
            r.cross_resonance_score,
            r.activation,
        );
        println!("     {preview}");
        println!();
    }

    Ok(())
}
