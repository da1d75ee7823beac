//! CLI `ingest` command — ingest a local file or URL from the terminal.

use anyhow::Result;
use std::path::Path;

use crate::config::HsgConfig;
use crate::embedding::router::EmbeddingRouter;
use crate::memory::ingest::{ingest_document, ContentType, IngestRequest};

/// Ingest a local file or URL, printing the resulting root/child memory IDs.
pub async fn ingest(config: &HsgConfig, source: &str, user_id: Option<&str>) -> Result<()> {
    let db_path = config.resolved_db_path();
    let mut conn = crate::db::open_database(&db_path)?;
    let router = EmbeddingRouter::new(config.router.clone())?;

    let (content_type, data) = if source.starts_with("http://") || source.starts_with("https://") {
        (ContentType::Url, source.to_string())
    } else {
        let path = Path::new(source);
        let content_type = match path.extension().and_then(|e| e.to_str()) {
            Some("md") => ContentType::Markdown,
            _ => ContentType::Text,
        };
        (content_type, std::fs::read_to_string(path)?)
    };

    let result = ingest_document(
        &mut conn,
        &router,
        IngestRequest {
            content_type,
            data: &data,
            user_id,
            metadata: None,
        },
        &config.ingest,
    )
    .await?;

    println!("Ingested root memory: {}", result.root_id);
    if !result.child_ids.is_empty() {
        println!("Child memories ({}):", result.child_ids.len());
        for id in &result.child_ids {
            println!("  {id}");
        }
    }

    Ok(())
}
