//! Ingestion pipeline (C6): extract, decide single-vs-root/child strategy,
//! chunk, embed, and store — with an SSRF guard on URL fetches. Grounded in
//! the teacher's CLI atomic-write idiom; chunking and the root/child shape
//! are spec-novel (spec §4.7).

use super::store::{add_memory, add_memory_in_tx, NewMemory};
use super::types::reserved_keys;
use super::waypoints::link;
use crate::config::IngestConfig;
use crate::embedding::router::EmbeddingRouter;
use crate::sector::{classify, Sector};
use anyhow::{bail, Result};
use rusqlite::Connection;
use serde_json::{json, Value as Json};
use std::net::{IpAddr, ToSocketAddrs};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
    Markdown,
    Url,
}

impl ContentType {
    /// Label used in the synthesized root-memory summary (spec §4.7.4a:
    /// `"[Document: TYPE]..."`).
    fn label(self) -> &'static str {
        match self {
            ContentType::Text => "TEXT",
            ContentType::Markdown => "MARKDOWN",
            ContentType::Url => "URL",
        }
    }
}

/// Raised when ingested content exceeds `max_payload_size` (spec §7, §8:
/// "content at exactly maxPayloadSize bytes succeeds; one byte over fails").
/// Server handlers downcast this out of the returned `anyhow::Error` to map
/// it onto `HsgError::PayloadTooLarge` / 413, the same seam `DimIncompatible`
/// uses in the embedding router.
#[derive(Debug, thiserror::Error)]
#[error("payload of {actual} bytes exceeds max_payload_size of {limit} bytes")]
pub struct PayloadTooLarge {
    pub actual: usize,
    pub limit: usize,
}

fn check_payload_size(text: &str, cfg: &IngestConfig) -> Result<()> {
    let actual = text.len();
    if actual > cfg.max_payload_size {
        return Err(PayloadTooLarge { actual, limit: cfg.max_payload_size }.into());
    }
    Ok(())
}

/// Raised when a URL ingestion target is rejected by the SSRF guard (spec
/// §4.7, §6: "4xx on SSRF-blocked hosts"). Downcast from the returned
/// `anyhow::Error` the same way `DimIncompatible`/`PayloadTooLarge` are.
#[derive(Debug, thiserror::Error)]
#[error("ssrf guard: {0}")]
pub struct SsrfBlocked(pub String);

pub struct IngestRequest<'a> {
    pub content_type: ContentType,
    pub data: &'a str,
    pub user_id: Option<&'a str>,
    pub metadata: Option<Json>,
}

pub struct IngestResult {
    pub root_id: String,
    pub child_ids: Vec<String>,
    /// `"single"` or `"root-child"` (spec §4.7 return contract).
    pub strategy: &'static str,
    pub child_count: usize,
    /// `{estimated_tokens, content_type}` from the extraction step (spec
    /// §4.7 step 1).
    pub extraction_meta: Json,
}

/// Builds the root memory's content per spec §4.7.4a:
/// `"[Document: TYPE]\n\n{summary<=500 chars}...\n\n[Full content split
/// across N sections]"`.
fn synthesize_root_content(content_type: ContentType, text: &str, total_sections: usize) -> String {
    let summary: String = text.chars().take(500).collect();
    format!(
        "[Document: {}]\n\n{summary}…\n\n[Full content split across {total_sections} sections]",
        content_type.label()
    )
}

/// Extracts raw text for the given content type. TXT/MD pass through
/// unchanged; URL is fetched over HTTP(S) behind [`guarded_fetch`]. PDF/DOCX
/// are intentionally unsupported here — see the `Extractor` trait below for
/// the pluggable seam a caller can implement against.
pub async fn extract(req: &IngestRequest<'_>, cfg: &IngestConfig) -> Result<String> {
    match req.content_type {
        ContentType::Text | ContentType::Markdown => Ok(req.data.to_string()),
        ContentType::Url => guarded_fetch(req.data, cfg).await,
    }
}

/// Pluggable extractor seam for binary formats (PDF/DOCX) this crate does
/// not parse directly.
pub trait Extractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_multicast()
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() || v6.is_unspecified() || v6.is_multicast() {
                return true;
            }
            let seg = v6.segments();
            // fc00::/7 (unique local)
            (seg[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link-local)
                || (seg[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Fetches `url`, rejecting non-http(s) schemes and any hostname that
/// resolves to a loopback, private, link-local, or multicast address
/// (spec §4.7 SSRF guard). Resolution failures fail closed.
async fn guarded_fetch(url: &str, cfg: &IngestConfig) -> Result<String> {
    let parsed = reqwest::Url::parse(url)?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(SsrfBlocked(format!("scheme {:?} is not allowed", parsed.scheme())).into());
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| SsrfBlocked("url has no host".to_string()))?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| SsrfBlocked(format!("dns resolution failed: {e}")))?
        .collect::<Vec<_>>();
    if addrs.is_empty() {
        return Err(SsrfBlocked(format!("host {host:?} resolved to no addresses")).into());
    }
    for addr in &addrs {
        if is_blocked_ip(addr.ip()) {
            return Err(SsrfBlocked(format!(
                "host {host:?} resolves to a disallowed address {}",
                addr.ip()
            ))
            .into());
        }
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
        .build()?;
    let resp = client.get(parsed).send().await?.error_for_status()?;

    if let Some(len) = resp.content_length() {
        if len as usize > cfg.max_payload_size {
            return Err(PayloadTooLarge { actual: len as usize, limit: cfg.max_payload_size }.into());
        }
    }
    let text = resp.text().await?;
    check_payload_size(&text, cfg)?;
    Ok(text)
}

/// Rough token estimate (chars/4) used only to decide ingestion strategy.
fn estimated_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Splits `text` into sections of at most `section_size` chars, preferring
/// paragraph boundaries (`\n\n`), falling back to word boundaries when a
/// single paragraph exceeds `section_size`.
pub fn chunk_sections(text: &str, section_size: usize) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if current.chars().count() + paragraph.chars().count() + 2 <= section_size {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            continue;
        }
        if !current.is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        if paragraph.chars().count() <= section_size {
            current = paragraph.to_string();
        } else {
            for word_chunk in chunk_by_words(paragraph, section_size) {
                sections.push(word_chunk);
            }
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }
    if sections.is_empty() {
        sections.push(text.to_string());
    }
    sections
}

fn chunk_by_words(text: &str, section_size: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > section_size && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Ingests a document: extracts text, decides single-vs-root/child strategy
/// against `ingest_large_threshold`, embeds each piece, and stores it
/// (spec §4.7). URL ingestion additionally records `source_url` on the
/// root/single memory's metadata.
pub async fn ingest_document(
    conn: &mut Connection,
    router: &EmbeddingRouter,
    req: IngestRequest<'_>,
    cfg: &IngestConfig,
) -> Result<IngestResult> {
    let source_url = matches!(req.content_type, ContentType::Url).then(|| req.data.to_string());
    let text = extract(&req, cfg).await?;
    if text.trim().is_empty() {
        bail!("ingested document has no extractable text");
    }
    if !matches!(req.content_type, ContentType::Url) {
        check_payload_size(&text, cfg)?;
    }

    let now = super::types::now_ms();
    let estimated = estimated_tokens(&text);
    let extraction_meta = json!({
        "estimated_tokens": estimated,
        "content_type": req.content_type.label(),
    });

    let mut base_meta = req.metadata.unwrap_or(Json::Null);
    if !base_meta.is_object() {
        base_meta = json!({});
    }
    if let Some(url) = &source_url {
        base_meta[reserved_keys::SOURCE_URL] = json!(url);
    }
    base_meta[reserved_keys::INGESTED_AT] = json!(now);

    if estimated <= cfg.ingest_large_threshold {
        let sector = classify(&text);
        let outcome = router.embed_for_sector(&text, sector).await?;
        let mut meta = base_meta;
        meta[reserved_keys::INGESTION_STRATEGY] = json!("single");
        let memory = add_memory(
            conn,
            NewMemory {
                user_id: req.user_id,
                content: &text,
                tags: vec![],
                metadata: meta,
                primary_sector: sector,
                segment: 0,
            },
            &[(sector, outcome.vector)],
        )?;
        return Ok(IngestResult {
            root_id: memory.id,
            child_ids: vec![],
            strategy: "single",
            child_count: 0,
            extraction_meta,
        });
    }

    let sections = chunk_sections(&text, cfg.ingest_section_size);
    let total = sections.len();

    let mut root_meta = base_meta.clone();
    root_meta[reserved_keys::IS_ROOT] = json!(true);
    root_meta[reserved_keys::TOTAL_SECTIONS] = json!(total);
    root_meta[reserved_keys::INGESTION_STRATEGY] = json!("root-child");
    let root_sector = Sector::Reflective;
    let root_content = synthesize_root_content(req.content_type, &text, total);
    let root_outcome = router.embed_for_sector(&root_content, root_sector).await?;

    // Root creation is its own transaction; each child+waypoint pair below
    // gets its own (spec §4.7 step 5). A failure partway through the
    // section loop leaves the root and any already-linked children
    // persisted, but never a child without its waypoint or a waypoint
    // without its child.
    let root_tx = conn.transaction()?;
    let root_id = add_memory_in_tx(
        &root_tx,
        NewMemory {
            user_id: req.user_id,
            content: &root_content,
            tags: vec![],
            metadata: root_meta,
            primary_sector: root_sector,
            segment: 0,
        },
        &[(root_sector, root_outcome.vector)],
    )?;
    root_tx.commit()?;

    let mut child_ids = Vec::with_capacity(total);
    for (i, section) in sections.iter().enumerate() {
        let sector = classify(section);
        let outcome = router.embed_for_sector(section, sector).await?;
        let mut meta = base_meta.clone();
        meta[reserved_keys::IS_CHILD] = json!(true);
        meta[reserved_keys::SECTION_INDEX] = json!(i);
        meta[reserved_keys::TOTAL_SECTIONS] = json!(total);
        meta[reserved_keys::PARENT_ID] = json!(root_id);

        let child_tx = conn.transaction()?;
        let child_id = add_memory_in_tx(
            &child_tx,
            NewMemory {
                user_id: req.user_id,
                content: section,
                tags: vec![],
                metadata: meta,
                primary_sector: sector,
                segment: (i + 1) as i64,
            },
            &[(sector, outcome.vector)],
        )?;
        link(&child_tx, &root_id, &child_id, req.user_id, 1.0)?;
        child_tx.commit()?;
        child_ids.push(child_id);
    }

    Ok(IngestResult {
        root_id,
        child_count: child_ids.len(),
        child_ids,
        strategy: "root-child",
        extraction_meta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::db::open_memory_database;

    fn router() -> EmbeddingRouter {
        let mut cfg = RouterConfig::default();
        cfg.tier = "fast".into();
        cfg.vector_dim = 64;
        EmbeddingRouter::new(cfg).unwrap()
    }

    #[test]
    fn chunk_sections_respects_paragraph_boundaries() {
        let text = "Para one is short.\n\nPara two is also short.\n\nPara three.";
        let sections = chunk_sections(text, 1000);
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn chunk_sections_splits_when_over_size() {
        let text = format!("{}\n\n{}", "a".repeat(50), "b".repeat(50));
        let sections = chunk_sections(&text, 60);
        assert!(sections.len() >= 2);
        for s in &sections {
            assert!(s.chars().count() <= 60 + 2);
        }
    }

    #[test]
    fn blocked_ip_detects_loopback_and_private() {
        assert!(is_blocked_ip("127.0.0.1".parse().unwrap()));
        assert!(is_blocked_ip("10.0.0.5".parse().unwrap()));
        assert!(is_blocked_ip("192.168.1.1".parse().unwrap()));
        assert!(is_blocked_ip("169.254.1.1".parse().unwrap()));
        assert!(is_blocked_ip("::1".parse().unwrap()));
        assert!(!is_blocked_ip("8.8.8.8".parse().unwrap()));
    }

    #[tokio::test]
    async fn guarded_fetch_rejects_non_http_scheme() {
        let cfg = IngestConfig::default();
        let err = guarded_fetch("file:///etc/passwd", &cfg).await.unwrap_err();
        assert!(err.downcast_ref::<SsrfBlocked>().is_some());
    }

    #[tokio::test]
    async fn guarded_fetch_rejects_loopback_host() {
        let cfg = IngestConfig::default();
        let err = guarded_fetch("http://127.0.0.1:9/", &cfg).await.unwrap_err();
        assert!(err.downcast_ref::<SsrfBlocked>().is_some());
    }

    #[test]
    fn payload_at_exactly_the_limit_succeeds() {
        let cfg = IngestConfig { max_payload_size: 10, ..IngestConfig::default() };
        assert!(check_payload_size(&"a".repeat(10), &cfg).is_ok());
    }

    #[test]
    fn payload_one_byte_over_the_limit_fails() {
        let cfg = IngestConfig { max_payload_size: 10, ..IngestConfig::default() };
        let err = check_payload_size(&"a".repeat(11), &cfg).unwrap_err();
        assert!(err.downcast_ref::<PayloadTooLarge>().is_some());
    }

    #[tokio::test]
    async fn oversized_document_is_rejected_with_payload_too_large() {
        let mut conn = open_memory_database().unwrap();
        let router = router();
        let cfg = IngestConfig { max_payload_size: 5, ..IngestConfig::default() };
        let res = ingest_document(
            &mut conn,
            &router,
            IngestRequest {
                content_type: ContentType::Text,
                data: "this text is definitely over five bytes",
                user_id: None,
                metadata: None,
            },
            &cfg,
        )
        .await;
        let err = res.unwrap_err();
        assert!(err.downcast_ref::<PayloadTooLarge>().is_some());
    }

    #[tokio::test]
    async fn small_document_uses_single_strategy() {
        let mut conn = open_memory_database().unwrap();
        let router = router();
        let cfg = IngestConfig::default();
        let result = ingest_document(
            &mut conn,
            &router,
            IngestRequest {
                content_type: ContentType::Text,
                data: "a short note",
                user_id: Some("u1"),
                metadata: None,
            },
            &cfg,
        )
        .await
        .unwrap();
        assert!(result.child_ids.is_empty());
    }

    #[tokio::test]
    async fn large_document_uses_root_child_strategy() {
        let mut conn = open_memory_database().unwrap();
        let router = router();
        let mut cfg = IngestConfig::default();
        cfg.ingest_large_threshold = 5;
        cfg.ingest_section_size = 40;

        let text = "This is paragraph number one with several words in it.\n\n\
                    This is paragraph number two with several words as well.\n\n\
                    This is paragraph number three to push it over the threshold.";

        let result = ingest_document(
            &mut conn,
            &router,
            IngestRequest {
                content_type: ContentType::Text,
                data: text,
                user_id: Some("u1"),
                metadata: None,
            },
            &cfg,
        )
        .await
        .unwrap();

        assert!(!result.child_ids.is_empty());
        let root = crate::memory::store::get_memory(&conn, &result.root_id).unwrap().unwrap();
        assert_eq!(root.metadata[reserved_keys::IS_ROOT], json!(true));
        for child_id in &result.child_ids {
            let child = crate::memory::store::get_memory(&conn, child_id).unwrap().unwrap();
            assert_eq!(child.metadata[reserved_keys::PARENT_ID], json!(result.root_id));
        }
    }

    #[tokio::test]
    async fn rejects_empty_text() {
        let mut conn = open_memory_database().unwrap();
        let router = router();
        let cfg = IngestConfig::default();
        let res = ingest_document(
            &mut conn,
            &router,
            IngestRequest {
                content_type: ContentType::Text,
                data: "   ",
                user_id: None,
                metadata: None,
            },
            &cfg,
        )
        .await;
        assert!(res.is_err());
    }
}
