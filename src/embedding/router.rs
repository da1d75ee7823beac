//! Embedding router (C3): tier policy, fusion with the synthetic embedder,
//! dimension reconciliation, provider fallback, retries, and a TTL-cached
//! per-sector routing decision — grounded in the teacher's single-provider
//! `EmbeddingProvider` abstraction and `mattepiu-drift`'s degradation-chain
//! / Matryoshka-truncation design.

use super::{create_provider, fuse_concat, EmbeddingProvider};
use crate::config::RouterConfig;
use crate::sector::Sector;
use crate::vector::{compress, resize};
use anyhow::Result;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

const SEMANTIC_COMPRESS_DIM: usize = 128;
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Raised when a provider's raw dimension differs from `vector_dim` by more
/// than 50% and `router_fallback_enabled` is false (spec §4.3, §7
/// `DIM_INCOMPATIBLE`). Server handlers downcast this out of the returned
/// `anyhow::Error` to map it onto `HsgError::DimIncompatible`.
#[derive(Debug, thiserror::Error)]
#[error("embedding dimension incompatible: relative mismatch {0:.3} exceeds the fallback threshold")]
pub struct DimIncompatible(pub f64);

struct CachedDecision {
    provider_name: &'static str,
    cached_at: Instant,
}

/// Outcome of a single embedding call, used by the storage layer to decide
/// the `embed_logs` row status.
pub struct EmbedOutcome {
    pub vector: Vec<f32>,
    /// Set when the result is the synthetic fallback rather than the
    /// configured provider's own output.
    pub fell_back: bool,
}

pub struct EmbeddingRouter {
    provider: Box<dyn EmbeddingProvider>,
    cfg: RouterConfig,
    decision_cache: StdMutex<HashMap<usize, CachedDecision>>,
}

impl EmbeddingRouter {
    pub fn new(cfg: RouterConfig) -> Result<Self> {
        let provider = create_provider(&cfg)?;
        Ok(Self {
            provider,
            cfg,
            decision_cache: StdMutex::new(HashMap::new()),
        })
    }

    pub fn with_provider(cfg: RouterConfig, provider: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            cfg,
            decision_cache: StdMutex::new(HashMap::new()),
        }
    }

    pub fn dim(&self) -> usize {
        self.cfg.vector_dim
    }

    /// Record (and TTL-cache) which provider served a sector. Cheap but
    /// demonstrates the cached-decision seam the spec calls for; more
    /// consequential once multiple router_cpu models are routed by sector.
    fn record_decision(&self, sector: Sector, provider_name: &'static str) {
        let mut cache = self.decision_cache.lock().unwrap();
        cache.insert(
            sector.index(),
            CachedDecision {
                provider_name,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn cached_decision(&self, sector: Sector) -> Option<&'static str> {
        let cache = self.decision_cache.lock().unwrap();
        let ttl = Duration::from_millis(self.cfg.router_cache_ttl_ms);
        cache.get(&sector.index()).and_then(|d| {
            if d.cached_at.elapsed() < ttl {
                Some(d.provider_name)
            } else {
                None
            }
        })
    }

    /// `embed_for_sector(text, sector) -> [f32; D]` (spec §4.3).
    pub async fn embed_for_sector(&self, text: &str, sector: Sector) -> Result<EmbedOutcome> {
        let d = self.cfg.vector_dim;
        match self.cfg.tier.as_str() {
            "fast" => {
                self.record_decision(sector, "synthetic");
                Ok(EmbedOutcome {
                    vector: super::synthetic::gen_synth(text, sector, d),
                    fell_back: false,
                })
            }
            "semantic" => {
                let synth = super::synthetic::gen_synth(text, sector, d);
                match self.call_with_retry(text, sector).await {
                    Ok(raw) => {
                        self.record_decision(sector, self.provider.name());
                        self.reconcile(raw, &synth)
                    }
                    Err(e) => {
                        tracing::warn!(sector = %sector, error = %e, "embedding provider failed");
                        Err(e)
                    }
                }
            }
            _ => self.embed_hybrid(text, sector, &synth_for(text, sector, d)).await,
        }
    }

    async fn embed_hybrid(&self, text: &str, sector: Sector, synth: &[f32]) -> Result<EmbedOutcome> {
        if !self.cfg.hybrid_fusion {
            self.record_decision(sector, "synthetic");
            return Ok(EmbedOutcome {
                vector: synth.to_vec(),
                fell_back: false,
            });
        }
        match self.call_with_retry(text, sector).await {
            Ok(raw) => {
                self.record_decision(sector, self.provider.name());
                let reconciled = match self.reconcile(raw, synth) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(sector = %sector, error = %e, "dimension incompatible in hybrid tier, using synthetic");
                        self.record_decision(sector, "synthetic");
                        return Ok(EmbedOutcome {
                            vector: synth.to_vec(),
                            fell_back: true,
                        });
                    }
                };
                if reconciled.fell_back {
                    return Ok(reconciled);
                }
                let sem_compressed = if reconciled.vector.len() >= SEMANTIC_COMPRESS_DIM {
                    compress(&reconciled.vector, SEMANTIC_COMPRESS_DIM)?
                } else {
                    resize(&reconciled.vector, SEMANTIC_COMPRESS_DIM)
                };
                let (wa, wb) = sector.fusion_weights();
                Ok(EmbedOutcome {
                    vector: fuse_concat(synth, &sem_compressed, wa, wb),
                    fell_back: false,
                })
            }
            Err(e) => {
                tracing::warn!(sector = %sector, error = %e, "embedding provider failed, using synthetic");
                self.record_decision(sector, "synthetic");
                Ok(EmbedOutcome {
                    vector: synth.to_vec(),
                    fell_back: true,
                })
            }
        }
    }

    async fn call_with_retry(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        let mut delay = BACKOFF_BASE;
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.provider.embed(text, sector).await {
                Ok(v) if !v.is_empty() => return Ok(v),
                Ok(_) => {
                    last_err = Some(anyhow::anyhow!("provider returned an empty vector"));
                }
                Err(e) => last_err = Some(e),
            }
            if attempt + 1 < MAX_RETRIES {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("provider call failed")))
    }

    /// Dimension reconciliation (spec §4.3, with the `0.1 < r <= 0.5` gap
    /// resolved per DESIGN.md Open Question #3). Returns `Err(DimIncompatible)`
    /// when `r > 0.5` and fallback is disabled; callers that want a soft
    /// degrade (the hybrid tier) catch that and fall back to synthetic
    /// themselves, while the `semantic` tier propagates it as a hard failure.
    fn reconcile(&self, raw: Vec<f32>, synth: &[f32]) -> Result<EmbedOutcome> {
        let d = self.cfg.vector_dim as f64;
        let n = raw.len() as f64;
        let r = (n - d).abs() / d;

        if r > 0.5 {
            if self.cfg.router_fallback_enabled {
                tracing::warn!(r, dim = raw.len(), target = self.cfg.vector_dim, "dimension incompatible, falling back to synthetic");
                return Ok(EmbedOutcome {
                    vector: synth.to_vec(),
                    fell_back: true,
                });
            }
            tracing::error!(r, dim = raw.len(), target = self.cfg.vector_dim, "dimension incompatible, fallback disabled");
            return Err(DimIncompatible(r).into());
        }

        if r > self.cfg.router_dim_tolerance {
            tracing::warn!(r, dim = raw.len(), target = self.cfg.vector_dim, "resizing outside tolerance");
        }
        Ok(EmbedOutcome {
            vector: resize(&raw, self.cfg.vector_dim),
            fell_back: false,
        })
    }

    /// Multi-sector embedding (spec §4.3): writes a `pending` `embed_logs`
    /// row, embeds one vector per requested sector (optionally aggregating
    /// pre-chunked text per-dim mean, then L2-normalize), and updates the
    /// log to `completed` on success. After three successive sector
    /// failures the log is marked `failed` with the error string and the
    /// error is raised.
    pub async fn embed_multi_sector(
        &self,
        conn: &Connection,
        text: &str,
        sectors: &[Sector],
        chunks: Option<&[String]>,
    ) -> Result<Vec<(Sector, EmbedOutcome)>> {
        let log_id = crate::memory::types::new_id();
        let now = crate::memory::types::now_ms();
        conn.execute(
            "INSERT INTO embed_logs (id, kind, status, created_at) VALUES (?1, 'multi_sector', 'pending', ?2)",
            params![log_id, now],
        )?;

        let mut out = Vec::with_capacity(sectors.len());
        let mut successive_failures = 0u32;
        for (i, &sector) in sectors.iter().enumerate() {
            if i > 0 && self.cfg.embed_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.cfg.embed_delay_ms)).await;
            }
            let attempt = if let Some(chunks) = chunks.filter(|c| c.len() > 1) {
                self.embed_aggregated(chunks, sector).await
            } else {
                self.embed_for_sector(text, sector).await
            };
            match attempt {
                Ok(outcome) => {
                    successive_failures = 0;
                    out.push((sector, outcome));
                }
                Err(e) => {
                    successive_failures += 1;
                    if successive_failures >= 3 {
                        let err_msg = e.to_string();
                        conn.execute(
                            "UPDATE embed_logs SET status = 'failed', error = ?1 WHERE id = ?2",
                            params![err_msg, log_id],
                        )?;
                        return Err(e);
                    }
                }
            }
        }

        conn.execute("UPDATE embed_logs SET status = 'completed' WHERE id = ?1", params![log_id])?;
        Ok(out)
    }

    async fn embed_aggregated(&self, chunks: &[String], sector: Sector) -> Result<EmbedOutcome> {
        let mut sum: Vec<f32> = Vec::new();
        let mut any_fallback = false;
        for chunk in chunks {
            let outcome = self.embed_for_sector(chunk, sector).await?;
            any_fallback |= outcome.fell_back;
            if sum.is_empty() {
                sum = vec![0.0f32; outcome.vector.len()];
            }
            for (acc, v) in sum.iter_mut().zip(outcome.vector.iter()) {
                *acc += v;
            }
        }
        let n = chunks.len().max(1) as f32;
        for x in sum.iter_mut() {
            *x /= n;
        }
        crate::vector::normalize(&mut sum);
        Ok(EmbedOutcome {
            vector: sum,
            fell_back: any_fallback,
        })
    }
}

fn synth_for(text: &str, sector: Sector, dim: usize) -> Vec<f32> {
    super::synthetic::gen_synth(text, sector, dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::providers::SyntheticProvider;
    use crate::vector::l2_norm;
    use async_trait::async_trait;

    struct FixedDimProvider {
        dim: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedDimProvider {
        async fn embed(&self, _text: &str, _sector: Sector) -> Result<Vec<f32>> {
            Ok(vec![1.0; self.dim])
        }
        fn dimensions(&self) -> usize {
            self.dim
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn cfg(tier: &str, vector_dim: usize) -> RouterConfig {
        let mut c = RouterConfig::default();
        c.tier = tier.to_string();
        c.vector_dim = vector_dim;
        c
    }

    #[tokio::test]
    async fn fast_tier_returns_synthetic() {
        let router = EmbeddingRouter::with_provider(cfg("fast", 64), Box::new(SyntheticProvider::new(64)));
        let out = router.embed_for_sector("hello", Sector::Semantic).await.unwrap();
        assert_eq!(out.vector.len(), 64);
        assert!(!out.fell_back);
    }

    #[tokio::test]
    async fn dimension_mismatch_over_half_falls_back_to_synthetic() {
        let mut c = cfg("semantic", 256);
        c.router_fallback_enabled = true;
        let router = EmbeddingRouter::with_provider(c, Box::new(FixedDimProvider { dim: 512 }));
        let out = router.embed_for_sector("hello", Sector::Semantic).await.unwrap();
        assert!(out.fell_back);
        assert_eq!(out.vector.len(), 256);
    }

    #[tokio::test]
    async fn semantic_tier_hard_fails_when_fallback_disabled() {
        let mut c = cfg("semantic", 256);
        c.router_fallback_enabled = false;
        let router = EmbeddingRouter::with_provider(c, Box::new(FixedDimProvider { dim: 512 }));
        let err = router.embed_for_sector("hello", Sector::Semantic).await.unwrap_err();
        assert!(err.downcast_ref::<DimIncompatible>().is_some());
    }

    #[tokio::test]
    async fn hybrid_tier_falls_back_instead_of_hard_failing() {
        let mut c = cfg("hybrid", 256);
        c.router_fallback_enabled = false;
        let router = EmbeddingRouter::with_provider(c, Box::new(FixedDimProvider { dim: 512 }));
        let out = router.embed_for_sector("hello", Sector::Episodic).await.unwrap();
        assert!(out.fell_back);
        assert_eq!(out.vector.len(), 256);
    }

    #[tokio::test]
    async fn small_dimension_mismatch_resizes_without_fallback() {
        let c = cfg("semantic", 256);
        let router = EmbeddingRouter::with_provider(c, Box::new(FixedDimProvider { dim: 260 }));
        let out = router.embed_for_sector("hello", Sector::Semantic).await.unwrap();
        assert!(!out.fell_back);
        assert_eq!(out.vector.len(), 256);
    }

    #[tokio::test]
    async fn hybrid_tier_fuses_and_is_unit_length() {
        let c = cfg("hybrid", 256);
        let router = EmbeddingRouter::with_provider(c, Box::new(FixedDimProvider { dim: 256 }));
        let out = router.embed_for_sector("hello world", Sector::Episodic).await.unwrap();
        assert_eq!(out.vector.len(), 256 + 128);
        assert!((l2_norm(&out.vector) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn decision_cache_records_provider() {
        let router = EmbeddingRouter::with_provider(cfg("fast", 64), Box::new(SyntheticProvider::new(64)));
        let _ = router.embed_for_sector("hello", Sector::Semantic).await.unwrap();
        assert_eq!(router.cached_decision(Sector::Semantic), Some("synthetic"));
    }

    #[tokio::test]
    async fn multi_sector_embedding_writes_pending_then_completed() {
        let conn = crate::db::open_memory_database().unwrap();
        let router = EmbeddingRouter::with_provider(cfg("fast", 64), Box::new(SyntheticProvider::new(64)));
        let sectors = [Sector::Episodic, Sector::Semantic, Sector::Procedural];

        let out = router.embed_multi_sector(&conn, "hello world", &sectors, None).await.unwrap();
        assert_eq!(out.len(), 3);

        let status: String = conn
            .query_row("SELECT status FROM embed_logs WHERE kind = 'multi_sector'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn multi_sector_embedding_marks_failed_after_three_successive_failures() {
        let conn = crate::db::open_memory_database().unwrap();
        let mut c = cfg("semantic", 256);
        c.router_fallback_enabled = false;
        let router = EmbeddingRouter::with_provider(c, Box::new(FixedDimProvider { dim: 512 }));
        let sectors = [Sector::Episodic, Sector::Semantic, Sector::Procedural];

        let err = router.embed_multi_sector(&conn, "hello world", &sectors, None).await.unwrap_err();
        assert!(err.downcast_ref::<DimIncompatible>().is_some());

        let status: String = conn
            .query_row("SELECT status FROM embed_logs WHERE kind = 'multi_sector'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[tokio::test]
    async fn aggregated_embedding_matches_hybrid_tier_output_length() {
        let c = cfg("hybrid", 256);
        let router = EmbeddingRouter::with_provider(c, Box::new(FixedDimProvider { dim: 256 }));
        let chunks = vec!["first chunk".to_string(), "second chunk".to_string()];
        let out = router.embed_aggregated(&chunks, Sector::Episodic).await.unwrap();
        assert_eq!(out.vector.len(), 256 + 128);
    }
}
