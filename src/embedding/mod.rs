//! Embedding subsystem: the synthetic embedder (C2), pluggable providers,
//! and the embedding router (C3) that ties them together with tier policy,
//! fusion, dimension reconciliation, retries, and caching.

pub mod providers;
pub mod router;
pub mod synthetic;

use crate::sector::Sector;
use crate::vector::normalize;
use anyhow::Result;
use async_trait::async_trait;

/// A pluggable embedding backend, selected by `embed_kind`. The router
/// additionally falls back to the bare `synthetic::gen_synth` function
/// directly (not through this trait) whenever a provider call fails.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str, sector: Sector) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String], sector: Sector) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t, sector).await?);
        }
        Ok(out)
    }

    /// Native output dimension of this provider, before reconciliation.
    fn dimensions(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Weighted-sum fusion for two vectors of equal length:
/// `normalize(wa*a + wb*b)`.
pub fn fuse_same_length(a: &[f32], b: &[f32], wa: f32, wb: f32) -> Vec<f32> {
    debug_assert_eq!(a.len(), b.len());
    let mut out: Vec<f32> = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| wa * x + wb * y)
        .collect();
    normalize(&mut out);
    out
}

/// Hybrid-tier fusion convention (see DESIGN.md Open Question #2):
/// concatenate the synthetic vector (length D) with the compressed
/// semantic vector (length 128), each pre-scaled by its weight, then
/// L2-renormalize the whole thing. Used at every hybrid/smart call site so
/// the retrieval engine can assume a single consistent length per sector.
pub fn fuse_concat(synthetic: &[f32], semantic_compressed: &[f32], wa: f32, wb: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(synthetic.len() + semantic_compressed.len());
    out.extend(synthetic.iter().map(|x| x * wa));
    out.extend(semantic_compressed.iter().map(|x| x * wb));
    normalize(&mut out);
    out
}

/// Construct the configured provider. `synthetic`/`local_hash` are always
/// available; network providers require `provider_base_url`.
pub fn create_provider(cfg: &crate::config::RouterConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match cfg.embed_kind.as_str() {
        "synthetic" => Ok(Box::new(providers::SyntheticProvider::new(cfg.vector_dim))),
        "local_hash" => Ok(Box::new(providers::LocalHashProvider::new(cfg.vector_dim))),
        "openai" => Ok(Box::new(providers::RemoteBatchProvider::openai(cfg)?)),
        "gemini" => Ok(Box::new(providers::RemoteBatchProvider::gemini(cfg)?)),
        "ollama" => Ok(Box::new(providers::RemoteBatchProvider::ollama(cfg)?)),
        "router_cpu" => Ok(Box::new(providers::RouterCpuProvider::new(cfg)?)),
        other => anyhow::bail!("unknown embed_kind {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuse_same_length_is_unit_length_with_normal_weights() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let out = fuse_same_length(&a, &b, 0.6, 0.4);
        let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fuse_concat_length_is_sum_of_inputs() {
        let synth = vec![1.0; 256];
        let sem = vec![1.0; 128];
        let out = fuse_concat(&synth, &sem, 0.6, 0.4);
        assert_eq!(out.len(), 384);
    }
}
