//! Concrete embedding providers: `synthetic` (wraps C2), `local_hash`
//! (deterministic sha256-to-vector, no model needed), `remote_batch`
//! (OpenAI/Gemini/Ollama-style HTTP embedding endpoints), and `router_cpu`
//! (a local ONNX model via `ort` + `tokenizers`, grounded in the teacher's
//! `embedding/local.rs`).

use super::EmbeddingProvider;
use crate::config::RouterConfig;
use crate::sector::Sector;
use crate::vector::normalize;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex as AsyncMutex;

/// Wraps the synthetic embedder behind the `EmbeddingProvider` trait so it
/// can be selected via `embed_kind = "synthetic"` the same way a remote
/// provider would be.
pub struct SyntheticProvider {
    dim: usize,
}

impl SyntheticProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingProvider for SyntheticProvider {
    async fn embed(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        Ok(super::synthetic::gen_synth(text, sector, self.dim))
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

/// Deterministic hash-to-vector provider: `sha256(text || sector)`,
/// expanded into `dim` floats via repeated re-hashing, L2-normalized. No
/// network, no model file — useful as a cheap stand-in for a real semantic
/// provider in tests and air-gapped deployments.
pub struct LocalHashProvider {
    dim: usize,
}

impl LocalHashProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalHashProvider {
    async fn embed(&self, text: &str, sector: Sector) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(self.dim);
        let mut seed = format!("{text}|{}", sector.as_str()).into_bytes();
        while out.len() < self.dim {
            let digest = Sha256::digest(&seed);
            for chunk in digest.chunks_exact(4) {
                if out.len() >= self.dim {
                    break;
                }
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // map to [-1, 1]
                out.push((bits as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
            }
            seed = digest.to_vec();
        }
        normalize(&mut out);
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "local_hash"
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RemoteKind {
    OpenAi,
    Gemini,
    Ollama,
}

/// OpenAI-compatible / Google generativelanguage / Ollama embedding
/// endpoints. Gemini-style providers are serialized through a single-flight
/// mutex to avoid concurrent 429s (spec §4.3 / §5).
pub struct RemoteBatchProvider {
    kind: RemoteKind,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
    single_flight: AsyncMutex<()>,
}

impl RemoteBatchProvider {
    pub fn openai(cfg: &RouterConfig) -> Result<Self> {
        let base_url = cfg
            .provider_base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            kind: RemoteKind::OpenAi,
            client: reqwest::Client::new(),
            base_url,
            api_key: cfg.provider_api_key.clone(),
            model: cfg.provider_model.clone(),
            dim: cfg.vector_dim,
            single_flight: AsyncMutex::new(()),
        })
    }

    pub fn gemini(cfg: &RouterConfig) -> Result<Self> {
        let Some(api_key) = cfg.provider_api_key.clone() else {
            bail!("gemini provider requires provider_api_key");
        };
        let base_url = cfg.provider_base_url.clone().unwrap_or_else(|| {
            "https://generativelanguage.googleapis.com/v1beta/models".to_string()
        });
        Ok(Self {
            kind: RemoteKind::Gemini,
            client: reqwest::Client::new(),
            base_url,
            api_key: Some(api_key),
            model: cfg.provider_model.clone(),
            dim: cfg.vector_dim,
            single_flight: AsyncMutex::new(()),
        })
    }

    pub fn ollama(cfg: &RouterConfig) -> Result<Self> {
        let base_url = cfg
            .provider_base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            kind: RemoteKind::Ollama,
            client: reqwest::Client::new(),
            base_url,
            api_key: None,
            model: cfg.provider_model.clone(),
            dim: cfg.vector_dim,
            single_flight: AsyncMutex::new(()),
        })
    }

    async fn call_once(&self, text: &str) -> Result<Vec<f32>> {
        match self.kind {
            RemoteKind::OpenAi => {
                #[derive(serde::Serialize)]
                struct Req<'a> {
                    input: &'a str,
                    model: &'a str,
                    dimensions: usize,
                }
                #[derive(serde::Deserialize)]
                struct Embedding {
                    embedding: Vec<f32>,
                }
                #[derive(serde::Deserialize)]
                struct Resp {
                    data: Vec<Embedding>,
                }
                let mut req = self
                    .client
                    .post(format!("{}/embeddings", self.base_url))
                    .json(&Req {
                        input: text,
                        model: &self.model,
                        dimensions: self.dim,
                    });
                if let Some(key) = &self.api_key {
                    req = req.bearer_auth(key);
                }
                let resp: Resp = req.send().await?.error_for_status()?.json().await?;
                resp.data
                    .into_iter()
                    .next()
                    .map(|e| e.embedding)
                    .context("empty embedding response")
            }
            RemoteKind::Gemini => {
                let _guard = self.single_flight.lock().await;
                #[derive(serde::Serialize)]
                struct Part<'a> {
                    text: &'a str,
                }
                #[derive(serde::Serialize)]
                struct Content<'a> {
                    parts: Vec<Part<'a>>,
                }
                #[derive(serde::Serialize)]
                struct Req<'a> {
                    model: &'a str,
                    content: Content<'a>,
                    #[serde(rename = "taskType")]
                    task_type: &'a str,
                }
                #[derive(serde::Serialize)]
                struct Batch<'a> {
                    requests: Vec<Req<'a>>,
                }
                #[derive(serde::Deserialize)]
                struct EmbeddingValues {
                    values: Vec<f32>,
                }
                #[derive(serde::Deserialize)]
                struct Resp {
                    embeddings: Vec<EmbeddingValues>,
                }
                let url = format!(
                    "{}/{}:batchEmbedContents?key={}",
                    self.base_url,
                    self.model,
                    self.api_key.as_deref().unwrap_or_default()
                );
                let body = Batch {
                    requests: vec![Req {
                        model: &self.model,
                        content: Content {
                            parts: vec![Part { text }],
                        },
                        task_type: "RETRIEVAL_DOCUMENT",
                    }],
                };
                let resp: Resp = self
                    .client
                    .post(url)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                resp.embeddings
                    .into_iter()
                    .next()
                    .map(|e| e.values)
                    .context("empty embedding response")
            }
            RemoteKind::Ollama => {
                #[derive(serde::Serialize)]
                struct Req<'a> {
                    model: &'a str,
                    prompt: &'a str,
                }
                #[derive(serde::Deserialize)]
                struct Resp {
                    embedding: Vec<f32>,
                }
                let resp: Resp = self
                    .client
                    .post(format!("{}/api/embeddings", self.base_url))
                    .json(&Req {
                        model: &self.model,
                        prompt: text,
                    })
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok(resp.embedding)
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteBatchProvider {
    async fn embed(&self, text: &str, _sector: Sector) -> Result<Vec<f32>> {
        let v = self.call_once(text).await?;
        if v.is_empty() {
            bail!("provider returned an empty vector");
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        match self.kind {
            RemoteKind::OpenAi => "openai",
            RemoteKind::Gemini => "gemini",
            RemoteKind::Ollama => "ollama",
        }
    }
}

/// Local CPU model provider: per-sector chooses a named ONNX model, run
/// through `ort`, tokenized with `tokenizers`, mean-pooled and L2-
/// normalized — the same shape as the teacher's `LocalEmbeddingProvider`.
/// `ort::session::Session` is `!Sync`, so access is serialized behind a
/// std mutex exactly as the teacher does.
pub struct RouterCpuProvider {
    dim: usize,
    // SAFETY: identical justification to the teacher's local.rs — ONNX
    // Runtime sessions are safe to share across threads as long as calls
    // are serialized, which the Mutex guarantees.
    session: StdMutex<Option<ort::session::Session>>,
    model_path: std::path::PathBuf,
    tokenizer_path: std::path::PathBuf,
}

impl RouterCpuProvider {
    pub fn new(cfg: &RouterConfig) -> Result<Self> {
        let dir = crate::config::default_hsg_dir().join("models");
        Ok(Self {
            dim: cfg.vector_dim,
            session: StdMutex::new(None),
            model_path: dir.join(format!("{}.onnx", cfg.provider_model)),
            tokenizer_path: dir.join(format!("{}.tokenizer.json", cfg.provider_model)),
        })
    }

    fn ensure_loaded(&self) -> Result<()> {
        let mut guard = self.session.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        if !self.model_path.exists() {
            bail!(
                "router_cpu model not found at {}; run `hsg model download` first",
                self.model_path.display()
            );
        }
        let session = ort::session::Session::builder()?.commit_from_file(&self.model_path)?;
        *guard = Some(session);
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for RouterCpuProvider {
    async fn embed(&self, text: &str, _sector: Sector) -> Result<Vec<f32>> {
        self.ensure_loaded()?;
        let tokenizer = tokenizers::Tokenizer::from_file(&self.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("failed to tokenize: {e}"))?;
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&x| x as i64)
            .collect();
        if ids.is_empty() {
            bail!("tokenizer produced no tokens");
        }
        let seq_len = ids.len();

        // `ort::Session::run` is blocking and CPU-bound; hold the mutex for
        // the duration of the forward pass, same as the teacher's provider.
        let mut guard = self.session.lock().unwrap();
        let session = guard.as_mut().context("session not loaded")?;

        let shape = vec![1i64, seq_len as i64];
        let input_ids_tensor = ort::value::Tensor::from_array((shape.clone(), ids.into_boxed_slice()))?;
        let attention_mask_tensor =
            ort::value::Tensor::from_array((shape.clone(), mask.clone().into_boxed_slice()))?;
        let token_type_ids_tensor =
            ort::value::Tensor::from_array((shape, vec![0i64; seq_len].into_boxed_slice()))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "token_type_ids" => token_type_ids_tensor,
        })?;

        let token_emb_value = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);
        let (out_shape, data) = token_emb_value
            .try_extract_tensor::<f32>()
            .context("failed to extract token_embeddings tensor")?;
        let dims: &[i64] = &out_shape;
        anyhow::ensure!(
            dims.len() == 3,
            "unexpected token_embeddings shape: {dims:?}, expected [batch, seq, hidden]"
        );
        let hidden_dim = dims[2] as usize;
        let actual_seq_len = dims[1] as usize;

        let mut sum = vec![0.0f32; hidden_dim];
        let mut count = 0.0f32;
        for s in 0..actual_seq_len {
            let m = mask[s] as f32;
            if m > 0.0 {
                let offset = s * hidden_dim;
                for d in 0..hidden_dim {
                    sum[d] += data[offset + d] * m;
                }
                count += m;
            }
        }
        if count > 0.0 {
            for v in &mut sum {
                *v /= count;
            }
        }
        normalize(&mut sum);

        anyhow::ensure!(
            sum.len() == self.dim,
            "router_cpu model produced {}-dim output, configured vector_dim is {}",
            sum.len(),
            self.dim
        );
        Ok(sum)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "router_cpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthetic_provider_delegates_to_gen_synth() {
        let p = SyntheticProvider::new(128);
        let v = p.embed("hello world", Sector::Semantic).await.unwrap();
        assert_eq!(v.len(), 128);
    }

    #[tokio::test]
    async fn local_hash_is_deterministic() {
        let p = LocalHashProvider::new(64);
        let a = p.embed("same text", Sector::Episodic).await.unwrap();
        let b = p.embed("same text", Sector::Episodic).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn local_hash_differs_by_sector() {
        let p = LocalHashProvider::new(64);
        let a = p.embed("same text", Sector::Episodic).await.unwrap();
        let b = p.embed("same text", Sector::Semantic).await.unwrap();
        assert_ne!(a, b);
    }
}
