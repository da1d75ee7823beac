//! Configuration loading and management.
//!
//! HSG reads configuration from `~/.hsg/config.toml` (if present) with
//! environment variable overrides (`HSG_DB`, `HSG_LOG_LEVEL`,
//! `HSG_VECTOR_DIM`, `HSG_EMBED_KIND`, `HSG_STRICT_TENANT`). All fields have
//! sensible defaults — no configuration file is required.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level HSG configuration, deserialized from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HsgConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub router: RouterConfig,
    pub retrieval: RetrievalConfig,
    pub decay: DecayConfig,
    pub ingest: IngestConfig,
}

/// HTTP server and logging settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

/// Database path and default tenancy behavior.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file (supports `~` expansion).
    pub db_path: String,
    /// Require `user_id` on multi-tenant listings (`USER_ID_REQUIRED` otherwise).
    pub strict_tenant: bool,
}

/// Embedding router configuration (spec §4.3 / §6 option table).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RouterConfig {
    /// D, nominal embedding dimension.
    pub vector_dim: usize,
    /// Enable synthetic+semantic fusion in hybrid/smart tiers.
    pub hybrid_fusion: bool,
    /// Provider selector: synthetic/openai/gemini/ollama/local/router_cpu.
    pub embed_kind: String,
    /// fast/hybrid/smart/semantic.
    pub tier: String,
    /// simple (batch) or advanced (per-sector).
    pub embed_mode: String,
    /// Parallelize per-sector calls when not Gemini.
    pub adv_embed_parallel: bool,
    /// Spacing between sequential sector calls.
    pub embed_delay_ms: u64,
    /// Router decision cache TTL.
    pub router_cache_ttl_ms: u64,
    /// Synthetic fallback on provider failure.
    pub router_fallback_enabled: bool,
    /// Allow vectorized fusion path.
    pub router_simd_enabled: bool,
    /// Max relative dim mismatch before fallback.
    pub router_dim_tolerance: f64,
    /// Validate sector models at startup.
    pub router_validate_on_start: bool,
    /// Compression floor.
    pub min_vec_dim: usize,
    /// Compression ceiling (defaults to vector_dim when 0).
    pub max_vec_dim: usize,
    /// Base URL for remote_batch providers (openai/ollama style).
    pub provider_base_url: Option<String>,
    /// API key for remote_batch providers, if required.
    pub provider_api_key: Option<String>,
    /// Remote model name.
    pub provider_model: String,
}

/// Retrieval (C8) parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Reinforce salience on retrieval hit.
    pub decay_reinforce_on_query: bool,
    /// Re-embed cold vectors on query hit.
    pub regeneration_enabled: bool,
    /// Default energy threshold tau.
    pub base_threshold: f64,
    /// Max candidates scanned from the vector shortlist.
    pub candidate_window: usize,
}

/// Decay & compression sweep (C7) parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DecayConfig {
    /// Rows per sweep page.
    pub page_size: usize,
    /// Rows between yield sleeps during a sweep.
    pub yield_every: usize,
}

/// Ingestion (C6) parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    /// Tokens above which root-child is forced.
    pub ingest_large_threshold: usize,
    /// Chunk character size.
    pub ingest_section_size: usize,
    /// Max payload size in bytes.
    pub max_payload_size: usize,
    /// Fetch timeout for URL ingestion, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for HsgConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            router: RouterConfig::default(),
            retrieval: RetrievalConfig::default(),
            decay: DecayConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_hsg_dir()
            .join("hsg.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            strict_tenant: false,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            vector_dim: 256,
            hybrid_fusion: true,
            embed_kind: "synthetic".into(),
            tier: "hybrid".into(),
            embed_mode: "advanced".into(),
            adv_embed_parallel: false,
            embed_delay_ms: 0,
            router_cache_ttl_ms: 30_000,
            router_fallback_enabled: true,
            router_simd_enabled: true,
            router_dim_tolerance: 0.1,
            router_validate_on_start: true,
            min_vec_dim: 64,
            max_vec_dim: 0,
            provider_base_url: None,
            provider_api_key: None,
            provider_model: "text-embedding-3-small".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            decay_reinforce_on_query: true,
            regeneration_enabled: true,
            base_threshold: 0.4,
            candidate_window: 100,
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            yield_every: 5000,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ingest_large_threshold: 8000,
            ingest_section_size: 3000,
            max_payload_size: 20 * 1024 * 1024,
            fetch_timeout_secs: 30,
        }
    }
}

/// Returns `~/.hsg/`
pub fn default_hsg_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".hsg")
}

/// Returns the default config file path: `~/.hsg/config.toml`
pub fn default_config_path() -> PathBuf {
    default_hsg_dir().join("config.toml")
}

impl HsgConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            HsgConfig::default()
        };

        config.apply_env_overrides();
        if config.router.max_vec_dim == 0 {
            config.router.max_vec_dim = config.router.vector_dim;
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|key| std::env::var(key));
    }

    fn apply_env_overrides_with(&mut self, env: impl Fn(&str) -> Result<String, std::env::VarError>) {
        if let Ok(val) = env("HSG_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = env("HSG_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = env("HSG_VECTOR_DIM") {
            if let Ok(dim) = val.parse() {
                self.router.vector_dim = dim;
            }
        }
        if let Ok(val) = env("HSG_EMBED_KIND") {
            self.router.embed_kind = val;
        }
        if let Ok(val) = env("HSG_STRICT_TENANT") {
            self.storage.strict_tenant = val == "1" || val.eq_ignore_ascii_case("true");
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = HsgConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.router.vector_dim, 256);
        assert!(config.router.hybrid_fusion);
        assert!(config.storage.db_path.ends_with("hsg.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"
strict_tenant = true

[router]
vector_dim = 512
"#;
        let config: HsgConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert!(config.storage.strict_tenant);
        assert_eq!(config.router.vector_dim, 512);
        // defaults still apply for unset fields
        assert_eq!(config.retrieval.base_threshold, 0.4);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = HsgConfig::default();
        let env = |key: &str| match key {
            "HSG_DB" => Ok("/tmp/override.db".into()),
            "HSG_LOG_LEVEL" => Ok("trace".into()),
            "HSG_VECTOR_DIM" => Ok("128".into()),
            "HSG_STRICT_TENANT" => Ok("true".into()),
            _ => Err(std::env::VarError::NotPresent),
        };

        config.apply_env_overrides_with(env);

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.router.vector_dim, 128);
        assert!(config.storage.strict_tenant);
    }
}
