//! Configuration loading and validation.
//!
//! Settings are merged with [`figment`], lowest to highest precedence:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. The TOML file passed with `--config` (skipped when absent)
//! 3. Environment variables prefixed `RAG_`, with `__` separating sections,
//!    e.g. `RAG_LLM__BASE_URL=http://vllm:8000/v1` or
//!    `RAG_STORE__COLLECTION=handbook`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use secure_rag_core::chunk::SplitterConfig;
use secure_rag_core::search::{SearchParams, DEFAULT_CANDIDATE_K, DEFAULT_RRF_K, DEFAULT_TOP_K};

pub const ENV_PREFIX: &str = "RAG_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: SplitterConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Vector store location and the collection this process is bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub collection: String,
    pub dims: usize,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/secure-rag.sqlite"),
            collection: "enterprise_rag".to_string(),
            dims: 1024,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"local"` (fastembed) or `"openai"` (any OpenAI-compatible endpoint).
    pub provider: String,
    pub model: String,
    /// Execution device for local inference.
    pub device: String,
    /// Base URL for the `openai` provider, e.g. `http://localhost:8001/v1`.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "multilingual-e5-large".to_string(),
            device: "cpu".to_string(),
            base_url: None,
            api_key: None,
            batch_size: 32,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub candidate_k: usize,
    pub rrf_k: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            candidate_k: DEFAULT_CANDIDATE_K,
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

impl RetrievalConfig {
    pub fn search_params(&self, top_k: usize) -> SearchParams {
        SearchParams {
            top_k,
            candidate_k: self.candidate_k,
            rrf_k: self.rrf_k,
        }
    }
}

/// OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Longest idle gap between streamed chunks, not a cap on the whole
    /// generation.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "google/gemma-2-27b-it".to_string(),
            api_key: Some("EMPTY".to_string()),
            temperature: 0.1,
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Model id advertised by `/models` and used when a request names none.
    pub model_id: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            model_id: "secure-rag".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Load configuration from defaults, an optional TOML file, and `RAG_*`
/// environment variables, then validate it.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(path) = path {
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }
    }
    let config: Config = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("Failed to parse configuration")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    config.chunking.validate()?;

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.candidate_k < config.retrieval.top_k {
        bail!("retrieval.candidate_k must be >= retrieval.top_k");
    }
    if config.retrieval.rrf_k <= 0.0 {
        bail!("retrieval.rrf_k must be > 0");
    }

    if config.store.dims == 0 {
        bail!("store.dims must be > 0");
    }
    if config.store.collection.trim().is_empty() {
        bail!("store.collection must not be empty");
    }
    if config.store.max_connections == 0 {
        bail!("store.max_connections must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "local" => {
            if config.embedding.device != "cpu" {
                bail!(
                    "embedding.device '{}' is not supported by the bundled runtime; use 'cpu'",
                    config.embedding.device
                );
            }
        }
        "openai" => {
            if config.embedding.base_url.is_none() {
                bail!("embedding.base_url must be set when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local or openai.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if config.llm.max_tokens == 0 {
        bail!("llm.max_tokens must be > 0");
    }

    match config.logging.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => bail!(
            "Invalid logging.level: '{}'. Must be one of: trace, debug, info, warn, error",
            other
        ),
    }
    match config.logging.format.as_str() {
        "pretty" | "json" => {}
        other => bail!("Invalid logging.format: '{}'. Must be pretty or json", other),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        validate(&config).unwrap();
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.llm.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.llm.max_tokens, 2048);
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let mut config = Config::default();
        config.chunking.chunk_overlap = 512;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let mut config = Config::default();
        config.embedding.provider = "magic".to_string();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("magic"));
    }

    #[test]
    fn test_openai_provider_requires_base_url() {
        let mut config = Config::default();
        config.embedding.provider = "openai".to_string();
        assert!(validate(&config).is_err());
        config.embedding.base_url = Some("http://localhost:8001/v1".to_string());
        validate(&config).unwrap();
    }

    #[test]
    fn test_env_overrides_nested_keys() {
        temp_env::with_vars(
            [
                ("RAG_LLM__BASE_URL", Some("http://vllm:9000/v1")),
                ("RAG_STORE__COLLECTION", Some("handbook")),
                ("RAG_RETRIEVAL__TOP_K", Some("3")),
            ],
            || {
                let config = load_config(None).unwrap();
                assert_eq!(config.llm.base_url, "http://vllm:9000/v1");
                assert_eq!(config.store.collection, "handbook");
                assert_eq!(config.retrieval.top_k, 3);
                assert_eq!(config.llm.model, "google/gemma-2-27b-it");
            },
        );
    }

    #[test]
    fn test_file_then_env_precedence() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("secure-rag.toml");
        std::fs::write(
            &path,
            "[chunking]\nchunk_size = 256\nchunk_overlap = 20\n\n[llm]\nmodel = \"from-file\"\n",
        )
        .unwrap();

        temp_env::with_var("RAG_LLM__MODEL", Some("from-env"), || {
            let config = load_config(Some(&path)).unwrap();
            assert_eq!(config.chunking.chunk_size, 256);
            assert_eq!(config.chunking.chunk_overlap, 20);
            assert_eq!(config.llm.model, "from-env");
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/secure-rag.toml"))).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_env_value_fails_validation() {
        temp_env::with_var("RAG_CHUNKING__CHUNK_OVERLAP", Some("600"), || {
            assert!(load_config(None).is_err());
        });
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(validate(&config).is_err());
    }
}
