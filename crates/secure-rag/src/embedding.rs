//! Embedding backends.
//!
//! - **[`LocalEmbedder`]**: runs a fastembed model in-process. The model is
//!   loaded on first use and cached for the lifetime of the embedder.
//! - **[`OpenAiEmbedder`]**: calls any OpenAI-compatible `/embeddings`
//!   endpoint (OpenAI, vLLM, TEI) with batching, retry and backoff.
//!
//! Use [`create_embedder`] to build the backend named in the configuration.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use secure_rag_core::embedding::Embedder;

use crate::config::EmbeddingConfig;

/// Build the embedder selected by `embedding.provider`.
///
/// `dims` is the collection dimensionality; remote providers report it as
/// their own since the endpoint does not advertise one.
pub fn create_embedder(config: &EmbeddingConfig, dims: usize) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config, dims)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ OpenAI-compatible Provider ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, dims: usize) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("embedding.base_url required for openai provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingResponse = response
                            .json()
                            .await
                            .context("Invalid embeddings response")?;
                        return parsed.into_vectors(texts.len());
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "Embedding API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("Embedding API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Embedding endpoint {} unreachable: {}",
                        self.endpoint,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            bail!(
                "Invalid embeddings response: expected {} vectors, got {}",
                expected,
                self.data.len()
            );
        }
        self.data.sort_by_key(|item| item.index);
        Ok(self.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

// ============ Local Provider (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;
    use tokio::sync::OnceCell;

    use secure_rag_core::embedding::Embedder;

    use crate::config::EmbeddingConfig;

    type SharedModel = Arc<Mutex<fastembed::TextEmbedding>>;

    /// In-process embedding model.
    ///
    /// Models are downloaded from Hugging Face on first use and cached on
    /// disk; after that no network calls are made.
    pub struct LocalEmbedder {
        model_name: String,
        model: fastembed::EmbeddingModel,
        dims: usize,
        batch_size: usize,
        handle: OnceCell<SharedModel>,
    }

    impl LocalEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let (model, dims) = resolve_model(&config.model)?;
            Ok(Self {
                model_name: config.model.clone(),
                model,
                dims,
                batch_size: config.batch_size,
                handle: OnceCell::new(),
            })
        }

        async fn handle(&self) -> Result<SharedModel> {
            let model = self.model.clone();
            let name = self.model_name.clone();
            self.handle
                .get_or_try_init(|| async move {
                    tracing::info!(model = %name, "loading local embedding model");
                    let loaded = tokio::task::spawn_blocking(move || {
                        fastembed::TextEmbedding::try_new(
                            fastembed::InitOptions::new(model).with_show_download_progress(true),
                        )
                        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))
                    })
                    .await??;
                    Ok::<_, anyhow::Error>(Arc::new(Mutex::new(loaded)))
                })
                .await
                .cloned()
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.run(with_prefix(&self.model_name, InputKind::Passage, texts))
                .await
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            let input = [text.to_string()];
            self.run(with_prefix(&self.model_name, InputKind::Query, &input))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("Empty embedding response"))
        }
    }

    impl LocalEmbedder {
        async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let handle = self.handle().await?;
            let batch_size = self.batch_size;

            tokio::task::spawn_blocking(move || {
                let mut model = handle
                    .lock()
                    .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
                model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| anyhow!("Local embedding failed: {}", e))
            })
            .await?
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum InputKind {
        Query,
        Passage,
    }

    /// E5 models are trained with `query: ` / `passage: ` markers and rank
    /// noticeably worse without them.
    fn with_prefix(model_name: &str, kind: InputKind, texts: &[String]) -> Vec<String> {
        if !model_name.contains("e5") {
            return texts.to_vec();
        }
        let prefix = match kind {
            InputKind::Query => "query: ",
            InputKind::Passage => "passage: ",
        };
        texts.iter().map(|t| format!("{}{}", prefix, t)).collect()
    }

    fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
        use fastembed::EmbeddingModel::*;
        match name {
            "multilingual-e5-large" => Ok((MultilingualE5Large, 1024)),
            "multilingual-e5-base" => Ok((MultilingualE5Base, 768)),
            "multilingual-e5-small" => Ok((MultilingualE5Small, 384)),
            "bge-large-en-v1.5" => Ok((BGELargeENV15, 1024)),
            "bge-base-en-v1.5" => Ok((BGEBaseENV15, 768)),
            "bge-small-en-v1.5" => Ok((BGESmallENV15, 384)),
            "all-minilm-l6-v2" => Ok((AllMiniLML6V2, 384)),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 multilingual-e5-large, multilingual-e5-base, multilingual-e5-small, \
                 bge-large-en-v1.5, bge-base-en-v1.5, bge-small-en-v1.5, all-minilm-l6-v2",
                other
            ),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_resolve_known_models() {
            assert_eq!(resolve_model("multilingual-e5-large").unwrap().1, 1024);
            assert_eq!(resolve_model("all-minilm-l6-v2").unwrap().1, 384);
            assert!(resolve_model("bge-m3").is_err());
        }

        #[test]
        fn test_e5_inputs_are_prefixed() {
            let texts = vec!["VPN is required.".to_string()];
            assert_eq!(
                with_prefix("multilingual-e5-large", InputKind::Passage, &texts),
                vec!["passage: VPN is required.".to_string()]
            );
            assert_eq!(
                with_prefix("multilingual-e5-small", InputKind::Query, &texts),
                vec!["query: VPN is required.".to_string()]
            );
            assert_eq!(with_prefix("bge-small-en-v1.5", InputKind::Query, &texts), texts);
        }
    }
}
