//! Vector index gateway: the one place that knows how text becomes stored,
//! searchable chunks and how queries become ranked context.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use secure_rag_core::chunk::{chunk_document, SplitterConfig};
use secure_rag_core::embedding::Embedder;
use secure_rag_core::models::{ChunkMetadata, DocumentChunk, RetrievedContext};
use secure_rag_core::search::{hybrid_search, SearchParams};
use secure_rag_core::store::VectorStore;

use crate::config::{Config, RetrievalConfig};
use crate::error::{RagError, RagResult};

/// Handle over one collection of a vector store.
///
/// Cheap to clone; all state is behind `Arc`s.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    dims: usize,
    splitter: SplitterConfig,
    retrieval: RetrievalConfig,
    batch_size: usize,
}

impl VectorIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: config.store.collection.clone(),
            dims: config.store.dims,
            splitter: config.chunking,
            retrieval: config.retrieval.clone(),
            batch_size: config.embedding.batch_size.max(1),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn default_top_k(&self) -> usize {
        self.retrieval.top_k
    }

    /// Create the collection if needed. Fails when the embedder's
    /// dimensionality does not match the configured one.
    pub async fn ensure_collection(&self) -> RagResult<()> {
        if self.embedder.dims() != self.dims {
            return Err(dims_mismatch(self.embedder.model_name(), self.embedder.dims(), self.dims));
        }
        self.store
            .ensure_collection(&self.collection, self.dims)
            .await
            .map_err(RagError::store)
    }

    pub async fn count(&self) -> RagResult<usize> {
        self.store
            .count(&self.collection)
            .await
            .map_err(RagError::store)
    }

    /// Split `text`, embed every piece, and append the chunks to the
    /// collection. Returns the stored chunks in source order.
    pub async fn insert(
        &self,
        text: &str,
        metadata: ChunkMetadata,
    ) -> RagResult<Vec<DocumentChunk>> {
        let document_id = Uuid::new_v4().to_string();
        let chunks = chunk_document(&document_id, &metadata, text, &self.splitter);
        self.insert_chunks(&chunks).await?;
        Ok(chunks)
    }

    /// Embed and append pre-built chunks.
    pub async fn insert_chunks(&self, chunks: &[DocumentChunk]) -> RagResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = self.embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(RagError::UnexpectedInternal(anyhow::anyhow!(
                    "Embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
        }
        self.check_dims(&vectors)?;

        self.ensure_collection().await?;
        self.store
            .insert(&self.collection, chunks, &vectors)
            .await
            .map_err(RagError::store)?;

        debug!(
            collection = %self.collection,
            chunks = chunks.len(),
            "inserted chunks"
        );
        Ok(())
    }

    /// Hybrid retrieval: keyword and vector candidates fused by reciprocal
    /// rank, best first, at most `top_k` results.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> RagResult<RetrievedContext> {
        if top_k == 0 {
            return Err(RagError::InvalidRequest(
                "top_k must be a positive integer".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_query(query).await?;
        self.check_dims(std::slice::from_ref(&query_vec))?;

        let params: SearchParams = self.retrieval.search_params(top_k);
        let context = hybrid_search(
            self.store.as_ref(),
            &self.collection,
            query,
            &query_vec,
            &params,
        )
        .await
        .map_err(RagError::store)?;

        debug!(
            collection = %self.collection,
            results = context.len(),
            "retrieved context"
        );
        Ok(context)
    }

    fn check_dims(&self, vectors: &[Vec<f32>]) -> RagResult<()> {
        match vectors.iter().find(|v| v.len() != self.dims) {
            Some(bad) => Err(dims_mismatch(self.embedder.model_name(), bad.len(), self.dims)),
            None => Ok(()),
        }
    }
}

fn dims_mismatch(model: &str, got: usize, expected: usize) -> RagError {
    RagError::UnexpectedInternal(anyhow::anyhow!(
        "Embedding model '{}' produced {}-dimensional vectors but the collection expects {}",
        model,
        got,
        expected
    ))
}
