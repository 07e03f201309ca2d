//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines the storage operations the retrieval
//! pipeline needs: append chunks with their vectors, and fetch ranked
//! candidates from a sparse (keyword) and a dense (vector) channel.
//! Fusion of the two channels happens in [`crate::search`], outside the
//! store.
//!
//! Every operation is scoped to a named collection. Stores are append-only
//! from this crate's point of view: nothing here updates or deletes
//! existing entries.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::DocumentChunk;

/// A candidate chunk returned from one retrieval channel.
///
/// Candidates are returned best-first; their position in the list is the
/// rank used by fusion. `raw_score` is informational only (BM25 or cosine).
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk: DocumentChunk,
    pub raw_score: f64,
}

/// Abstract vector store backend.
///
/// Implementations must be `Send + Sync`; they are shared across
/// concurrent requests behind an `Arc`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ensure `collection` exists with the given vector dimensionality.
    ///
    /// Fails if the collection already exists with different dimensions.
    async fn ensure_collection(&self, collection: &str, dims: usize) -> Result<()>;

    /// Append chunks and their vectors (`vectors[i]` belongs to `chunks[i]`).
    async fn insert(
        &self,
        collection: &str,
        chunks: &[DocumentChunk],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// Keyword (sparse) search, best match first.
    async fn keyword_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Vector similarity (dense) search, most similar first.
    async fn vector_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Number of chunks stored in `collection`.
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Split a query into lowercase alphanumeric search terms.
///
/// Shared by stores that implement keyword matching themselves.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
