//! In-memory [`VectorStore`] implementation for tests and embedding hosts.
//!
//! Uses a `HashMap` of collections behind `std::sync::RwLock`. Vector search
//! is brute-force cosine similarity; keyword search ranks chunks by the
//! number of distinct query terms they contain.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::DocumentChunk;

use super::{query_terms, ChunkCandidate, VectorStore};

struct StoredChunk {
    chunk: DocumentChunk,
    content_lower: String,
    vector: Vec<f32>,
}

struct Collection {
    dims: usize,
    chunks: Vec<StoredChunk>,
}

/// In-memory store for testing.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn sort_best_first(candidates: &mut [ChunkCandidate]) {
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_collection(&self, collection: &str, dims: usize) -> Result<()> {
        let mut collections = self.write()?;
        match collections.get(collection) {
            Some(existing) if existing.dims != dims => bail!(
                "collection '{}' has dimension {}, expected {}",
                collection,
                existing.dims,
                dims
            ),
            Some(_) => {}
            None => {
                collections.insert(
                    collection.to_string(),
                    Collection {
                        dims,
                        chunks: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        chunks: &[DocumentChunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        let mut collections = self.write()?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow!("collection '{}' does not exist", collection))?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != target.dims) {
            bail!(
                "vector dimension {} does not match collection dimension {}",
                bad.len(),
                target.dims
            );
        }
        for (chunk, vector) in chunks.iter().zip(vectors) {
            target.chunks.push(StoredChunk {
                chunk: chunk.clone(),
                content_lower: chunk.content.to_lowercase(),
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn keyword_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let collections = self.read()?;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut candidates: Vec<ChunkCandidate> = target
            .chunks
            .iter()
            .filter_map(|sc| {
                let matches = terms
                    .iter()
                    .filter(|t| sc.content_lower.contains(t.as_str()))
                    .count();
                (matches > 0).then(|| ChunkCandidate {
                    chunk: sc.chunk.clone(),
                    raw_score: matches as f64,
                })
            })
            .collect();
        sort_best_first(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn vector_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let collections = self.read()?;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut candidates: Vec<ChunkCandidate> = target
            .chunks
            .iter()
            .map(|sc| ChunkCandidate {
                chunk: sc.chunk.clone(),
                raw_score: cosine_similarity(query_vec, &sc.vector) as f64,
            })
            .collect();
        sort_best_first(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .read()?
            .get(collection)
            .map_or(0, |c| c.chunks.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn chunk(text: &str) -> DocumentChunk {
        DocumentChunk::new("doc", 0, text, ChunkMetadata::for_file("f.txt"))
    }

    #[tokio::test]
    async fn test_insert_is_additive() {
        let store = InMemoryStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .insert("c", &[chunk("a")], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store
            .insert("c", &[chunk("b")], &[vec![0.0, 1.0]])
            .await
            .unwrap();
        assert_eq!(store.count("c").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = InMemoryStore::new();
        store.ensure_collection("c", 3).await.unwrap();
        assert!(store.ensure_collection("c", 4).await.is_err());
        assert!(store
            .insert("c", &[chunk("a")], &[vec![1.0, 0.0]])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_searches_on_missing_collection_are_empty() {
        let store = InMemoryStore::new();
        assert!(store.keyword_search("nope", "x", 5).await.unwrap().is_empty());
        assert!(store
            .vector_search("nope", &[1.0], 5)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.count("nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keyword_search_ranks_by_term_matches() {
        let store = InMemoryStore::new();
        store.ensure_collection("c", 1).await.unwrap();
        store
            .insert(
                "c",
                &[chunk("vpn access"), chunk("vpn access policy"), chunk("lunch")],
                &[vec![1.0], vec![1.0], vec![1.0]],
            )
            .await
            .unwrap();
        let hits = store.keyword_search("c", "VPN policy", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.content, "vpn access policy");
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_similarity() {
        let store = InMemoryStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .insert(
                "c",
                &[chunk("east"), chunk("north")],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();
        let hits = store.vector_search("c", &[0.1, 0.9], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "north");
    }
}
