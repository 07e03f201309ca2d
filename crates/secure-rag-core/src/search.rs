//! Hybrid retrieval with reciprocal-rank fusion.
//!
//! The search algorithm operates entirely through the [`VectorStore`]
//! trait. The caller embeds the query and passes the vector in.
//!
//! # Algorithm
//!
//! 1. Fetch `candidate_k` keyword candidates (sparse channel).
//! 2. Fetch `candidate_k` vector candidates (dense channel).
//! 3. Fuse: each chunk scores `Σ 1 / (rrf_k + rank)` over the channels it
//!    appears in, with `rank` 1-based.
//! 4. Sort by fused score (desc), then chunk id (asc) for determinism.
//! 5. Truncate to `top_k` and attach the fused score to each chunk.

use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::models::{DocumentChunk, RetrievedContext};
use crate::store::{ChunkCandidate, VectorStore};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_CANDIDATE_K: usize = 50;
/// Damping constant for reciprocal-rank fusion.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Number of fused results to return. Must be ≥ 1.
    pub top_k: usize,
    /// Candidates fetched from each channel before fusion.
    pub candidate_k: usize,
    /// RRF damping constant.
    pub rrf_k: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            candidate_k: DEFAULT_CANDIDATE_K,
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

/// Run a hybrid search against `collection`.
///
/// Returns an empty context (not an error) when the query has no content or
/// nothing matches.
pub async fn hybrid_search<S: VectorStore + ?Sized>(
    store: &S,
    collection: &str,
    query: &str,
    query_vec: &[f32],
    params: &SearchParams,
) -> Result<RetrievedContext> {
    if params.top_k == 0 {
        bail!("top_k must be a positive integer");
    }
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let candidate_k = params.candidate_k.max(params.top_k);
    let keyword = store
        .keyword_search(collection, query, candidate_k)
        .await?;
    let vector = store
        .vector_search(collection, query_vec, candidate_k)
        .await?;

    Ok(reciprocal_rank_fusion(
        &[keyword, vector],
        params.rrf_k,
        params.top_k,
    ))
}

/// Fuse several best-first candidate lists into one ranked context.
pub fn reciprocal_rank_fusion(
    channels: &[Vec<ChunkCandidate>],
    rrf_k: f64,
    top_k: usize,
) -> RetrievedContext {
    let mut fused: HashMap<&str, (&DocumentChunk, f64)> = HashMap::new();

    for channel in channels {
        for (rank, cand) in channel.iter().enumerate() {
            let contribution = 1.0 / (rrf_k + (rank + 1) as f64);
            fused
                .entry(cand.chunk.id.as_str())
                .and_modify(|(_, score)| *score += contribution)
                .or_insert((&cand.chunk, contribution));
        }
    }

    let mut ranked: Vec<(&DocumentChunk, f64)> = fused.into_values().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    ranked.truncate(top_k);

    ranked
        .into_iter()
        .map(|(chunk, score)| chunk.clone().with_score(score))
        .collect()
}
