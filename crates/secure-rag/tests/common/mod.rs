#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use secure_rag::config::Config;
use secure_rag::server::AppState;
use secure_rag_core::embedding::Embedder;
use secure_rag_core::models::DocumentChunk;
use secure_rag_core::store::memory::InMemoryStore;
use secure_rag_core::store::{ChunkCandidate, VectorStore};

pub const DIMS: usize = 16;

/// Bag-of-words embedder: each lowercase term bumps one hashed bucket.
/// Bucket 0 is always set so no vector is all zeros.
pub struct HashEmbedder;

fn bucket(term: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in term.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    1 + (hash % (DIMS as u64 - 1)) as usize
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIMS];
                v[0] = 1.0;
                for term in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    v[bucket(&term.to_lowercase())] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Store whose every call fails, as when the database is unreachable.
pub struct FailingStore;

#[async_trait]
impl VectorStore for FailingStore {
    async fn ensure_collection(&self, _collection: &str, _dims: usize) -> Result<()> {
        bail!("connection refused")
    }

    async fn insert(
        &self,
        _collection: &str,
        _chunks: &[DocumentChunk],
        _vectors: &[Vec<f32>],
    ) -> Result<()> {
        bail!("connection refused")
    }

    async fn keyword_search(
        &self,
        _collection: &str,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        bail!("connection refused")
    }

    async fn vector_search(
        &self,
        _collection: &str,
        _query_vec: &[f32],
        _limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        bail!("connection refused")
    }

    async fn count(&self, _collection: &str) -> Result<usize> {
        bail!("connection refused")
    }
}

pub fn test_config(llm_base_url: &str) -> Config {
    let mut config = Config::default();
    config.store.dims = DIMS;
    config.llm.base_url = llm_base_url.to_string();
    config.llm.timeout_secs = 5;
    config
}

pub fn memory_state(llm_base_url: &str) -> AppState {
    AppState::new(
        test_config(llm_base_url),
        Arc::new(InMemoryStore::new()),
        Arc::new(HashEmbedder),
    )
    .unwrap()
}

pub fn failing_state(llm_base_url: &str) -> AppState {
    AppState::new(
        test_config(llm_base_url),
        Arc::new(FailingStore),
        Arc::new(HashEmbedder),
    )
    .unwrap()
}

/// A single-part `multipart/form-data` body. Returns (content type, body).
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> (String, Vec<u8>) {
    let boundary = "secure-rag-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            boundary, field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

/// Minimal one-page PDF showing `phrase`, with correct xref offsets.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >> stream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, obj).as_bytes());
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}
