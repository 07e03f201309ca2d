//! SQLite-backed [`VectorStore`].
//!
//! Sparse retrieval uses an FTS5 table ranked by BM25; dense retrieval loads
//! the collection's vectors (little-endian f32 BLOBs) and ranks them by
//! cosine similarity in Rust. Writes are append-only and transactional per
//! insert call.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use secure_rag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use secure_rag_core::models::{ChunkMetadata, DocumentChunk};
use secure_rag_core::store::{query_terms, ChunkCandidate, VectorStore};

use crate::config::StoreConfig;
use crate::{db, migrate};

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool)
            .await
            .context("Failed to initialise vector store schema")?;
        Ok(Self::new(pool))
    }

    async fn collection_dims(&self, collection: &str) -> Result<Option<usize>> {
        let dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(dims.map(|d| d as usize))
    }
}

/// Build an FTS5 MATCH expression that treats every query term literally.
fn fts_match_expression(query: &str) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn row_to_chunk(row: &SqliteRow) -> Result<DocumentChunk> {
    let metadata_json: String = row.get("metadata_json");
    let metadata: ChunkMetadata =
        serde_json::from_str(&metadata_json).context("Corrupt chunk metadata")?;
    Ok(DocumentChunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        metadata,
        score: None,
    })
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_collection(&self, collection: &str, dims: usize) -> Result<()> {
        match self.collection_dims(collection).await? {
            Some(existing) if existing != dims => bail!(
                "Collection '{}' exists with {} dimensions, expected {}",
                collection,
                existing,
                dims
            ),
            Some(_) => Ok(()),
            None => {
                sqlx::query(
                    "INSERT OR IGNORE INTO collections (name, dims, created_at) VALUES (?, ?, ?)",
                )
                .bind(collection)
                .bind(dims as i64)
                .bind(chrono::Utc::now().timestamp())
                .execute(&self.pool)
                .await?;
                tracing::info!(collection, dims, "created collection");
                Ok(())
            }
        }
    }

    async fn insert(
        &self,
        collection: &str,
        chunks: &[DocumentChunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            bail!(
                "Got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        let dims = self
            .collection_dims(collection)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Collection '{}' does not exist", collection))?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            bail!(
                "Vector has {} dimensions, collection '{}' expects {}",
                bad.len(),
                collection,
                dims
            );
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO chunks (id, collection, document_id, chunk_index, content, metadata_json, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(collection)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&metadata_json)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, collection, content) VALUES (?, ?, ?)")
                .bind(&chunk.id)
                .bind(collection)
                .bind(&chunk.content)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, collection, dims, embedding) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(collection)
            .bind(dims as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn keyword_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let Some(expression) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.content, c.metadata_json,
                   chunks_fts.rank AS rank
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ? AND chunks_fts.collection = ?
            ORDER BY chunks_fts.rank, c.id
            LIMIT ?
            "#,
        )
        .bind(&expression)
        .bind(collection)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                Ok(ChunkCandidate {
                    chunk: row_to_chunk(row)?,
                    raw_score: -rank, // negate so higher = better
                })
            })
            .collect()
    }

    async fn vector_search(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.content, c.metadata_json,
                   cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            WHERE cv.collection = ?
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
                Ok(ChunkCandidate {
                    chunk: row_to_chunk(row)?,
                    raw_score: similarity,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        candidates.truncate(limit);

        Ok(candidates)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
