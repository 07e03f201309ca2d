//! Core data models that flow through ingestion and retrieval.
//!
//! Chunks carry a small fixed-schema [`ChunkMetadata`] record rather than a
//! free-form map so that citation logic can rely on the source filename
//! being a typed field.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label used in prompts when a chunk has no recorded filename.
pub const UNKNOWN_SOURCE: &str = "unknown source";

/// Metadata attached to every stored chunk.
///
/// Serialised flat: `{"filename": "a.pdf", "page": 3}`. Keys other than
/// `filename` land in [`extra`](ChunkMetadata::extra).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Original filename of the ingested document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Open extension map for forward-compatible keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    pub fn for_file(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            extra: BTreeMap::new(),
        }
    }

    /// The filename to cite, or [`UNKNOWN_SOURCE`].
    pub fn source_label(&self) -> &str {
        self.filename.as_deref().unwrap_or(UNKNOWN_SOURCE)
    }
}

/// Atomic retrievable unit of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    /// Position within the parent document, contiguous from 0.
    pub chunk_index: i64,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Fused relevance score; only present on retrieved chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl DocumentChunk {
    pub fn new(
        document_id: &str,
        chunk_index: i64,
        content: impl Into<String>,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index,
            content: content.into(),
            metadata,
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Result of one successful ingestion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedDocument {
    pub id: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub chunks: Vec<DocumentChunk>,
}

impl IngestedDocument {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, chunks: Vec<DocumentChunk>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            created_at: Utc::now(),
            chunks,
        }
    }
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-query ranked chunks, highest fused score first. Never persisted.
pub type RetrievedContext = Vec<DocumentChunk>;
