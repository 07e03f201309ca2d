//! Ingestion pipeline: uploaded bytes → text → chunks → vectors → store.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use secure_rag_core::models::{ChunkMetadata, IngestedDocument};

use crate::error::{RagError, RagResult};
use crate::extract::{extract_file, SourceFormat};
use crate::index::VectorIndex;

/// Scoped temporary file, removed on drop. Removal failures are logged.
struct TempFileGuard {
    path: Option<TempPath>,
}

impl TempFileGuard {
    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let shown: PathBuf = path.to_path_buf();
            if let Err(e) = path.close() {
                warn!(path = %shown.display(), error = %e, "failed to remove temp file");
            }
        }
    }
}

fn internal(context: &str, err: std::io::Error) -> RagError {
    RagError::UnexpectedInternal(anyhow::anyhow!("{}: {}", context, err))
}

/// An upload being written to a temporary file piece by piece.
///
/// Dropping it without calling [`IngestionService::ingest_staged`] deletes
/// the file.
pub struct StagedUpload {
    filename: String,
    format: SourceFormat,
    file: tokio::fs::File,
    temp: TempFileGuard,
    written: u64,
}

impl StagedUpload {
    fn create(filename: &str, format: SourceFormat) -> RagResult<Self> {
        let (file, path) = tempfile::Builder::new()
            .prefix("secure-rag-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile()
            .map_err(|e| internal("Failed to create temp file", e))?
            .into_parts();
        Ok(Self {
            filename: filename.to_string(),
            format,
            file: tokio::fs::File::from_std(file),
            temp: TempFileGuard { path: Some(path) },
            written: 0,
        })
    }

    pub async fn write(&mut self, bytes: &[u8]) -> RagResult<()> {
        self.file
            .write_all(bytes)
            .await
            .map_err(|e| internal("Failed to write temp file", e))?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}

#[derive(Clone)]
pub struct IngestionService {
    index: VectorIndex,
}

impl IngestionService {
    pub fn new(index: VectorIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Start an upload. The format comes from the filename's extension and
    /// is checked before anything touches the disk.
    pub fn stage(&self, filename: &str) -> RagResult<StagedUpload> {
        let format = SourceFormat::from_filename(filename)?;
        StagedUpload::create(filename, format)
    }

    /// Ingest an in-memory file.
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> RagResult<IngestedDocument> {
        let format = SourceFormat::from_filename(filename)?;
        self.ingest_with_format(filename, format, bytes).await
    }

    pub async fn ingest_with_format(
        &self,
        filename: &str,
        format: SourceFormat,
        bytes: &[u8],
    ) -> RagResult<IngestedDocument> {
        if bytes.is_empty() {
            return Err(RagError::EmptyDocument);
        }
        let mut upload = StagedUpload::create(filename, format)?;
        upload.write(bytes).await?;
        self.ingest_staged(upload).await
    }

    /// Extract, chunk, embed, and store a fully written upload. The
    /// temporary file is removed once extraction finishes, whatever the
    /// outcome.
    pub async fn ingest_staged(&self, upload: StagedUpload) -> RagResult<IngestedDocument> {
        let span = tracing::info_span!("ingest", filename = %upload.filename);
        async move {
            let StagedUpload {
                filename,
                format,
                mut file,
                temp,
                written,
            } = upload;

            if written == 0 {
                return Err(RagError::EmptyDocument);
            }
            file.flush()
                .await
                .map_err(|e| internal("Failed to flush temp file", e))?;
            drop(file);

            let text = extract_file(temp.path(), format).await?;
            drop(temp);

            let chunks = self
                .index
                .insert(&text, ChunkMetadata::for_file(filename.as_str()))
                .await?;

            let document_id = chunks
                .first()
                .map(|c| c.document_id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            info!(
                chunks = chunks.len(),
                bytes = written,
                collection = %self.index.collection(),
                "document ingested"
            );
            Ok(IngestedDocument::new(document_id, filename, chunks))
        }
        .instrument(span)
        .await
    }

    /// Ingest a file from the local filesystem (CLI path).
    pub async fn ingest_path(&self, path: &Path) -> RagResult<IngestedDocument> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RagError::UnsupportedFormat(path.display().to_string()))?
            .to_string();
        let format = SourceFormat::from_filename(&filename)?;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RagError::ExtractionFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.ingest_with_format(&filename, format, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use secure_rag_core::embedding::Embedder;
    use secure_rag_core::store::memory::InMemoryStore;

    use super::*;
    use crate::config::Config;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![1.0, t.len() as f32]).collect())
        }
    }

    fn service() -> IngestionService {
        let mut config = Config::default();
        config.store.dims = 2;
        let index = VectorIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(LengthEmbedder),
            &config,
        );
        IngestionService::new(index)
    }

    #[tokio::test]
    async fn test_staged_upload_written_in_pieces() {
        let service = service();
        let mut upload = service.stage("notes.md").unwrap();
        let path = upload.path().to_path_buf();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("md"));

        for piece in ["Badges are required. ", "Visitors sign in ", "at reception."] {
            upload.write(piece.as_bytes()).await.unwrap();
        }
        assert_eq!(upload.bytes_written(), 51);

        let doc = service.ingest_staged(upload).await.unwrap();
        assert_eq!(doc.filename, "notes.md");
        assert_eq!(doc.chunks.len(), 1);
        assert!(doc.chunks[0].content.contains("Visitors sign in at reception."));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_dropped_upload_removes_temp_file() {
        let service = service();
        let mut upload = service.stage("report.pdf").unwrap();
        upload.write(b"%PDF-1.4").await.unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        drop(upload);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let service = service();
        let upload = service.stage("blank.txt").unwrap();
        let path = upload.path().to_path_buf();
        let err = service.ingest_staged(upload).await.unwrap_err();
        assert!(matches!(err, RagError::EmptyDocument));
        assert!(!path.exists());
    }

    #[test]
    fn test_stage_rejects_unsupported_extension() {
        let err = service().stage("setup.exe").err().unwrap();
        assert!(matches!(err, RagError::UnsupportedFormat(_)));
    }
}
