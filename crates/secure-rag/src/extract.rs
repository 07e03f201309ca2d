//! Plain-text extraction for uploaded documents.
//!
//! Supported formats are PDF, plain text and Markdown. PDF parsing is CPU
//! bound and runs on the blocking pool; text formats are read as strict
//! UTF-8.

use std::path::Path;

use crate::error::{RagError, RagResult};

/// Document formats accepted by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Txt,
    Md,
}

impl SourceFormat {
    /// Resolve a file extension (`"pdf"`, `".PDF"`, `"md"`, ...).
    pub fn from_extension(ext: &str) -> RagResult<Self> {
        let normalized = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "pdf" => Ok(SourceFormat::Pdf),
            "txt" => Ok(SourceFormat::Txt),
            "md" => Ok(SourceFormat::Md),
            _ => Err(RagError::UnsupportedFormat(ext.to_string())),
        }
    }

    pub fn from_filename(filename: &str) -> RagResult<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| RagError::UnsupportedFormat(filename.to_string()))?;
        Self::from_extension(ext)
    }

    /// Extension without the dot, as used for temp file suffixes.
    pub fn extension(&self) -> &'static str {
        match self {
            SourceFormat::Pdf => "pdf",
            SourceFormat::Txt => "txt",
            SourceFormat::Md => "md",
        }
    }
}

/// Extract the full text of the file at `path`.
///
/// Returns [`RagError::EmptyDocument`] when nothing but whitespace remains.
pub async fn extract_file(path: &Path, format: SourceFormat) -> RagResult<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        RagError::ExtractionFailed(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let text = match format {
        SourceFormat::Pdf => tokio::task::spawn_blocking(move || extract_pdf_bytes(&bytes))
            .await
            .map_err(|e| {
                RagError::ExtractionFailed(format!("Failed to parse PDF file: {}", e))
            })??,
        SourceFormat::Txt | SourceFormat::Md => String::from_utf8(bytes).map_err(|e| {
            RagError::ExtractionFailed(format!("File is not valid UTF-8: {}", e))
        })?,
    };

    if text.trim().is_empty() {
        return Err(RagError::EmptyDocument);
    }
    Ok(text)
}

/// Parse a PDF held in memory, one page at a time.
pub fn extract_pdf_bytes(bytes: &[u8]) -> RagResult<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| RagError::ExtractionFailed(format!("Failed to parse PDF file: {}", e)))?;
    Ok(join_pages(&pages))
}

/// Trim each page, drop empty ones, and join the rest with newlines.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SourceFormat::from_extension("pdf").unwrap(), SourceFormat::Pdf);
        assert_eq!(SourceFormat::from_extension(".MD").unwrap(), SourceFormat::Md);
        assert_eq!(SourceFormat::from_filename("notes.Txt").unwrap(), SourceFormat::Txt);
        assert!(matches!(
            SourceFormat::from_filename("setup.exe"),
            Err(RagError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            SourceFormat::from_filename("README"),
            Err(RagError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_join_pages_drops_empty_pages() {
        assert_eq!(join_pages(&["Hello", "World", ""]), "Hello\nWorld");
        assert_eq!(join_pages(&["  a  ", "\n\n", "b"]), "a\nb");
        assert_eq!(join_pages::<&str>(&[]), "");
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let err = extract_pdf_bytes(b"not a pdf").unwrap_err();
        assert!(matches!(err, RagError::ExtractionFailed(_)));
        assert!(err.to_string().contains("Failed to parse PDF file"));
    }

    #[tokio::test]
    async fn test_text_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Line one.\nLine two.").unwrap();
        let text = extract_file(file.path(), SourceFormat::Txt).await.unwrap();
        assert_eq!(text, "Line one.\nLine two.");
    }

    #[tokio::test]
    async fn test_whitespace_file_is_empty_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "  \n\t ").unwrap();
        let err = extract_file(file.path(), SourceFormat::Md).await.unwrap_err();
        assert!(matches!(err, RagError::EmptyDocument));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_extraction_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xff, 0xfe, 0x00, 0x41]).unwrap();
        let err = extract_file(file.path(), SourceFormat::Txt).await.unwrap_err();
        assert!(matches!(err, RagError::ExtractionFailed(_)));
    }
}
