//! Error taxonomy shared by the pipelines and the HTTP layer.

use thiserror::Error;

pub type RagResult<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Only PDF, TXT, MD files supported (got '{0}')")]
    UnsupportedFormat(String),

    #[error("{0}")]
    ExtractionFailed(String),

    #[error("File is empty")]
    EmptyDocument,

    #[error("Vector store unavailable: {0}")]
    VectorStoreUnavailable(String),

    #[error("No messages provided")]
    NoMessagesProvided,

    /// Only surfaced through `StreamEvent::Error`; streaming callers never
    /// receive it as an `Err`.
    #[error("Could not connect to LLM engine: {0}")]
    UpstreamModelUnreachable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    UnexpectedInternal(#[from] anyhow::Error),
}

impl RagError {
    /// Validation failures the client can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RagError::UnsupportedFormat(_)
                | RagError::ExtractionFailed(_)
                | RagError::EmptyDocument
                | RagError::NoMessagesProvided
                | RagError::InvalidRequest(_)
        )
    }

    /// Wrap a store failure, keeping the full cause chain in the message.
    pub fn store(err: anyhow::Error) -> Self {
        RagError::VectorStoreUnavailable(format!("{:#}", err))
    }
}
