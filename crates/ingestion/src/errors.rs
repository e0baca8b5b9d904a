//! Ingestion service error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Fetch failed for {url}: status {status}")]
    Fetch { url: String, status: u16 },

    #[error("Fetch failed for {url}: {message}")]
    FetchTransport { url: String, message: String },

    #[error("PDF parse error: {0}")]
    Parse(String),

    #[error("Material not found: {0}")]
    MaterialNotFound(String),

    #[error("Material is not approved: {0}")]
    NotApproved(String),

    #[error("Material has no storage URL: {0}")]
    MissingStorageUrl(String),

    #[error("Unsupported mime type: {0}")]
    UnsupportedMime(String),

    #[error("No extractable text")]
    NoExtractableText,

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<studyforge_common::errors::AppError> for IngestionError {
    fn from(e: studyforge_common::errors::AppError) -> Self {
        use studyforge_common::errors::AppError;
        match e {
            AppError::MaterialNotFound { id } => IngestionError::MaterialNotFound(id),
            AppError::EmbeddingError { message } => IngestionError::Embedding(message),
            other => IngestionError::Database(other.to_string()),
        }
    }
}
