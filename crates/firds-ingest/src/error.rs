//! Error types for FIRDS ingestion

use firds_common::FirdsError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for every ingestion stage
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed document {source_name}: {message}")]
    MalformedDocument { source_name: String, message: String },

    #[error("Only {found} {file_type} links found, index {index} is out of range")]
    IndexOutOfRange {
        file_type: String,
        index: usize,
        found: usize,
    },

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Corrupt archive {}: {message}", .path.display())]
    CorruptArchive { path: PathBuf, message: String },

    #[error("No entry ending in '{suffix}' found in archive {}", .path.display())]
    NoMatchingEntry { path: PathBuf, suffix: String },

    #[error("Unsupported destination type: {0}")]
    UnsupportedDestination(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Download error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] FirdsError),
}

impl IngestError {
    pub(crate) fn malformed(source_name: impl Into<String>, message: impl ToString) -> Self {
        IngestError::MalformedDocument {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}
