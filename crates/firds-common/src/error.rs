//! Error types shared by FIRDS components

use thiserror::Error;

/// Result type alias for shared FIRDS operations
pub type Result<T> = std::result::Result<T, FirdsError>;

/// Main error type for the shared table and utility layer
#[derive(Error, Debug)]
pub enum FirdsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column '{0}' not found in table")]
    MissingColumn(String),

    #[error("Column '{0}' already exists in table")]
    DuplicateColumn(String),

    #[error("Row {row} has {actual} cells, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}
