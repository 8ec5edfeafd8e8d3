//! FIRDS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the FIRDS ingest workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`FirdsError`] and the [`Result`] alias
//! - **Table**: the in-memory string table with CSV read/write
//! - **Checksums**: SHA-256 of downloaded archives and produced files
//! - **Logging**: `tracing` subscriber configuration
//!
//! # Example
//!
//! ```no_run
//! use firds_common::{Result, Table};
//!
//! fn count_rows(path: &str) -> Result<usize> {
//!     let table = Table::read_csv(path)?;
//!     Ok(table.len())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod table;

// Re-export commonly used types
pub use error::{FirdsError, Result};
pub use table::Table;
