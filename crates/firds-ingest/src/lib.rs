//! FIRDS Ingest Library
//!
//! Downloads ESMA FIRDS delta reports (DLTINS) and turns them into annotated
//! CSV tables.
//!
//! # Stages
//!
//! - [`index`]: pick a download link out of the FIRDS file index
//! - [`fetch`]: HTTP downloads with retry
//! - [`archive`]: unpack the downloaded zip
//! - [`extract`]: stream instrument records out of the report
//! - [`annotate`]: derived `a_count` / `contains_a` columns
//! - [`store`]: write the table locally or to an object store
//! - [`pipeline`]: all of the above, in order
//!
//! # Example
//!
//! ```no_run
//! use firds_ingest::config::PipelineConfig;
//! use firds_ingest::pipeline;
//! use firds_ingest::store::TableStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let report = pipeline::run(config, TableStore::from_env()).await?;
//!     println!("{} records written to {}", report.records, report.destination_path);
//!     Ok(())
//! }
//! ```

pub mod annotate;
pub mod archive;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod pipeline;
pub mod store;

mod xml;

pub use error::{IngestError, Result};
