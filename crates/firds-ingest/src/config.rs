//! Pipeline configuration

use crate::error::Result;
use crate::index::TARGET_FILE_TYPE;
use crate::store::Destination;
use firds_common::FirdsError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// FIRDS file index query for publications between 2021-01-17 and 2021-01-19.
pub const DEFAULT_INDEX_URL: &str = "https://registers.esma.europa.eu/solr/esma_registers_firds_files/select?q=*&fq=publication_date:%5B2021-01-17T00:00:00Z+TO+2021-01-19T23:59:59Z%5D&wt=xml&indent=true&start=0&rows=100";

/// Zero-based position of the DLTINS link to ingest.
pub const DEFAULT_LINK_INDEX: usize = 1;

/// Directory for downloaded and extracted files.
pub const DEFAULT_WORK_DIR: &str = "data";

/// Suffix of the document to pick out of the archive.
pub const DEFAULT_ARCHIVE_SUFFIX: &str = ".xml";

/// Where the annotated table is written.
pub const DEFAULT_DESTINATION_PATH: &str = "data/final/final.csv";

/// Download attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Pause between download attempts, in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Per-request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// HTTP download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total attempts per download, including the first
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    /// Draw a progress bar while downloading
    pub show_progress: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            show_progress: false,
        }
    }
}

impl FetchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// End-to-end ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// URL of the FIRDS file index
    pub index_url: String,
    /// `file_type` of the links to consider
    pub file_type: String,
    /// Zero-based position among matching links
    pub link_index: usize,
    pub work_dir: PathBuf,
    pub archive_suffix: String,
    pub destination: Destination,
    pub destination_path: String,
    pub fetch: FetchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            file_type: TARGET_FILE_TYPE.to_string(),
            link_index: DEFAULT_LINK_INDEX,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            archive_suffix: DEFAULT_ARCHIVE_SUFFIX.to_string(),
            destination: Destination::Local,
            destination_path: DEFAULT_DESTINATION_PATH.to_string(),
            fetch: FetchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `.env`, environment and defaults
    ///
    /// - `FIRDS_INDEX_URL`, `FIRDS_FILE_TYPE`, `FIRDS_LINK_INDEX`
    /// - `FIRDS_WORK_DIR`, `FIRDS_ARCHIVE_SUFFIX`
    /// - `FIRDS_DESTINATION` (local, s3, blob), `FIRDS_DESTINATION_PATH`
    /// - `FIRDS_MAX_RETRIES`, `FIRDS_RETRY_DELAY_SECS`, `FIRDS_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            index_url: std::env::var("FIRDS_INDEX_URL").unwrap_or(defaults.index_url),
            file_type: std::env::var("FIRDS_FILE_TYPE").unwrap_or(defaults.file_type),
            link_index: env_parse("FIRDS_LINK_INDEX")?.unwrap_or(defaults.link_index),
            work_dir: std::env::var("FIRDS_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            archive_suffix: std::env::var("FIRDS_ARCHIVE_SUFFIX")
                .unwrap_or(defaults.archive_suffix),
            destination: match std::env::var("FIRDS_DESTINATION") {
                Ok(kind) => kind.parse()?,
                Err(_) => defaults.destination,
            },
            destination_path: std::env::var("FIRDS_DESTINATION_PATH")
                .unwrap_or(defaults.destination_path),
            fetch: FetchConfig {
                max_retries: env_parse("FIRDS_MAX_RETRIES")?
                    .unwrap_or(defaults.fetch.max_retries),
                retry_delay_secs: env_parse("FIRDS_RETRY_DELAY_SECS")?
                    .unwrap_or(defaults.fetch.retry_delay_secs),
                timeout_secs: env_parse("FIRDS_TIMEOUT_SECS")?
                    .unwrap_or(defaults.fetch.timeout_secs),
                show_progress: defaults.fetch.show_progress,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.index_url.trim().is_empty() {
            return Err(config_error("Index URL cannot be empty"));
        }

        if self.file_type.trim().is_empty() {
            return Err(config_error("File type cannot be empty"));
        }

        if self.archive_suffix.is_empty() {
            return Err(config_error("Archive suffix cannot be empty"));
        }

        if self.destination_path.trim().is_empty() {
            return Err(config_error("Destination path cannot be empty"));
        }

        if self.fetch.max_retries == 0 {
            return Err(config_error("Max retries must be greater than 0"));
        }

        if self.fetch.timeout_secs == 0 {
            return Err(config_error("Timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Where the downloaded index is saved
    pub fn index_path(&self) -> PathBuf {
        self.work_dir.join("index.xml")
    }

    /// Where the downloaded archive is saved
    pub fn archive_path(&self) -> PathBuf {
        self.work_dir.join("archive.zip")
    }

    /// Where archive contents are unpacked
    pub fn extract_dir(&self) -> PathBuf {
        self.work_dir.join("extracted_xml")
    }
}

fn config_error(message: &str) -> crate::error::IngestError {
    FirdsError::Config(message.to_string()).into()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| config_error(&format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}
