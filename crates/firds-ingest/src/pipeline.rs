//! End-to-end FIRDS ingestion
//!
//! fetch index -> select link -> fetch archive -> unpack -> extract ->
//! annotate -> store. Each stage's output feeds the next; the first failure
//! halts the run and nothing is persisted.

use crate::annotate::annotate;
use crate::archive::unpack_first;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::extract::{collect_table, extract};
use crate::fetch::Downloader;
use crate::index::select_link_from_file;
use crate::store::{Destination, TableStore};
use firds_common::checksum::sha256_file;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub download_link: String,
    pub archive_path: PathBuf,
    pub archive_sha256: String,
    pub document_path: PathBuf,
    pub records: usize,
    pub skipped_records: usize,
    pub columns: Vec<String>,
    pub destination: Destination,
    /// Final location, including the `s3://` or `az://` scheme for objects
    pub destination_path: String,
}

pub struct Pipeline {
    config: PipelineConfig,
    downloader: Downloader,
    store: TableStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: TableStore) -> Result<Self> {
        config.validate()?;
        let downloader = Downloader::new(config.fetch.clone())?;

        Ok(Self {
            config,
            downloader,
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage once
    #[instrument(skip(self), fields(index_url = %self.config.index_url, link_index = self.config.link_index))]
    pub async fn run(&self) -> Result<PipelineReport> {
        match self.execute().await {
            Ok(report) => {
                match serde_json::to_string(&report) {
                    Ok(json) => info!(report = %json, "Pipeline completed"),
                    Err(e) => warn!(error = %e, "Failed to serialize pipeline report"),
                }
                Ok(report)
            },
            Err(e) => {
                error!(
                    error = %e,
                    work_dir = %self.config.work_dir.display(),
                    destination = %self.config.destination,
                    "Pipeline failed"
                );
                Err(e)
            },
        }
    }

    async fn execute(&self) -> Result<PipelineReport> {
        let config = &self.config;

        info!("Step 1: Downloading file index");
        let index_path = self
            .downloader
            .download(&config.index_url, &config.index_path())
            .await?;

        info!("Step 2: Selecting {} link #{}", config.file_type, config.link_index);
        let download_link =
            select_link_from_file(&index_path, &config.file_type, config.link_index)?;

        info!("Step 3: Downloading archive");
        let archive_path = self
            .downloader
            .download(&download_link, &config.archive_path())
            .await?;
        let archive_sha256 = sha256_file(&archive_path)?;
        info!(path = %archive_path.display(), sha256 = %archive_sha256, "Archive downloaded");

        info!("Step 4: Unpacking archive");
        let document_path =
            unpack_first(&archive_path, config.extract_dir(), &config.archive_suffix)?;

        info!("Step 5: Extracting instrument records");
        let mut records = extract(&document_path)?;
        let mut table = collect_table(records.by_ref())?;
        let skipped_records = records.skipped();
        drop(records);
        info!(records = table.len(), skipped = skipped_records, "Extracted records");

        info!("Step 6: Annotating table");
        annotate(&mut table)?;

        info!("Step 7: Storing table");
        let destination_path = self
            .store
            .store(&table, config.destination, &config.destination_path)
            .await?;

        Ok(PipelineReport {
            download_link,
            archive_path,
            archive_sha256,
            document_path,
            records: table.len(),
            skipped_records,
            columns: table.columns().to_vec(),
            destination: config.destination,
            destination_path,
        })
    }
}

/// Build a [`Pipeline`] and run it once
pub async fn run(config: PipelineConfig, store: TableStore) -> Result<PipelineReport> {
    Pipeline::new(config, store)?.run().await
}
