//! HTTP downloads with retry

use crate::config::FetchConfig;
use crate::error::{IngestError, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Url};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument, warn};

/// Downloads files to disk, retrying transient network failures
pub struct Downloader {
    client: Client,
    config: FetchConfig,
}

impl Downloader {
    pub fn new(config: FetchConfig) -> Result<Self> {
        if config.max_retries == 0 {
            return Err(IngestError::InvalidArgument(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("firds-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// Download `url` to `destination`, creating parent directories.
    ///
    /// Network failures (connection errors, timeouts, non-success statuses)
    /// are retried up to `max_retries` attempts in total with a fixed delay;
    /// the last one is returned unchanged. Invalid URLs and local I/O errors
    /// fail immediately. The body is written to `<destination>.part` and only
    /// renamed to `destination` once complete.
    #[instrument(skip(self))]
    pub async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        if url.trim().is_empty() {
            return Err(IngestError::InvalidArgument("URL cannot be empty".to_string()));
        }
        let url = Url::parse(url)
            .map_err(|e| IngestError::InvalidArgument(format!("invalid URL '{}': {}", url, e)))?;

        let max_retries = self.config.max_retries;
        let mut attempt = 1;
        loop {
            info!(attempt, %url, "Downloading");

            match self.download_once(url.clone(), destination).await {
                Ok(bytes) => {
                    info!(bytes, path = %destination.display(), "Saved download");
                    return Ok(destination.to_path_buf());
                },
                Err(IngestError::Network(e)) if !e.is_builder() => {
                    warn!(attempt, error = %e, "Download attempt failed");
                    if attempt >= max_retries {
                        error!(%url, "All {} download attempts failed", max_retries);
                        return Err(IngestError::Network(e));
                    }
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay()).await;
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn download_once(&self, url: Url, destination: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part = part_path(destination);
        let progress = self.progress_bar(response.content_length(), destination);

        let written = match write_body(response, &part, &progress).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                progress.abandon();
                return Err(e);
            },
        };

        tokio::fs::rename(&part, destination).await?;
        progress.finish_and_clear();
        Ok(written)
    }

    fn progress_bar(&self, total: Option<u64>, destination: &Path) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total.unwrap_or(0));
        let style = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message(format!("Downloading {}", destination.display()));
        pb
    }
}

async fn write_body(response: reqwest::Response, part: &Path, progress: &ProgressBar) -> Result<u64> {
    let mut file = tokio::fs::File::create(part).await?;
    let mut written = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.set_position(written);
    }

    file.flush().await?;
    Ok(written)
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
