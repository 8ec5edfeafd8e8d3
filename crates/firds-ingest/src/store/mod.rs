//! Table persistence to local disk and object stores

use crate::error::{IngestError, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use firds_common::Table;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub mod config;

pub use config::ObjectStoreConfig;

/// Where a finished table is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Local,
    S3,
    Blob,
}

impl Destination {
    /// URI scheme for object destinations
    pub fn scheme(&self) -> Option<&'static str> {
        match self {
            Self::Local => None,
            Self::S3 => Some("s3"),
            Self::Blob => Some("az"),
        }
    }

    /// Full location string for `path` at this destination
    pub fn uri(&self, path: &str) -> String {
        match self.scheme() {
            Some(scheme) => format!("{}://{}", scheme, path),
            None => path.to_string(),
        }
    }
}

impl FromStr for Destination {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            "blob" => Ok(Self::Blob),
            other => Err(IngestError::UnsupportedDestination(other.to_string())),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// Write-only access to an object store addressed by `scheme://bucket/key`
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, uri: &str, data: Vec<u8>) -> Result<()>;
}

/// Split `scheme://bucket/key` into its parts
pub fn parse_object_uri(uri: &str) -> Result<(&str, &str, &str)> {
    let invalid = || IngestError::InvalidArgument(format!("invalid object URI: {}", uri));

    let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
    let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
    if scheme.is_empty() || bucket.is_empty() || key.is_empty() {
        return Err(invalid());
    }
    Ok((scheme, bucket, key))
}

/// [`ObjectStore`] backed by an S3-compatible endpoint
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: &ObjectStoreConfig) -> Self {
        debug!(endpoint = ?config.endpoint, region = %config.region, "Initializing object store client");

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "firds-store",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put(&self, uri: &str, data: Vec<u8>) -> Result<()> {
        let (_, bucket, key) = parse_object_uri(uri)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("text/csv")
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| IngestError::Storage(format!("failed to upload {}: {}", uri, e)))?;

        info!("Successfully uploaded to {}", uri);
        Ok(())
    }
}

/// Persists finished tables as CSV
#[derive(Clone, Default)]
pub struct TableStore {
    s3: Option<Arc<dyn ObjectStore>>,
    blob: Option<Arc<dyn ObjectStore>>,
}

impl TableStore {
    /// Local writes only; object destinations fail with `Storage`
    pub fn local_only() -> Self {
        Self::default()
    }

    /// S3 client from `S3_*` variables, blob client from `AZ_*` variables
    pub fn from_env() -> Self {
        Self::local_only()
            .with_s3(Arc::new(S3ObjectStore::new(&ObjectStoreConfig::from_env("S3"))))
            .with_blob(Arc::new(S3ObjectStore::new(&ObjectStoreConfig::from_env("AZ"))))
    }

    pub fn with_s3(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.s3 = Some(store);
        self
    }

    pub fn with_blob(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.blob = Some(store);
        self
    }

    /// Write `table` to `path` at `destination` and return the final location.
    ///
    /// Local writes create missing parent directories. Object writes go to
    /// `s3://<path>` or `az://<path>`.
    #[instrument(skip(self, table), fields(rows = table.len()))]
    pub async fn store(&self, table: &Table, destination: Destination, path: &str) -> Result<String> {
        let location = destination.uri(path);

        match destination {
            Destination::Local => {
                let path = Path::new(path);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                table.write_csv_file(path)?;
            },
            Destination::S3 | Destination::Blob => {
                let store = self.object_store(destination)?;
                store.put(&location, table.to_csv_bytes()?).await?;
            },
        }

        info!(destination = %destination, location = %location, rows = table.len(), "Stored table");
        Ok(location)
    }

    fn object_store(&self, destination: Destination) -> Result<&Arc<dyn ObjectStore>> {
        let store = match destination {
            Destination::S3 => self.s3.as_ref(),
            Destination::Blob => self.blob.as_ref(),
            Destination::Local => None,
        };
        store.ok_or_else(|| {
            IngestError::Storage(format!("no object store configured for {}", destination))
        })
    }
}
