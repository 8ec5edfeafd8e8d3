use serde::{Deserialize, Serialize};
use std::env;

/// Connection settings for an S3-compatible object store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl ObjectStoreConfig {
    /// Read `<PREFIX>_ENDPOINT`, `<PREFIX>_REGION`, `<PREFIX>_ACCESS_KEY`,
    /// `<PREFIX>_SECRET_KEY` and `<PREFIX>_PATH_STYLE`.
    ///
    /// Keys fall back to `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, then
    /// to empty strings so that a store which is never written to does not
    /// need credentials.
    pub fn from_env(prefix: &str) -> Self {
        let var = |name: &str| env::var(format!("{}_{}", prefix, name));

        Self {
            endpoint: var("ENDPOINT").ok().filter(|e| !e.trim().is_empty()),
            region: var("REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key: var("ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_default(),
            secret_key: var("SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_default(),
            path_style: var("PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Self-hosted S3-compatible endpoint (MinIO, Azurite gateways, mock
    /// servers) with path-style addressing and default local credentials
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}
