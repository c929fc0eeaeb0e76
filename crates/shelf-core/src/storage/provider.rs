//! Remote storage contract shared by every backend.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::auth::AuthError;

/// Failures every adapter normalizes its SDK/HTTP errors into.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Not authenticated with the storage provider")]
    NotAuthenticated,
    #[error("Remote object not found: {path}")]
    NotFound { path: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid provider configuration: {0}")]
    InvalidConfiguration(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<AuthError> for ProviderError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotAuthenticated => Self::NotAuthenticated,
            AuthError::InvalidConfiguration(message) => Self::InvalidConfiguration(message),
            other => Self::Transport(other.to_string()),
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// One entry of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    /// Last path component
    pub name: String,
    /// Path relative to the provider root
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

/// Storage usage in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    pub used: u64,
    pub total: u64,
    pub available: u64,
}

impl Quota {
    #[must_use]
    pub const fn new(used: u64, total: u64) -> Self {
        Self {
            used,
            total,
            available: total.saturating_sub(used),
        }
    }
}

/// Capability set of a remote backend.
///
/// Remote paths are `/`-separated and relative to the provider's configured
/// root. Implementations know nothing about the catalog.
#[async_trait::async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend name for logs and status.
    fn name(&self) -> &str;

    /// Whether credentials are present. Does not touch the network.
    fn is_authenticated(&self) -> bool;

    /// Refresh the access token if it expires within the refresh buffer.
    async fn ensure_valid_token(&self) -> ProviderResult<()>;

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> ProviderResult<()>;

    /// Fails with `NotFound` when the object does not exist.
    async fn download_file(&self, remote_path: &str, local_path: &Path) -> ProviderResult<()>;

    async fn delete_file(&self, remote_path: &str) -> ProviderResult<()>;

    /// Direct children of `prefix`. A missing prefix lists as empty.
    async fn list_files(&self, prefix: &str) -> ProviderResult<Vec<RemoteEntry>>;

    /// Best-effort usage figures; `None` when the backend has no notion of quota.
    async fn get_quota(&self) -> ProviderResult<Option<Quota>>;
}

/// Serialize `value` and upload it as `remote_path`.
///
/// The intermediate file is removed on every exit path.
pub async fn upload_json<T>(
    provider: &dyn StorageProvider,
    remote_path: &str,
    value: &T,
) -> ProviderResult<()>
where
    T: Serialize + Sync + ?Sized,
{
    let file = NamedTempFile::new()?;
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(file.path(), bytes).await?;
    provider.upload_file(file.path(), remote_path).await
}

/// Download `remote_path` and deserialize it.
///
/// The intermediate file is removed on every exit path.
pub async fn download_json<T: DeserializeOwned>(
    provider: &dyn StorageProvider,
    remote_path: &str,
) -> ProviderResult<T> {
    let file = NamedTempFile::new()?;
    provider.download_file(remote_path, file.path()).await?;
    let bytes = tokio::fs::read(file.path()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_available_never_underflows() {
        assert_eq!(Quota::new(10, 100).available, 90);
        assert_eq!(Quota::new(120, 100).available, 0);
    }

    #[test]
    fn auth_errors_map_into_taxonomy() {
        assert!(matches!(
            ProviderError::from(AuthError::NotAuthenticated),
            ProviderError::NotAuthenticated
        ));
        assert!(matches!(
            ProviderError::from(AuthError::Http("timed out".to_string())),
            ProviderError::Transport(message) if message.contains("timed out")
        ));
    }
}
