//! Schema-version gate consulted before every transfer.

use std::time::Duration;

use serde::Serialize;

use super::paths::SHARED_METADATA_PATH;
use super::{timed, SyncError, SyncResult};
use crate::models::SharedSyncMetadata;
use crate::storage::{download_json, ProviderError, StorageProvider};

/// Result of comparing the remote schema version with the local one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "status")]
pub enum Compatibility {
    /// No shared metadata exists yet.
    FirstSync,
    Compatible { remote: SharedSyncMetadata },
    /// The remote was written by a newer schema; nothing may be transferred.
    Blocked {
        reason: String,
        local_version: i32,
        remote_version: i32,
    },
}

impl Compatibility {
    /// Compare a downloaded document against the local schema version.
    #[must_use]
    pub fn evaluate(local_version: i32, remote: Option<SharedSyncMetadata>) -> Self {
        match remote {
            None => Self::FirstSync,
            Some(remote) if remote.schema_version > local_version => Self::Blocked {
                reason: format!(
                    "Remote data uses schema version {} (app {}), this device supports up to {}. \
                     Update the app before syncing.",
                    remote.schema_version, remote.app_version, local_version
                ),
                local_version,
                remote_version: remote.schema_version,
            },
            Some(remote) => Self::Compatible { remote },
        }
    }

    /// Schema version recorded remotely, if any.
    #[must_use]
    pub const fn remote_version(&self) -> Option<i32> {
        match self {
            Self::FirstSync => None,
            Self::Compatible { remote } => Some(remote.schema_version),
            Self::Blocked { remote_version, .. } => Some(*remote_version),
        }
    }

    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    /// The blocking reason as an error, if any.
    #[must_use]
    pub fn blocked_error(&self) -> Option<SyncError> {
        match self {
            Self::Blocked {
                reason,
                local_version,
                remote_version,
            } => Some(SyncError::SchemaBlocked {
                reason: reason.clone(),
                local_version: *local_version,
                remote_version: *remote_version,
            }),
            _ => None,
        }
    }
}

/// Download the shared metadata and evaluate it.
///
/// A missing document means first sync. Any other failure, including an
/// unreadable document, is returned as an error and never treated as absent.
pub async fn check_compatibility(
    provider: &dyn StorageProvider,
    local_version: i32,
    call_timeout: Duration,
) -> SyncResult<Compatibility> {
    let downloaded = timed(
        call_timeout,
        SHARED_METADATA_PATH,
        download_json::<SharedSyncMetadata>(provider, SHARED_METADATA_PATH),
    )
    .await;

    let remote = match downloaded {
        Ok(metadata) => Some(metadata),
        Err(ProviderError::NotFound { .. }) => None,
        Err(error) => return Err(error.into()),
    };

    let compatibility = Compatibility::evaluate(local_version, remote);
    match &compatibility {
        Compatibility::FirstSync => tracing::info!("No shared sync metadata; first sync"),
        Compatibility::Compatible { remote } => tracing::debug!(
            "Remote schema {} compatible with local {}",
            remote.schema_version,
            local_version
        ),
        Compatibility::Blocked { reason, .. } => tracing::warn!("{reason}"),
    }
    Ok(compatibility)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{upload_json, LocalFolderProvider};
    use chrono::Utc;

    fn metadata(schema_version: i32) -> SharedSyncMetadata {
        SharedSyncMetadata {
            schema_version,
            app_version: "2.0.0".to_string(),
            device_id: "other".to_string(),
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn newer_remote_schema_blocks() {
        let result = Compatibility::evaluate(5, Some(metadata(6)));
        let Compatibility::Blocked {
            local_version,
            remote_version,
            reason,
        } = &result
        else {
            panic!("expected blocked, got {result:?}");
        };
        assert_eq!((*local_version, *remote_version), (5, 6));
        assert_eq!(result.remote_version(), Some(6));
        assert!(reason.contains("schema version 6"));
        assert!(matches!(
            result.blocked_error(),
            Some(SyncError::SchemaBlocked { .. })
        ));
    }

    #[test]
    fn equal_or_older_remote_schema_proceeds() {
        assert!(!Compatibility::evaluate(5, Some(metadata(5))).is_blocked());
        assert!(!Compatibility::evaluate(5, Some(metadata(4))).is_blocked());
        assert_eq!(Compatibility::evaluate(5, None), Compatibility::FirstSync);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_document_is_first_sync() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalFolderProvider::new(dir.path());

        let result = check_compatibility(&provider, 2, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result, Compatibility::FirstSync);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreadable_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SHARED_METADATA_PATH), b"{ not json").unwrap();
        let provider = LocalFolderProvider::new(dir.path());

        let result = check_compatibility(&provider, 2, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(SyncError::Transport(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reads_uploaded_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalFolderProvider::new(dir.path());
        upload_json(&provider, SHARED_METADATA_PATH, &metadata(3))
            .await
            .unwrap();

        let result = check_compatibility(&provider, 2, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result.is_blocked());
    }
}
