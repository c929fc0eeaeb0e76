//! Error taxonomy surfaced by the orchestrator.

use serde::Serialize;
use thiserror::Error;

use crate::storage::ProviderError;

/// Why a sync operation could not run, or stopped early.
///
/// A run in which only some steps failed is not an error; it ends as
/// [`SyncOutcome::PartialFailure`](super::SyncOutcome) with itemized results.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum SyncError {
    #[error("Sync is not initialized; configure a provider and call initialize() first")]
    NotInitialized,
    #[error("Not authenticated with the storage provider")]
    NotAuthenticated,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Remote object not found: {0}")]
    NotFound(String),
    #[error("Sync blocked: {reason}")]
    #[serde(rename_all = "camelCase")]
    SchemaBlocked {
        reason: String,
        local_version: i32,
        remote_version: i32,
    },
    #[error("A sync is already running")]
    AlreadyRunning,
    #[error("Sync cancelled")]
    Cancelled,
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Local store error: {0}")]
    LocalStore(String),
}

impl SyncError {
    /// Whether re-running the same step could succeed without user action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<ProviderError> for SyncError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::NotAuthenticated => Self::NotAuthenticated,
            ProviderError::NotFound { path } => Self::NotFound(path),
            ProviderError::InvalidConfiguration(message) => Self::InvalidConfiguration(message),
            ProviderError::Transport(message) => Self::Transport(message),
            // Local staging file failures are not the remote's fault
            ProviderError::Io(error) => Self::LocalStore(error.to_string()),
            ProviderError::Serialization(error) => Self::Transport(error.to_string()),
        }
    }
}

impl From<crate::Error> for SyncError {
    fn from(error: crate::Error) -> Self {
        Self::LocalStore(error.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        Self::LocalStore(error.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn provider_errors_map_into_taxonomy() {
        assert_eq!(
            SyncError::from(ProviderError::not_found("settings.json")),
            SyncError::NotFound("settings.json".to_string())
        );
        assert_eq!(
            SyncError::from(ProviderError::NotAuthenticated),
            SyncError::NotAuthenticated
        );
        assert!(SyncError::from(ProviderError::Transport("reset".into())).is_retryable());
        assert!(!SyncError::NotInitialized.is_retryable());
    }

    #[test]
    fn blocked_message_carries_reason() {
        let error = SyncError::SchemaBlocked {
            reason: "Remote schema 6 is newer than local schema 5".to_string(),
            local_version: 5,
            remote_version: 6,
        };
        assert_eq!(
            error.to_string(),
            "Sync blocked: Remote schema 6 is newer than local schema 5"
        );
    }
}
