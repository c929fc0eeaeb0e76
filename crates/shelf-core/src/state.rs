//! Shared cross-platform state types.

use serde::{Deserialize, Serialize};

/// Phase of the sync state machine.
///
/// `Idle -> CheckingCompatibility -> {Blocked | TransportError} | Transferring
/// -> Committing -> {Success | PartialFailure}`, plus `Failed` when a local
/// store error aborts the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    #[default]
    Idle,
    CheckingCompatibility,
    Blocked,
    TransportError,
    Transferring,
    Committing,
    Success,
    PartialFailure,
    Failed,
}

impl SyncPhase {
    /// Whether the phase ends a run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Blocked
                | Self::TransportError
                | Self::Success
                | Self::PartialFailure
                | Self::Failed
        )
    }
}
