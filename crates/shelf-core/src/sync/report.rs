//! Structured results of a sync run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::gate::Compatibility;
use super::merge::{MergeCounts, MergeOutcome};
use super::SyncError;
use crate::models::EntityKind;
use crate::state::SyncPhase;

/// Result of one orchestrator step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub ok: bool,
    /// Nothing needed transferring
    pub skipped: bool,
    /// The remote object does not exist (not an error)
    pub not_found: bool,
    pub error: Option<SyncError>,
}

impl StepResult {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn skipped() -> Self {
        Self {
            ok: true,
            skipped: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self {
            not_found: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failed(error: SyncError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Build from a step's result; `NotFound` is reported, not failed.
    #[must_use]
    pub fn from_result(result: Result<(), SyncError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(SyncError::NotFound(_)) => Self::not_found(),
            Err(error) => Self::failed(error),
        }
    }

    /// `ok`, or the remote simply had nothing to download.
    #[must_use]
    pub const fn ok_or_not_found(&self) -> bool {
        self.ok || self.not_found
    }
}

/// A single asset that could not be transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFailure {
    pub name: String,
    pub error: SyncError,
}

/// Per-asset tally for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReport {
    pub transferred: Vec<String>,
    /// Already present on the destination
    pub skipped: usize,
    pub failed: Vec<AssetFailure>,
}

impl AssetReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Step result for the whole asset batch.
    #[must_use]
    pub fn step(&self) -> StepResult {
        if self.is_complete() {
            if self.transferred.is_empty() {
                StepResult::skipped()
            } else {
                StepResult::ok()
            }
        } else {
            StepResult::failed(SyncError::Transport(format!(
                "{} of {} asset(s) failed",
                self.failed.len(),
                self.failed.len() + self.transferred.len()
            )))
        }
    }
}

/// Summary of an applied entity merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub tables: Vec<(EntityKind, MergeCounts)>,
    pub totals: MergeCounts,
    pub links_changed: bool,
}

impl From<&MergeOutcome> for MergeSummary {
    fn from(outcome: &MergeOutcome) -> Self {
        Self {
            tables: outcome.table_counts(),
            totals: outcome.totals(),
            links_changed: outcome.links_changed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncDirection {
    Up,
    Down,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    Success,
    /// Some steps failed; see the step results
    PartialFailure,
    /// The compatibility gate refused; nothing was transferred
    Blocked,
    /// The compatibility check could not reach the remote
    TransportError,
    /// Stopped between steps by `cancel()`
    Cancelled,
    /// A local store error (merge commit) ended the run; nothing was committed
    Failed,
}

impl SyncOutcome {
    /// Terminal phase for this outcome. A cancelled run returns to idle.
    #[must_use]
    pub const fn phase(self) -> SyncPhase {
        match self {
            Self::Success => SyncPhase::Success,
            Self::PartialFailure => SyncPhase::PartialFailure,
            Self::Blocked => SyncPhase::Blocked,
            Self::TransportError => SyncPhase::TransportError,
            Self::Cancelled => SyncPhase::Idle,
            Self::Failed => SyncPhase::Failed,
        }
    }
}

/// Aggregated result of one `sync_up` or `sync_down`.
///
/// Steps that never ran are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub outcome: SyncOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub compatibility: Option<Compatibility>,
    /// Error that ended the run early (gate, cancellation, local store)
    pub error: Option<SyncError>,
    pub device_metadata: Option<StepResult>,
    pub data: Option<StepResult>,
    pub settings: Option<StepResult>,
    pub assets: Option<StepResult>,
    pub asset_report: AssetReport,
    pub shared_metadata: Option<StepResult>,
    pub merge: Option<MergeSummary>,
}

impl SyncReport {
    pub(crate) fn new(direction: SyncDirection) -> Self {
        let now = Utc::now();
        Self {
            direction,
            outcome: SyncOutcome::Success,
            started_at: now,
            finished_at: now,
            compatibility: None,
            error: None,
            device_metadata: None,
            data: None,
            settings: None,
            assets: None,
            asset_report: AssetReport::default(),
            shared_metadata: None,
            merge: None,
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.outcome == SyncOutcome::Success
    }

    #[must_use]
    pub fn blocked(&self) -> bool {
        self.outcome == SyncOutcome::Blocked
    }

    /// Steps that ran and neither succeeded nor found nothing.
    pub fn failed_steps(&self) -> impl Iterator<Item = (&'static str, &StepResult)> {
        [
            ("deviceMetadata", &self.device_metadata),
            ("data", &self.data),
            ("settings", &self.settings),
            ("assets", &self.assets),
            ("sharedMetadata", &self.shared_metadata),
        ]
        .into_iter()
        .filter_map(|(name, step)| step.as_ref().map(|step| (name, step)))
        .filter(|(_, step)| !step.ok_or_not_found())
    }

    pub(crate) fn finish(mut self, outcome: SyncOutcome) -> Self {
        self.outcome = outcome;
        self.finished_at = Utc::now();
        self
    }
}

/// Snapshot of orchestrator state for a status screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub initialized: bool,
    pub in_progress: bool,
    pub phase: SyncPhase,
    pub provider: Option<String>,
    pub authenticated: bool,
    pub device_id: Option<String>,
    pub last_report: Option<SyncReport>,
}
