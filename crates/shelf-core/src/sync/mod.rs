//! Sync engine: compatibility gate, entity merge and the orchestrator that
//! sequences transfers through a [`StorageProvider`](crate::storage::StorageProvider).

mod assets;
mod device;
mod error;
mod gate;
pub mod merge;
mod orchestrator;
pub mod paths;
mod report;

use std::future::Future;
use std::time::Duration;

pub use assets::{download_covers, local_cover_names, upload_covers, TransferLimits};
pub use device::{load_or_create_device_id, DEVICE_ID_KEY};
pub use error::{SyncError, SyncResult};
pub use gate::{check_compatibility, Compatibility};
pub use merge::{MergeConflict, MergeCounts, MergeOutcome, TableMerge, TieBreak};
pub use orchestrator::{ConnectionCheck, SyncOrchestrator};
pub use report::{
    AssetFailure, AssetReport, MergeSummary, StepResult, SyncDirection, SyncOutcome, SyncReport,
    SyncStatus,
};

use crate::storage::{ProviderError, ProviderResult};

/// Bound a single provider call. An elapsed call becomes a transport error.
pub(crate) async fn timed<T, F>(limit: Duration, what: &str, call: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Transport(format!(
            "{what} timed out after {}s",
            limit.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn timed_turns_elapsed_calls_into_transport_errors() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ProviderError>(())
        };

        let result = timed(Duration::from_millis(10), "library.json", slow).await;
        assert!(
            matches!(result, Err(ProviderError::Transport(message)) if message.contains("library.json"))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timed_passes_results_through() {
        let result = timed(Duration::from_secs(1), "x", async {
            Err::<(), _>(ProviderError::not_found("x"))
        })
        .await;
        assert!(matches!(result, Err(error) if error.is_not_found()));
    }
}
