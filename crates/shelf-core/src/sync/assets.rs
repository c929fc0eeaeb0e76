//! Cover image transfer.
//!
//! Covers are independent objects keyed by file name. Each one is moved with
//! its own timeout and a failure is recorded without stopping the others.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};

use super::paths::{cover_path, COVERS_DIR};
use super::report::{AssetFailure, AssetReport};
use super::{timed, SyncError, SyncResult};
use crate::storage::StorageProvider;

/// Limits applied to one asset batch.
#[derive(Debug, Clone, Copy)]
pub struct TransferLimits {
    pub concurrency: usize,
    pub call_timeout: Duration,
}

/// File names directly inside `dir`. A missing directory has no covers.
pub async fn local_cover_names(dir: &Path) -> std::io::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(error) => return Err(error),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.insert(name.to_string());
            }
        }
    }
    Ok(names)
}

async fn remote_cover_names(
    provider: &dyn StorageProvider,
    limits: TransferLimits,
) -> SyncResult<BTreeSet<String>> {
    let entries = timed(limits.call_timeout, COVERS_DIR, provider.list_files(COVERS_DIR)).await?;
    Ok(entries
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .map(|entry| entry.name)
        .collect())
}

/// Upload every local cover the remote does not already have.
pub async fn upload_covers(
    provider: &dyn StorageProvider,
    covers_dir: &Path,
    limits: TransferLimits,
) -> SyncResult<AssetReport> {
    let local = local_cover_names(covers_dir).await?;
    let remote = remote_cover_names(provider, limits).await?;
    let pending: Vec<String> = local.difference(&remote).cloned().collect();

    let mut report = AssetReport {
        skipped: local.len() - pending.len(),
        ..AssetReport::default()
    };
    tracing::debug!(
        "Uploading {} cover(s), {} already remote",
        pending.len(),
        report.skipped
    );

    let results = stream::iter(pending)
        .map(|name| async move {
            let remote_path = cover_path(&name);
            let result = timed(
                limits.call_timeout,
                &remote_path,
                provider.upload_file(&covers_dir.join(&name), &remote_path),
            )
            .await;
            (name, result)
        })
        .buffer_unordered(limits.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    collect(&mut report, results, "upload");
    Ok(report)
}

/// Download every remote cover missing from `covers_dir`.
pub async fn download_covers(
    provider: &dyn StorageProvider,
    covers_dir: &Path,
    limits: TransferLimits,
) -> SyncResult<AssetReport> {
    let remote = remote_cover_names(provider, limits).await?;
    let local = local_cover_names(covers_dir).await?;
    let pending: Vec<String> = remote.difference(&local).cloned().collect();

    let mut report = AssetReport {
        skipped: remote.len() - pending.len(),
        ..AssetReport::default()
    };
    if pending.is_empty() {
        return Ok(report);
    }
    tokio::fs::create_dir_all(covers_dir).await?;
    tracing::debug!(
        "Downloading {} cover(s), {} already local",
        pending.len(),
        report.skipped
    );

    let results = stream::iter(pending)
        .map(|name| async move {
            let remote_path = cover_path(&name);
            let target = covers_dir.join(&name);
            let result = timed(
                limits.call_timeout,
                &remote_path,
                provider.download_file(&remote_path, &target),
            )
            .await;
            if result.is_err() {
                // Never leave a truncated cover that would be skipped next run
                let _ = tokio::fs::remove_file(&target).await;
            }
            (name, result)
        })
        .buffer_unordered(limits.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    collect(&mut report, results, "download");
    Ok(report)
}

fn collect(
    report: &mut AssetReport,
    results: Vec<(String, crate::storage::ProviderResult<()>)>,
    verb: &str,
) {
    for (name, result) in results {
        match result {
            Ok(()) => report.transferred.push(name),
            Err(error) => {
                tracing::warn!("Cover {verb} failed for {name}: {error}");
                report.failed.push(AssetFailure {
                    name,
                    error: SyncError::from(error),
                });
            }
        }
    }
    report.transferred.sort();
    report.failed.sort_by(|a, b| a.name.cmp(&b.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFolderProvider;
    use pretty_assertions::assert_eq;

    const LIMITS: TransferLimits = TransferLimits {
        concurrency: 2,
        call_timeout: Duration::from_secs(5),
    };

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_skips_covers_already_remote() {
        let remote_dir = tempfile::tempdir().unwrap();
        let covers = tempfile::tempdir().unwrap();
        write(covers.path(), "a.jpg", "a");
        write(covers.path(), "b.jpg", "b");
        write(&remote_dir.path().join(COVERS_DIR), "a.jpg", "old");
        let provider = LocalFolderProvider::new(remote_dir.path());

        let report = upload_covers(&provider, covers.path(), LIMITS).await.unwrap();

        assert_eq!(report.transferred, vec!["b.jpg".to_string()]);
        assert_eq!(report.skipped, 1);
        // Same name means same cover; the remote copy is left alone
        let kept = std::fs::read_to_string(remote_dir.path().join("covers/a.jpg")).unwrap();
        assert_eq!(kept, "old");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn download_skips_covers_already_local() {
        let remote_dir = tempfile::tempdir().unwrap();
        let covers = tempfile::tempdir().unwrap();
        let remote_covers = remote_dir.path().join(COVERS_DIR);
        write(&remote_covers, "a.jpg", "a");
        write(&remote_covers, "c.jpg", "c");
        write(covers.path(), "a.jpg", "mine");
        let provider = LocalFolderProvider::new(remote_dir.path());

        let report = download_covers(&provider, covers.path(), LIMITS)
            .await
            .unwrap();

        assert_eq!(report.transferred, vec!["c.jpg".to_string()]);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            std::fs::read_to_string(covers.path().join("a.jpg")).unwrap(),
            "mine"
        );
        assert_eq!(
            std::fs::read_to_string(covers.path().join("c.jpg")).unwrap(),
            "c"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_local_dir_uploads_nothing() {
        let remote_dir = tempfile::tempdir().unwrap();
        let provider = LocalFolderProvider::new(remote_dir.path());
        let missing = remote_dir.path().join("nowhere");

        let report = upload_covers(&provider, &missing, LIMITS).await.unwrap();
        assert_eq!(report, AssetReport::default());
    }
}
