//! Whole-database snapshots for the file transfer strategy

use std::path::{Path, PathBuf};

use libsql::Builder;
use tempfile::TempDir;

use super::repository::{CatalogRepository, LibSqlCatalogRepository};
use super::Database;
use crate::error::Result;
use crate::models::LibraryPayload;

/// File name used for snapshots, locally and remotely.
pub const SNAPSHOT_FILE_NAME: &str = "library.db";

/// A consistent copy of the local database in a private temp directory.
///
/// The directory and file are removed when this value is dropped.
pub struct SnapshotFile {
    _dir: TempDir,
    path: PathBuf,
}

impl SnapshotFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Tables that stay on this device and are emptied in every snapshot.
const DEVICE_LOCAL_TABLES: [&str; 3] = ["settings", "local_state", "sync_conflicts"];

/// Write a compacted copy of `db` with `VACUUM INTO`.
///
/// The copy holds catalog rows only: settings (credentials included), the
/// device id and the conflict log are removed before it is handed out.
pub async fn create(db: &Database) -> Result<SnapshotFile> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(SNAPSHOT_FILE_NAME);
    let target = path.to_string_lossy().replace('\'', "''");

    db.connection()
        .execute(&format!("VACUUM INTO '{target}'"), ())
        .await?;
    strip_device_local(&path).await?;

    tracing::debug!("Wrote database snapshot to {}", path.display());
    Ok(SnapshotFile { _dir: dir, path })
}

async fn strip_device_local(path: &Path) -> Result<()> {
    let copy = Builder::new_local(path).build().await?;
    let conn = copy.connect()?;
    // Single file on disk; nothing may be left behind in a -wal sidecar
    conn.query("PRAGMA journal_mode = DELETE", ()).await?;
    for table in DEVICE_LOCAL_TABLES {
        conn.execute(&format!("DELETE FROM {table}"), ()).await?;
    }
    conn.execute("VACUUM", ()).await?;
    Ok(())
}

/// Open a snapshot downloaded from another device and export its rows.
///
/// Older snapshots are migrated on open, so the payload always matches the
/// local layout.
pub async fn read_payload(path: &Path) -> Result<LibraryPayload> {
    let snapshot = Database::open(path).await?;
    LibSqlCatalogRepository::new(snapshot.connection())
        .export_payload(None)
        .await
}
