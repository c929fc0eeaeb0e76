//! Shared catalog service wrapper.
//!
//! Every catalog write goes through the one `Database` behind this service's
//! mutex, so a merge transaction never interleaves with another writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::snapshot::{self, SnapshotFile};
use crate::db::{
    CatalogRepository, Database, LibSqlCatalogRepository, LibSqlSettingsRepository, LinkTable,
    LocalStateStore, SettingsRepository, Table,
};
use crate::models::{
    EntityId, LibraryPayload, LocationHistoryEntry, SettingsMap, SyncConflict, Syncable,
};
use crate::sync::merge::{merge_payload, MergeOutcome, TieBreak};
use crate::Result;

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl CatalogService {
    /// Open a catalog at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory catalog (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Database path for file-backed catalogs.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Schema version of the local store.
    pub async fn schema_version(&self) -> Result<i32> {
        let db = self.db.lock().await;
        db.schema_version().await
    }

    /// Fetch a live row by id.
    pub async fn get<T: Table + Syncable>(&self, id: &EntityId) -> Result<Option<T>> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.get(id).await
    }

    /// List live rows.
    pub async fn list<T: Table + Syncable>(&self) -> Result<Vec<T>> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.list().await
    }

    /// List rows including tombstones.
    pub async fn list_all<T: Table + Syncable>(&self) -> Result<Vec<T>> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.list_all().await
    }

    /// Insert or update a row.
    pub async fn save<T: Table + Syncable>(&self, row: &mut T) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.save(row).await
    }

    /// Soft-delete a row.
    pub async fn delete<T: Table + Syncable>(&self, id: &EntityId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.delete::<T>(id).await
    }

    pub async fn link<L: LinkTable>(&self, link: &L) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.link(link).await
    }

    pub async fn unlink<L: LinkTable>(&self, link: &L) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.unlink(link).await
    }

    pub async fn links<L: LinkTable>(&self) -> Result<Vec<L>> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.links().await
    }

    /// Move a book to a storage location, appending to its history.
    pub async fn move_book(
        &self,
        book_id: &EntityId,
        location_id: Option<&EntityId>,
    ) -> Result<LocationHistoryEntry> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.move_book(book_id, location_id).await
    }

    /// Export every table for upload.
    pub async fn export_payload(&self, device_id: Option<&str>) -> Result<LibraryPayload> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.export_payload(device_id).await
    }

    /// Merge a remote payload into the catalog and commit it atomically.
    ///
    /// The lock is held from export to commit so no other write can slip in
    /// between computing the merge and applying it.
    pub async fn merge_remote(
        &self,
        remote: &LibraryPayload,
        tie_break: TieBreak,
    ) -> Result<MergeOutcome> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        let local = repo.export_payload(None).await?;
        let outcome = merge_payload(&local, remote, tie_break);
        if !outcome.is_noop() || outcome.conflicts().next().is_some() {
            repo.apply_merge(&outcome).await?;
        }
        Ok(outcome)
    }

    /// Recent LWW conflicts, newest first.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        repo.list_conflicts(limit).await
    }

    /// Write a snapshot of the whole database to a temp file.
    pub async fn snapshot(&self) -> Result<SnapshotFile> {
        let db = self.db.lock().await;
        snapshot::create(&db).await
    }

    pub async fn load_settings(&self) -> Result<SettingsMap> {
        let db = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        repo.load_all().await
    }

    /// Settings minus credential fields.
    pub async fn syncable_settings(&self) -> Result<SettingsMap> {
        let db = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        repo.syncable_settings().await
    }

    pub async fn update_settings(&self, patch: &SettingsMap) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        repo.update_settings(patch).await
    }

    /// Merge settings downloaded from another device.
    pub async fn apply_incoming_settings(&self, incoming: &SettingsMap) -> Result<SettingsMap> {
        let db = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        repo.apply_incoming(incoming).await
    }

    /// Read a device-local value.
    pub async fn local_value(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        LocalStateStore::new(db.connection()).get(key).await
    }

    /// Read a device-local value, storing `init()` on first use.
    pub async fn local_value_or_insert(
        &self,
        key: &str,
        init: impl FnOnce() -> String + Send,
    ) -> Result<String> {
        let db = self.db.lock().await;
        LocalStateStore::new(db.connection())
            .get_or_insert_with(key, init)
            .await
    }

    pub async fn set_local_value(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        LocalStateStore::new(db.connection()).set(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, Book, BookAuthor};
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_path_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("library.db");

        let service = CatalogService::open_path(&path).await.unwrap();

        assert_eq!(service.db_path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_merge_remote_between_services() {
        let a = CatalogService::open_in_memory().await.unwrap();
        let b = CatalogService::open_in_memory().await.unwrap();

        let mut book = Book::new("Annihilation");
        let mut author = Author::new("Jeff VanderMeer");
        a.save(&mut book).await.unwrap();
        a.save(&mut author).await.unwrap();
        a.link(&BookAuthor::new(book.id.clone(), author.id.clone()))
            .await
            .unwrap();

        let payload = a.export_payload(Some("a")).await.unwrap();
        let outcome = b.merge_remote(&payload, TieBreak::PreferLocal).await.unwrap();
        assert_eq!(outcome.totals().inserted, 2);

        let books: Vec<Book> = b.list().await.unwrap();
        assert_eq!(books, vec![book]);
        assert_eq!(b.links::<BookAuthor>().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_value_or_insert_is_stable() {
        let service = CatalogService::open_in_memory().await.unwrap();
        let first = service
            .local_value_or_insert("device_id", || "abc".to_string())
            .await
            .unwrap();
        let second = service
            .local_value_or_insert("device_id", || "xyz".to_string())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            service.local_value("device_id").await.unwrap().as_deref(),
            Some("abc")
        );
    }
}
