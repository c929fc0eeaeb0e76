//! Catalog repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use chrono::Utc;
use libsql::Connection;

use super::migrations;
use super::table::{self, LinkTable, Table};
use crate::error::{Error, Result};
use crate::models::{
    Author, Book, BookAuthor, Collection, CollectionBook, EntityId, EntityKind, FilterPreset,
    LibraryPayload, LocationHistoryEntry, ReadingSession, StorageLocation, SyncConflict,
    Syncable, VocabularyEntry,
};
use crate::sync::merge::{merge_payload, MergeOutcome, TableMerge, TieBreak};
use crate::util::unix_millis_now;

/// Trait for catalog storage operations (async)
#[allow(async_fn_in_trait)]
pub trait CatalogRepository {
    /// Get a live row by id
    async fn get<T: Table + Syncable>(&self, id: &EntityId) -> Result<Option<T>>;

    /// List live rows, ordered by id
    async fn list<T: Table + Syncable>(&self) -> Result<Vec<T>>;

    /// List every row including tombstones
    async fn list_all<T: Table + Syncable>(&self) -> Result<Vec<T>>;

    /// Insert or update a row, stamping `updated_at`
    async fn save<T: Table + Syncable>(&self, row: &mut T) -> Result<()>;

    /// Soft delete a row and drop the links that reference it
    async fn delete<T: Table + Syncable>(&self, id: &EntityId) -> Result<()>;

    /// Add a relationship link
    async fn link<L: LinkTable>(&self, link: &L) -> Result<()>;

    /// Remove a relationship link
    async fn unlink<L: LinkTable>(&self, link: &L) -> Result<bool>;

    /// List every relationship link of one kind
    async fn links<L: LinkTable>(&self) -> Result<Vec<L>>;

    /// Move a book to a location and record the move
    async fn move_book(
        &self,
        book_id: &EntityId,
        location_id: Option<&EntityId>,
    ) -> Result<LocationHistoryEntry>;

    /// Export every table, tombstones included
    async fn export_payload(&self, device_id: Option<&str>) -> Result<LibraryPayload>;

    /// Apply a merge result in one transaction
    async fn apply_merge(&self, outcome: &MergeOutcome) -> Result<()>;

    /// Replace local rows with any newer rows from `payload`
    async fn import_payload(&self, payload: &LibraryPayload) -> Result<MergeOutcome>;

    /// Most recent conflict log entries, newest first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// libSQL implementation of `CatalogRepository`
pub struct LibSqlCatalogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCatalogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Drop every link that references `id` of kind `kind`.
    async fn purge_links(&self, kind: EntityKind, id: &EntityId) -> Result<()> {
        let targets: &[(&str, &str)] = match kind {
            EntityKind::Book => &[("book_authors", "book_id"), ("collection_books", "book_id")],
            EntityKind::Author => &[("book_authors", "author_id")],
            EntityKind::Collection => &[("collection_books", "collection_id")],
            _ => &[],
        };
        for (table, column) in targets {
            self.conn
                .execute(
                    &format!("DELETE FROM {table} WHERE {column} = ?"),
                    [id.as_str()],
                )
                .await?;
        }
        Ok(())
    }

    async fn write_table<T: Table + Syncable>(&self, merge: &TableMerge<T>) -> Result<()> {
        for row in merge.to_insert.iter().chain(&merge.to_update) {
            table::upsert(self.conn, row).await?;
        }
        Ok(())
    }

    async fn write_merge(&self, outcome: &MergeOutcome) -> Result<()> {
        self.write_table(&outcome.storage_locations).await?;
        self.write_table(&outcome.books).await?;
        self.write_table(&outcome.authors).await?;
        self.write_table(&outcome.collections).await?;
        self.write_table(&outcome.reading_sessions).await?;
        self.write_table(&outcome.filter_presets).await?;
        self.write_table(&outcome.vocabulary_entries).await?;

        for entry in &outcome.location_history.to_insert {
            table::insert_if_absent(self.conn, entry).await?;
        }

        if outcome.links_changed {
            table::replace_links(self.conn, &outcome.book_authors).await?;
            table::replace_links(self.conn, &outcome.collection_books).await?;
        }

        let resolved_at = unix_millis_now();
        let strategy = outcome.tie_break.strategy_name();
        for conflict in outcome.conflicts() {
            self.conn
                .execute(
                    "INSERT INTO sync_conflicts (
                        entity_kind, entity_id, local_updated_at, incoming_updated_at,
                        resolved_at, strategy
                    ) VALUES (?, ?, ?, ?, ?, ?)",
                    libsql::params![
                        conflict.kind.as_str(),
                        conflict.id.as_str(),
                        conflict.local_updated_at,
                        conflict.incoming_updated_at,
                        resolved_at,
                        strategy
                    ],
                )
                .await?;
        }

        Ok(())
    }
}

impl CatalogRepository for LibSqlCatalogRepository<'_> {
    async fn get<T: Table + Syncable>(&self, id: &EntityId) -> Result<Option<T>> {
        let row = table::select_by_id::<T>(self.conn, id).await?;
        Ok(row.filter(|row| !row.is_deleted()))
    }

    async fn list<T: Table + Syncable>(&self) -> Result<Vec<T>> {
        let mut rows = table::select_all::<T>(self.conn).await?;
        rows.retain(|row| !row.is_deleted());
        Ok(rows)
    }

    async fn list_all<T: Table + Syncable>(&self) -> Result<Vec<T>> {
        table::select_all(self.conn).await
    }

    async fn save<T: Table + Syncable>(&self, row: &mut T) -> Result<()> {
        if row.is_deleted() {
            return Err(Error::InvalidInput(format!(
                "cannot save deleted {} {}",
                T::KIND,
                row.id()
            )));
        }
        row.touch(unix_millis_now());
        table::upsert(self.conn, &*row).await
    }

    async fn delete<T: Table + Syncable>(&self, id: &EntityId) -> Result<()> {
        let Some(mut row) = self.get::<T>(id).await? else {
            return Err(Error::NotFound(format!("{} {id}", T::KIND)));
        };
        row.mark_deleted(unix_millis_now());
        table::upsert(self.conn, &row).await?;
        self.purge_links(T::KIND, id).await
    }

    async fn link<L: LinkTable>(&self, link: &L) -> Result<()> {
        table::insert_link(self.conn, link).await
    }

    async fn unlink<L: LinkTable>(&self, link: &L) -> Result<bool> {
        table::delete_link(self.conn, link).await
    }

    async fn links<L: LinkTable>(&self) -> Result<Vec<L>> {
        table::select_links(self.conn).await
    }

    async fn move_book(
        &self,
        book_id: &EntityId,
        location_id: Option<&EntityId>,
    ) -> Result<LocationHistoryEntry> {
        let Some(mut book) = self.get::<Book>(book_id).await? else {
            return Err(Error::NotFound(format!("book {book_id}")));
        };
        book.storage_location_id = location_id.cloned();
        self.save(&mut book).await?;

        let entry = LocationHistoryEntry::new(book_id.clone(), location_id.cloned());
        table::insert_if_absent(self.conn, &entry).await?;
        Ok(entry)
    }

    async fn export_payload(&self, device_id: Option<&str>) -> Result<LibraryPayload> {
        Ok(LibraryPayload {
            schema_version: migrations::get_version(self.conn).await?,
            exported_at: Utc::now(),
            device_id: device_id.map(ToString::to_string),
            books: table::select_all::<Book>(self.conn).await?,
            authors: table::select_all::<Author>(self.conn).await?,
            collections: table::select_all::<Collection>(self.conn).await?,
            storage_locations: table::select_all::<StorageLocation>(self.conn).await?,
            reading_sessions: table::select_all::<ReadingSession>(self.conn).await?,
            filter_presets: table::select_all::<FilterPreset>(self.conn).await?,
            vocabulary_entries: table::select_all::<VocabularyEntry>(self.conn).await?,
            location_history: table::select_all::<LocationHistoryEntry>(self.conn).await?,
            book_authors: table::select_links::<BookAuthor>(self.conn).await?,
            collection_books: table::select_links::<CollectionBook>(self.conn).await?,
        })
    }

    async fn apply_merge(&self, outcome: &MergeOutcome) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        if let Err(e) = self.write_merge(outcome).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            tracing::warn!("Rolled back merge: {e}");
            return Err(e);
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        let totals = outcome.totals();
        tracing::debug!(
            inserted = totals.inserted,
            updated = totals.updated,
            deleted = totals.deleted,
            conflicts = totals.conflicts,
            "Committed merge"
        );
        Ok(())
    }

    async fn import_payload(&self, payload: &LibraryPayload) -> Result<MergeOutcome> {
        let local = self.export_payload(None).await?;
        let outcome = merge_payload(&local, payload, TieBreak::PreferRemote);
        self.apply_merge(&outcome).await?;
        Ok(outcome)
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity_kind, entity_id, local_updated_at, incoming_updated_at,
                        resolved_at, strategy
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                entity_kind: row.get(1)?,
                entity_id: row.get(2)?,
                local_updated_at: row.get(3)?,
                incoming_updated_at: row.get(4)?,
                resolved_at: row.get(5)?,
                strategy: row.get(6)?,
            });
        }
        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_get() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection());

        let mut book = Book::new("The Left Hand of Darkness");
        let created = book.updated_at;
        repo.save(&mut book).await.unwrap();
        assert!(book.updated_at >= created);

        let fetched: Book = repo.get(&book.id).await.unwrap().unwrap();
        assert_eq!(fetched, book);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_keeps_tombstone_and_drops_links() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection());

        let mut book = Book::new("Kindred");
        let mut author = Author::new("Octavia E. Butler");
        repo.save(&mut book).await.unwrap();
        repo.save(&mut author).await.unwrap();
        repo.link(&BookAuthor::new(book.id.clone(), author.id.clone()))
            .await
            .unwrap();

        repo.delete::<Author>(&author.id).await.unwrap();

        assert!(repo.get::<Author>(&author.id).await.unwrap().is_none());
        assert!(repo.list::<Author>().await.unwrap().is_empty());
        let all = repo.list_all::<Author>().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_deleted());
        assert!(repo.links::<BookAuthor>().await.unwrap().is_empty());
        assert!(repo.get::<Book>(&book.id).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_missing_is_not_found() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection());

        let result = repo.delete::<Book>(&EntityId::from("nope")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_move_book_records_history() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection());

        let mut shelf = StorageLocation::new("Study shelf");
        let mut book = Book::new("Piranesi");
        repo.save(&mut shelf).await.unwrap();
        repo.save(&mut book).await.unwrap();

        let entry = repo.move_book(&book.id, Some(&shelf.id)).await.unwrap();

        let moved: Book = repo.get(&book.id).await.unwrap().unwrap();
        assert_eq!(moved.storage_location_id, Some(shelf.id.clone()));
        let payload = repo.export_payload(None).await.unwrap();
        assert_eq!(payload.location_history, vec![entry]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_import_applies_newer_rows_and_links() {
        let source_db = setup().await;
        let source = LibSqlCatalogRepository::new(source_db.connection());
        let mut book = Book::new("Solaris");
        let mut author = Author::new("Stanisław Lem");
        source.save(&mut book).await.unwrap();
        source.save(&mut author).await.unwrap();
        source
            .link(&BookAuthor::new(book.id.clone(), author.id.clone()))
            .await
            .unwrap();
        let payload = source.export_payload(Some("device-a")).await.unwrap();
        assert_eq!(payload.device_id.as_deref(), Some("device-a"));

        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection());
        let outcome = repo.import_payload(&payload).await.unwrap();

        assert_eq!(outcome.totals().inserted, 2);
        let exported = repo.export_payload(None).await.unwrap();
        assert_eq!(exported.books, payload.books);
        assert_eq!(exported.authors, payload.authors);
        assert_eq!(exported.book_authors, payload.book_authors);

        // Re-importing the same payload changes nothing
        let again = repo.import_payload(&payload).await.unwrap();
        assert!(again.is_noop());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_merge_rolls_back_everything() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection());

        let mut outcome = MergeOutcome::default();
        outcome.books.to_insert.push(Book::new("Never committed"));
        // Link to an author that does not exist violates the foreign key
        outcome.book_authors.push(BookAuthor::new(
            outcome.books.to_insert[0].id.clone(),
            EntityId::from("missing-author"),
        ));
        outcome.links_changed = true;

        assert!(repo.apply_merge(&outcome).await.is_err());
        assert!(repo.list_all::<Book>().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejected_rows_are_logged() {
        let db = setup().await;
        let repo = LibSqlCatalogRepository::new(db.connection());

        let mut book = Book::new("Local edit");
        repo.save(&mut book).await.unwrap();

        let mut stale = book.clone();
        stale.title = "Stale remote edit".to_string();
        stale.updated_at -= 1_000;
        let mut remote = LibraryPayload::empty(migrations::CURRENT_VERSION);
        remote.books.push(stale);

        let local = repo.export_payload(None).await.unwrap();
        let outcome = merge_payload(&local, &remote, TieBreak::PreferLocal);
        repo.apply_merge(&outcome).await.unwrap();

        let conflicts = repo.list_conflicts(10).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entity_kind, "book");
        assert_eq!(conflicts[0].entity_id, book.id.to_string());
        assert_eq!(conflicts[0].strategy, "lww_prefer_local");

        let kept: Book = repo.get(&book.id).await.unwrap().unwrap();
        assert_eq!(kept.title, "Local edit");
    }
}
