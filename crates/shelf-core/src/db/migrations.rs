//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current local schema version. The compatibility gate compares remote
/// metadata against this value.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Highest applied migration; 0 for a fresh database.
pub async fn get_version(conn: &Connection) -> Result<i32> {
    let mut tables = conn
        .query(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            (),
        )
        .await?;
    if tables.next().await?.is_none() {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

/// Run `statements` and record `version`, all in one transaction.
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let applied = async {
        for statement in statements {
            conn.execute(statement, ()).await?;
        }
        conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
            .await?;
        conn.execute("COMMIT", ()).await?;
        Ok::<_, libsql::Error>(())
    }
    .await;

    if let Err(error) = applied {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(error.into());
    }
    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: catalog schema
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            subtitle TEXT,
            isbn TEXT,
            publisher TEXT,
            published_year INTEGER,
            page_count INTEGER,
            cover_filename TEXT,
            storage_location_id TEXT,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_books_updated ON books(updated_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_books_deleted ON books(deleted_at)",
        "CREATE TABLE IF NOT EXISTS authors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_name TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )",
        "CREATE TABLE IF NOT EXISTS collections (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )",
        "CREATE TABLE IF NOT EXISTS storage_locations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            parent_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )",
        "CREATE TABLE IF NOT EXISTS reading_sessions (
            id TEXT PRIMARY KEY,
            book_id TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER,
            start_page INTEGER,
            end_page INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_reading_sessions_book ON reading_sessions(book_id)",
        "CREATE TABLE IF NOT EXISTS filter_presets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            query TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )",
        "CREATE TABLE IF NOT EXISTS vocabulary_entries (
            id TEXT PRIMARY KEY,
            vocabulary TEXT NOT NULL,
            value TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_vocabulary_entries_vocabulary ON vocabulary_entries(vocabulary)",
        // Append-only: no updated_at
        "CREATE TABLE IF NOT EXISTS location_history (
            id TEXT PRIMARY KEY,
            book_id TEXT NOT NULL,
            storage_location_id TEXT,
            created_at INTEGER NOT NULL,
            deleted_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_location_history_book ON location_history(book_id)",
        // Junction tables
        "CREATE TABLE IF NOT EXISTS book_authors (
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            author_id TEXT NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
            PRIMARY KEY (book_id, author_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_book_authors_author ON book_authors(author_id)",
        "CREATE TABLE IF NOT EXISTS collection_books (
            collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            PRIMARY KEY (collection_id, book_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_collection_books_book ON collection_books(book_id)",
        // User preferences (JSON values)
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    ];

    apply(conn, 1, &statements).await
}

/// Migration to version 2: device-local state and LWW conflict log
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        // Never synced
        "CREATE TABLE IF NOT EXISTS local_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            local_updated_at INTEGER NOT NULL,
            incoming_updated_at INTEGER NOT NULL,
            resolved_at INTEGER NOT NULL,
            strategy TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_entity ON sync_conflicts(entity_kind, entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC)",
    ];

    apply(conn, 2, &statements).await
}
