//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::{Path, PathBuf};

use super::migrations;

/// Best-effort tuning; `journal_mode = WAL` is refused for `:memory:`.
const TUNING_PRAGMAS: [&str; 3] = [
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = NORMAL",
    "PRAGMA cache_size = -8000",
];

/// Database wrapper for libSQL connections
pub struct Database {
    // Kept alive for as long as the connection is in use
    _db: LibSqlDatabase,
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database file at `path` and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Builder::new_local(&path).build().await?;
        Self::init(db, Some(path)).await
    }

    /// Open a migrated in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::init(db, None).await
    }

    async fn init(db: LibSqlDatabase, path: Option<PathBuf>) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self {
            _db: db,
            conn,
            path,
        };
        database.configure().await?;
        migrations::run(&database.conn).await?;
        Ok(database)
    }

    async fn configure(&self) -> Result<()> {
        for pragma in TUNING_PRAGMAS {
            if let Err(error) = self.conn.query(pragma, ()).await {
                tracing::debug!("Skipped `{pragma}`: {error}");
            }
        }
        // Link tables depend on it
        self.conn.execute("PRAGMA foreign_keys = ON", ()).await?;
        Ok(())
    }

    /// Schema version recorded in this database.
    pub async fn schema_version(&self) -> Result<i32> {
        migrations::get_version(&self.conn).await
    }

    /// File backing this database; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.path().is_none());
        assert_eq!(
            db.schema_version().await.unwrap(),
            migrations::CURRENT_VERSION
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_database_enforces_foreign_keys() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("shelf.db");

        let db = Database::open(&db_path).await.unwrap();
        assert_eq!(db.path(), Some(db_path.as_path()));
        assert!(db_path.exists());

        let mut rows = db
            .connection()
            .query("PRAGMA foreign_keys", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reopening_keeps_schema_version() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("shelf.db");
        drop(Database::open(&db_path).await.unwrap());

        let reopened = Database::open(&db_path).await.unwrap();
        assert_eq!(
            reopened.schema_version().await.unwrap(),
            migrations::CURRENT_VERSION
        );
    }
}
