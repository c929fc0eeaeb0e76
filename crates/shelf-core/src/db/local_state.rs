//! Device-local key/value state that never leaves this installation

use libsql::Connection;

use crate::error::Result;

/// Key/value store backed by the `local_state` table.
pub struct LocalStateStore<'a> {
    conn: &'a Connection,
}

impl<'a> LocalStateStore<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM local_state WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO local_state (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )
            .await?;
        Ok(())
    }

    /// Return the stored value for `key`, storing `init()` first if absent.
    ///
    /// The insert is `OR IGNORE`, so when two callers race the first write
    /// wins and both observe the same value.
    pub async fn get_or_insert_with(
        &self,
        key: &str,
        init: impl FnOnce() -> String,
    ) -> Result<String> {
        if let Some(existing) = self.get(key).await? {
            return Ok(existing);
        }
        let value = init();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO local_state (key, value) VALUES (?, ?)",
                [key, value.as_str()],
            )
            .await?;
        Ok(self.get(key).await?.unwrap_or(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_set() {
        let db = Database::open_in_memory().await.unwrap();
        let store = LocalStateStore::new(db.connection());

        assert_eq!(store.get("last_sync").await.unwrap(), None);
        store.set("last_sync", "1").await.unwrap();
        store.set("last_sync", "2").await.unwrap();
        assert_eq!(store.get("last_sync").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_or_insert_keeps_first_value() {
        let db = Database::open_in_memory().await.unwrap();
        let store = LocalStateStore::new(db.connection());

        let first = store
            .get_or_insert_with("device_id", || "first".to_string())
            .await
            .unwrap();
        let second = store
            .get_or_insert_with("device_id", || "second".to_string())
            .await
            .unwrap();

        assert_eq!(first, "first");
        assert_eq!(second, "first");
    }
}
