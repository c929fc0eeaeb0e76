//! Settings repository implementation

use libsql::Connection;
use serde_json::Value;

use crate::error::Result;
use crate::models::settings::{merge_incoming, strip_credentials};
use crate::models::SettingsMap;

/// Trait for settings storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Load every stored setting
    async fn load_all(&self) -> Result<SettingsMap>;

    /// Settings that may leave this device (credential fields removed)
    async fn syncable_settings(&self) -> Result<SettingsMap>;

    /// Write each key of `patch`; a JSON `null` removes the key
    async fn update_settings(&self, patch: &SettingsMap) -> Result<()>;

    /// Apply settings downloaded from another device, keeping local credentials
    async fn apply_incoming(&self, incoming: &SettingsMap) -> Result<SettingsMap>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn set_setting(&self, key: &str, value: &Value) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        self.conn
            .execute(
                "INSERT INTO settings (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, encoded.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn remove_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn load_all(&self) -> Result<SettingsMap> {
        let mut rows = self
            .conn
            .query("SELECT key, value FROM settings ORDER BY key", ())
            .await?;

        let mut settings = SettingsMap::new();
        while let Some(row) = rows.next().await? {
            let key: String = row.get(0)?;
            let raw: String = row.get(1)?;
            // Values written by older builds may be bare strings
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            settings.insert(key, value);
        }
        Ok(settings)
    }

    async fn syncable_settings(&self) -> Result<SettingsMap> {
        Ok(strip_credentials(&self.load_all().await?))
    }

    async fn update_settings(&self, patch: &SettingsMap) -> Result<()> {
        for (key, value) in patch {
            if value.is_null() {
                self.remove_setting(key).await?;
            } else {
                self.set_setting(key, value).await?;
            }
        }
        Ok(())
    }

    async fn apply_incoming(&self, incoming: &SettingsMap) -> Result<SettingsMap> {
        let local = self.load_all().await?;
        let merged = merge_incoming(&local, incoming);
        let patch: SettingsMap = merged
            .iter()
            .filter(|(key, value)| local.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.update_settings(&patch).await?;
        tracing::debug!("Applied {} incoming setting(s)", patch.len());
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn map(value: Value) -> SettingsMap {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_empty_settings() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        assert!(repo.load_all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_and_load_settings() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        repo.update_settings(&map(json!({
            "theme": "dark",
            "gridColumns": 4,
            "showCovers": true
        })))
        .await
        .unwrap();
        repo.update_settings(&map(json!({ "gridColumns": 6, "showCovers": null })))
            .await
            .unwrap();

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded, map(json!({ "theme": "dark", "gridColumns": 6 })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_syncable_settings_strip_credentials() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        repo.update_settings(&map(json!({
            "theme": "light",
            "dropbox.refreshToken": "r-123",
            "s3SecretAccessKey": "hunter2"
        })))
        .await
        .unwrap();

        let syncable = repo.syncable_settings().await.unwrap();
        assert_eq!(syncable, map(json!({ "theme": "light" })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_incoming_preserves_local_credentials() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        repo.update_settings(&map(json!({
            "theme": "light",
            "dropbox.accessToken": "mine"
        })))
        .await
        .unwrap();

        let merged = repo
            .apply_incoming(&map(json!({
                "theme": "dark",
                "defaultSort": "title",
                "dropbox.accessToken": "theirs"
            })))
            .await
            .unwrap();

        let expected = map(json!({
            "theme": "dark",
            "defaultSort": "title",
            "dropbox.accessToken": "mine"
        }));
        assert_eq!(merged, expected);
        assert_eq!(repo.load_all().await.unwrap(), expected);
    }
}
