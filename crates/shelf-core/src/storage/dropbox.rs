//! Dropbox adapter over the HTTP API v2.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::provider::{ProviderError, ProviderResult, Quota, RemoteEntry, StorageProvider};
use crate::auth::{
    CredentialStore, MemoryCredentialStore, OAuthRefreshClient, OAuthToken, TokenManager,
};
use crate::config::DropboxConfig;
use crate::util::{compact_text, join_remote_path, normalize_remote_path};

const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
const API_URL: &str = "https://api.dropboxapi.com/2";
const CONTENT_URL: &str = "https://content.dropboxapi.com/2";

/// Dropbox adapter. Paths are relative to `config.root` inside the app folder.
pub struct DropboxProvider {
    root: String,
    client: Client,
    tokens: TokenManager,
}

impl DropboxProvider {
    /// Build an adapter whose credential lives only in memory, seeded with the
    /// configured refresh token.
    pub fn new(config: &DropboxConfig) -> ProviderResult<Self> {
        let store = Arc::new(MemoryCredentialStore::new(Some(
            OAuthToken::from_refresh_token(config.refresh_token.clone()),
        )));
        Self::with_store(config, store)
    }

    /// Build an adapter that loads and persists its credential through `store`.
    pub fn with_store(
        config: &DropboxConfig,
        store: Arc<dyn CredentialStore>,
    ) -> ProviderResult<Self> {
        let refresher = OAuthRefreshClient::new(
            TOKEN_URL,
            config.app_key.clone(),
            config.app_secret.clone(),
        )?;
        let tokens = TokenManager::new(Arc::new(refresher), store)?;
        let client = Client::builder()
            .build()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        Ok(Self {
            root: normalize_remote_path(&config.root),
            client,
            tokens,
        })
    }

    /// Absolute Dropbox path for a remote path.
    fn dropbox_path(&self, remote_path: &str) -> String {
        let joined = join_remote_path(&self.root, remote_path);
        if joined.is_empty() {
            // The API spells the root folder as the empty string
            String::new()
        } else {
            format!("/{joined}")
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> ProviderResult<Response> {
        let token = self.tokens.access_token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|error| ProviderError::Transport(error.to_string()))
    }

    async fn rpc(&self, endpoint: &str, body: &serde_json::Value) -> ProviderResult<Response> {
        let request = self.client.post(format!("{API_URL}/{endpoint}")).json(body);
        let response = self.authorized(request).await?;
        check_status(response, endpoint).await
    }

    async fn list_page(&self, endpoint: &str, body: serde_json::Value) -> ProviderResult<ListFolderPage> {
        let response = self.rpc(endpoint, &body).await?;
        response
            .json::<ListFolderPage>()
            .await
            .map_err(|error| ProviderError::Transport(format!("{endpoint}: {error}")))
    }
}

#[async_trait::async_trait]
impl StorageProvider for DropboxProvider {
    fn name(&self) -> &str {
        "dropbox"
    }

    fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }

    async fn ensure_valid_token(&self) -> ProviderResult<()> {
        self.tokens.access_token().await?;
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> ProviderResult<()> {
        let bytes = tokio::fs::read(local_path).await?;
        let arg = json!({
            "path": self.dropbox_path(remote_path),
            "mode": "overwrite",
            "mute": true,
        });
        let request = self
            .client
            .post(format!("{CONTENT_URL}/files/upload"))
            .header("Dropbox-API-Arg", arg.to_string())
            .header("Content-Type", "application/octet-stream")
            .body(bytes);
        let response = self.authorized(request).await?;
        check_status(response, remote_path).await?;
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> ProviderResult<()> {
        let arg = json!({ "path": self.dropbox_path(remote_path) });
        let request = self
            .client
            .post(format!("{CONTENT_URL}/files/download"))
            .header("Dropbox-API-Arg", arg.to_string());
        let response = self.authorized(request).await?;
        let response = check_status(response, remote_path).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn delete_file(&self, remote_path: &str) -> ProviderResult<()> {
        self.rpc(
            "files/delete_v2",
            &json!({ "path": self.dropbox_path(remote_path) }),
        )
        .await
        .map_err(|error| match error {
            ProviderError::NotFound { .. } => ProviderError::not_found(remote_path),
            other => other,
        })?;
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> ProviderResult<Vec<RemoteEntry>> {
        let body = json!({ "path": self.dropbox_path(prefix), "recursive": false });
        let mut page = match self.list_page("files/list_folder", body).await {
            Ok(page) => page,
            Err(ProviderError::NotFound { .. }) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        let mut entries: Vec<RemoteEntry> = Vec::new();
        loop {
            entries.extend(page.entries.into_iter().map(|entry| entry.into_remote(prefix)));
            if !page.has_more {
                break;
            }
            page = self
                .list_page("files/list_folder/continue", json!({ "cursor": page.cursor }))
                .await?;
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_quota(&self) -> ProviderResult<Option<Quota>> {
        let response = self
            .rpc("users/get_space_usage", &serde_json::Value::Null)
            .await?;
        let usage = response
            .json::<SpaceUsage>()
            .await
            .map_err(|error| ProviderError::Transport(error.to_string()))?;
        Ok(usage.into_quota())
    }
}

/// Turn a non-success response into the provider taxonomy.
async fn check_status(response: Response, target: &str) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_error(status, &body, target))
}

fn classify_error(status: StatusCode, body: &str, target: &str) -> ProviderError {
    if status == StatusCode::UNAUTHORIZED {
        return ProviderError::NotAuthenticated;
    }
    // Conflict responses carry the error tag, e.g. "path/not_found/.."
    if status == StatusCode::CONFLICT {
        let summary = serde_json::from_str::<ApiError>(body)
            .ok()
            .and_then(|error| error.error_summary)
            .unwrap_or_else(|| body.to_string());
        if summary.contains("not_found") {
            return ProviderError::not_found(target);
        }
    }
    ProviderError::Transport(format!(
        "Dropbox request for {target} failed ({}): {}",
        status.as_u16(),
        compact_text(body)
    ))
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListFolderPage {
    entries: Vec<ListEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    server_modified: Option<DateTime<Utc>>,
}

impl ListEntry {
    fn into_remote(self, prefix: &str) -> RemoteEntry {
        RemoteEntry {
            path: join_remote_path(prefix, &self.name),
            is_dir: self.tag == "folder",
            size: self.size.unwrap_or(0),
            modified: self.server_modified,
            name: self.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpaceUsage {
    used: u64,
    allocation: SpaceAllocation,
}

#[derive(Debug, Deserialize)]
struct SpaceAllocation {
    #[serde(default)]
    allocated: Option<u64>,
}

impl SpaceUsage {
    fn into_quota(self) -> Option<Quota> {
        self.allocation
            .allocated
            .map(|total| Quota::new(self.used, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> DropboxConfig {
        DropboxConfig {
            app_key: "app".to_string(),
            app_secret: None,
            refresh_token: "refresh".to_string(),
            root: "/Shelf".to_string(),
        }
    }

    #[test]
    fn paths_are_absolute_under_root() {
        let provider = DropboxProvider::new(&config()).unwrap();
        assert_eq!(provider.dropbox_path("covers/a.jpg"), "/Shelf/covers/a.jpg");
        assert_eq!(provider.dropbox_path(""), "/Shelf");

        let at_root = DropboxProvider::new(&DropboxConfig {
            root: "/".to_string(),
            ..config()
        })
        .unwrap();
        assert_eq!(at_root.dropbox_path(""), "");
        assert!(at_root.is_authenticated());
    }

    #[test]
    fn conflict_not_found_maps_to_not_found() {
        let error = classify_error(
            StatusCode::CONFLICT,
            r#"{"error_summary":"path/not_found/..","error":{".tag":"path"}}"#,
            "sync-metadata.json",
        );
        assert!(matches!(error, ProviderError::NotFound { path } if path == "sync-metadata.json"));
    }

    #[test]
    fn unauthorized_maps_to_not_authenticated() {
        let error = classify_error(StatusCode::UNAUTHORIZED, "", "library.json");
        assert!(matches!(error, ProviderError::NotAuthenticated));

        let error = classify_error(StatusCode::INTERNAL_SERVER_ERROR, "oops", "library.json");
        assert!(matches!(error, ProviderError::Transport(message) if message.contains("500")));
    }

    #[test]
    fn list_entries_convert_to_remote_entries() {
        let page: ListFolderPage = serde_json::from_str(
            r#"{
                "entries": [
                    {".tag": "file", "name": "metadata.json", "size": 120,
                     "server_modified": "2024-06-01T10:00:00Z"},
                    {".tag": "folder", "name": "abc"}
                ],
                "cursor": "c1",
                "has_more": false
            }"#,
        )
        .unwrap();

        let entries: Vec<_> = page
            .entries
            .into_iter()
            .map(|entry| entry.into_remote("devices"))
            .collect();

        assert_eq!(entries[0].path, "devices/metadata.json");
        assert_eq!(entries[0].size, 120);
        assert!(entries[0].modified.is_some());
        assert!(entries[1].is_dir);
    }

    #[test]
    fn space_usage_without_allocation_has_no_quota() {
        let team: SpaceUsage =
            serde_json::from_str(r#"{"used": 10, "allocation": {".tag": "team"}}"#).unwrap();
        assert_eq!(team.into_quota(), None);

        let individual: SpaceUsage = serde_json::from_str(
            r#"{"used": 10, "allocation": {".tag": "individual", "allocated": 100}}"#,
        )
        .unwrap();
        assert_eq!(individual.into_quota(), Some(Quota::new(10, 100)));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "Requires SHELF_DROPBOX_* env vars plus network access"]
    async fn dropbox_quota_and_listing() {
        let _ = dotenvy::dotenv();

        let Some(crate::config::ProviderConfig::Dropbox(config)) =
            crate::config::ProviderConfig::from_env().expect("provider env parsing should not error")
        else {
            panic!("SHELF_DROPBOX_* configuration should be present");
        };
        let provider = DropboxProvider::new(&config).unwrap();

        provider.ensure_valid_token().await.unwrap();
        provider.get_quota().await.unwrap();
        provider.list_files("").await.unwrap();
    }
}
