//! A local or mounted folder used as the remote root.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

use super::provider::{ProviderError, ProviderResult, Quota, RemoteEntry, StorageProvider};
use crate::util::{join_remote_path, normalize_remote_path};

/// Stores sync objects as plain files under `root`.
#[derive(Debug, Clone)]
pub struct LocalFolderProvider {
    root: PathBuf,
}

impl LocalFolderProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a remote path onto the filesystem, refusing to escape `root`.
    fn resolve(&self, remote_path: &str) -> ProviderResult<PathBuf> {
        let relative = normalize_remote_path(remote_path);
        let mut resolved = self.root.clone();
        for component in Path::new(&relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(ProviderError::InvalidConfiguration(format!(
                        "remote path escapes the sync folder: {remote_path}"
                    )))
                }
            }
        }
        Ok(resolved)
    }
}

fn map_io(error: std::io::Error, remote_path: &str) -> ProviderError {
    if error.kind() == std::io::ErrorKind::NotFound {
        ProviderError::not_found(remote_path)
    } else {
        ProviderError::Io(error)
    }
}

#[async_trait::async_trait]
impl StorageProvider for LocalFolderProvider {
    fn name(&self) -> &str {
        "local-folder"
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    async fn ensure_valid_token(&self) -> ProviderResult<()> {
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> ProviderResult<()> {
        let target = self.resolve(remote_path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write beside the target and rename so readers never see a partial file
        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                ProviderError::InvalidConfiguration(format!("not a file path: {remote_path}"))
            })?;
        let staging = target.with_file_name(format!("{file_name}.partial"));
        tokio::fs::copy(local_path, &staging).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> ProviderResult<()> {
        let source = self.resolve(remote_path)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&source, local_path)
            .await
            .map_err(|error| map_io(error, remote_path))?;
        Ok(())
    }

    async fn delete_file(&self, remote_path: &str) -> ProviderResult<()> {
        let target = self.resolve(remote_path)?;
        tokio::fs::remove_file(&target)
            .await
            .map_err(|error| map_io(error, remote_path))
    }

    async fn list_files(&self, prefix: &str) -> ProviderResult<Vec<RemoteEntry>> {
        let dir = self.resolve(prefix)?;
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".partial") {
                continue;
            }
            let metadata = entry.metadata().await?;
            entries.push(RemoteEntry {
                path: join_remote_path(prefix, &name),
                name,
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                is_dir: metadata.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_quota(&self) -> ProviderResult<Option<Quota>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{download_json, upload_json};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_download_and_list() {
        let remote = tempdir().unwrap();
        let local = tempdir().unwrap();
        let provider = LocalFolderProvider::new(remote.path());

        let source = local.path().join("cover.jpg");
        tokio::fs::write(&source, b"jpeg bytes").await.unwrap();
        provider.upload_file(&source, "covers/cover.jpg").await.unwrap();

        let listed = provider.list_files("covers").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "cover.jpg");
        assert_eq!(listed[0].path, "covers/cover.jpg");
        assert_eq!(listed[0].size, 10);
        assert!(!listed[0].is_dir);

        let target = local.path().join("copy").join("cover.jpg");
        provider
            .download_file("covers/cover.jpg", &target)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"jpeg bytes");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_objects_are_not_found() {
        let remote = tempdir().unwrap();
        let local = tempdir().unwrap();
        let provider = LocalFolderProvider::new(remote.path());

        let error = provider
            .download_file("sync-metadata.json", &local.path().join("x"))
            .await
            .unwrap_err();
        assert!(error.is_not_found());
        assert!(provider
            .delete_file("nothing.txt")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(provider.list_files("devices").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn json_helpers_roundtrip_and_clean_up() {
        let remote = tempdir().unwrap();
        let provider = LocalFolderProvider::new(remote.path());

        let value = json!({ "schemaVersion": 2, "deviceId": "abc" });
        upload_json(&provider, "sync-metadata.json", &value)
            .await
            .unwrap();
        let loaded: serde_json::Value = download_json(&provider, "sync-metadata.json")
            .await
            .unwrap();
        assert_eq!(loaded, value);

        let missing = download_json::<serde_json::Value>(&provider, "settings.json").await;
        assert!(matches!(missing, Err(ProviderError::NotFound { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn paths_cannot_escape_root() {
        let remote = tempdir().unwrap();
        let provider = LocalFolderProvider::new(remote.path().join("sync"));
        let result = provider.delete_file("../outside.txt").await;
        assert!(matches!(
            result,
            Err(ProviderError::InvalidConfiguration(_))
        ));
    }
}
