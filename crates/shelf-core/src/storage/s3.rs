//! S3-compatible object storage (AWS S3, Cloudflare R2, MinIO).

use std::path::Path;

use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;
use chrono::{DateTime, Utc};

use super::provider::{ProviderError, ProviderResult, Quota, RemoteEntry, StorageProvider};
use crate::config::S3Config;
use crate::util::{join_remote_path, normalize_remote_path};

/// Static-key S3 adapter. Sync objects live under `config.prefix`.
#[derive(Clone)]
pub struct S3Provider {
    config: S3Config,
    client: Client,
}

impl S3Provider {
    #[must_use]
    pub fn new(config: S3Config) -> Self {
        let client = build_s3_client(&config);
        Self { config, client }
    }

    #[must_use]
    pub const fn config(&self) -> &S3Config {
        &self.config
    }

    fn object_key(&self, remote_path: &str) -> ProviderResult<String> {
        let key = join_remote_path(&self.config.prefix, remote_path);
        if key.is_empty() {
            return Err(ProviderError::InvalidConfiguration(
                "object key cannot be empty".to_string(),
            ));
        }
        Ok(key)
    }

    /// Prefix for a listing, always ending in `/` unless it is the bucket root.
    fn list_prefix(&self, prefix: &str) -> String {
        let base = join_remote_path(&self.config.prefix, prefix);
        if base.is_empty() {
            base
        } else {
            format!("{base}/")
        }
    }

    /// Check that the configured bucket is reachable with current credentials.
    pub async fn bucket_is_reachable(&self) -> ProviderResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|error| map_sdk_error("head_bucket", &self.config.bucket, error))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageProvider for S3Provider {
    fn name(&self) -> &str {
        "s3"
    }

    fn is_authenticated(&self) -> bool {
        !self.config.access_key_id.trim().is_empty()
            && !self.config.secret_access_key.trim().is_empty()
    }

    async fn ensure_valid_token(&self) -> ProviderResult<()> {
        // Static keys never expire
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ProviderError::NotAuthenticated)
        }
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> ProviderResult<()> {
        let key = self.object_key(remote_path)?;
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|error| ProviderError::Transport(format!("read {}: {error}", local_path.display())))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|error| map_sdk_error("put_object", &key, error))?;
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> ProviderResult<()> {
        let key = self.object_key(remote_path)?;
        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|error| {
                if error
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::get_object::GetObjectError::is_no_such_key)
                {
                    ProviderError::not_found(remote_path)
                } else {
                    map_sdk_error("get_object", &key, error)
                }
            })?;

        let payload = response
            .body
            .collect()
            .await
            .map_err(|error| ProviderError::Transport(format!("get_object body {key}: {error}")))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, payload.into_bytes()).await?;
        Ok(())
    }

    async fn delete_file(&self, remote_path: &str) -> ProviderResult<()> {
        let key = self.object_key(remote_path)?;
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|error| map_sdk_error("delete_object", &key, error))?;
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> ProviderResult<Vec<RemoteEntry>> {
        let list_prefix = self.list_prefix(prefix);
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(&list_prefix)
                .delimiter("/")
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|error| map_sdk_error("list_objects_v2", &list_prefix, error))?;

            for common in response.common_prefixes() {
                if let Some(dir) = common.prefix() {
                    entries.push(entry_for(prefix, &list_prefix, dir, 0, None, true));
                }
            }
            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                let modified = object
                    .last_modified()
                    .and_then(|time| DateTime::<Utc>::from_timestamp(time.secs(), time.subsec_nanos()));
                let size = object.size().and_then(|size| u64::try_from(size).ok()).unwrap_or(0);
                entries.push(entry_for(prefix, &list_prefix, key, size, modified, false));
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        entries.retain(|entry| !entry.name.is_empty());
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_quota(&self) -> ProviderResult<Option<Quota>> {
        Ok(None)
    }
}

/// Build a listing entry from a full object key or common prefix.
fn entry_for(
    prefix: &str,
    list_prefix: &str,
    key: &str,
    size: u64,
    modified: Option<DateTime<Utc>>,
    is_dir: bool,
) -> RemoteEntry {
    let name = normalize_remote_path(key.strip_prefix(list_prefix).unwrap_or(key));
    RemoteEntry {
        path: join_remote_path(prefix, &name),
        name,
        size,
        modified,
        is_dir,
    }
}

fn build_s3_client(config: &S3Config) -> Client {
    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        None,
        None,
        "shelf-core-s3-provider",
    );

    let mut builder = aws_sdk_s3::config::Builder::new()
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials);
    if let Some(endpoint_url) = &config.endpoint_url {
        builder = builder.endpoint_url(endpoint_url).force_path_style(true);
    }

    Client::from_conf(builder.build())
}

fn map_sdk_error<E, R>(operation: &str, target: &str, error: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match error.as_service_error().and_then(ProvideErrorMetadata::code) {
        Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken") => {
            ProviderError::NotAuthenticated
        }
        Some("NoSuchKey" | "NotFound") => ProviderError::not_found(target),
        _ => ProviderError::Transport(format!(
            "S3 {operation} failed for {target}: {}",
            DisplayErrorContext(&error)
        )),
    }
}
