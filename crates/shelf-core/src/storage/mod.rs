//! Remote storage backends behind one provider contract.

mod dropbox;
mod local;
mod provider;
mod s3;

use std::sync::Arc;

pub use dropbox::DropboxProvider;
pub use local::LocalFolderProvider;
pub use provider::{
    download_json, upload_json, ProviderError, ProviderResult, Quota, RemoteEntry,
    StorageProvider,
};
pub use s3::S3Provider;

use crate::config::ProviderConfig;

/// Build the adapter selected by `config`.
pub fn from_config(config: ProviderConfig) -> ProviderResult<Arc<dyn StorageProvider>> {
    let provider: Arc<dyn StorageProvider> = match config {
        ProviderConfig::S3(config) => Arc::new(S3Provider::new(config)),
        ProviderConfig::Dropbox(config) => Arc::new(DropboxProvider::new(&config)?),
        ProviderConfig::LocalFolder { root } => Arc::new(LocalFolderProvider::new(root)),
    };
    tracing::debug!("Configured {} storage provider", provider.name());
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_local_folder_provider() {
        let dir = tempfile::tempdir().unwrap();
        let provider = from_config(ProviderConfig::LocalFolder {
            root: dir.path().to_path_buf(),
        })
        .unwrap();

        assert_eq!(provider.name(), "local-folder");
        assert!(provider.is_authenticated());
    }

    #[test]
    fn rejects_dropbox_without_app_key() {
        let result = from_config(ProviderConfig::Dropbox(crate::config::DropboxConfig {
            app_key: "  ".to_string(),
            app_secret: None,
            refresh_token: "refresh".to_string(),
            root: "/Shelf".to_string(),
        }));

        assert!(matches!(result, Err(ProviderError::InvalidConfiguration(_))));
    }
}
