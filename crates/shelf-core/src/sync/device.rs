//! Stable per-installation identity.

use uuid::Uuid;

use crate::services::CatalogService;
use crate::Result;

/// `local_state` key holding the device id.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Return this installation's device id, generating and persisting a random
/// 128-bit id on first use.
///
/// `local_state` never leaves the device, so a restored snapshot from another
/// replica cannot carry that replica's id here.
pub async fn load_or_create_device_id(catalog: &CatalogService) -> Result<String> {
    let id = catalog
        .local_value_or_insert(DEVICE_ID_KEY, || Uuid::new_v4().to_string())
        .await?;
    tracing::debug!("Device id {id}");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn device_id_is_stable_per_store() {
        let catalog = CatalogService::open_in_memory().await.unwrap();

        let first = load_or_create_device_id(&catalog).await.unwrap();
        let second = load_or_create_device_id(&catalog).await.unwrap();

        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn separate_installations_get_distinct_ids() {
        let a = CatalogService::open_in_memory().await.unwrap();
        let b = CatalogService::open_in_memory().await.unwrap();

        assert_ne!(
            load_or_create_device_id(&a).await.unwrap(),
            load_or_create_device_id(&b).await.unwrap()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn device_id_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.db");

        let first = {
            let catalog = CatalogService::open_path(&path).await.unwrap();
            load_or_create_device_id(&catalog).await.unwrap()
        };
        let catalog = CatalogService::open_path(&path).await.unwrap();
        assert_eq!(load_or_create_device_id(&catalog).await.unwrap(), first);
    }
}
