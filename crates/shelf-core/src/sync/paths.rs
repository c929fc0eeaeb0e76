//! Remote layout beneath the provider root.

use crate::db::snapshot::SNAPSHOT_FILE_NAME;

/// Whole-database snapshot.
pub const SNAPSHOT_PATH: &str = SNAPSHOT_FILE_NAME;
/// Entity-level payload.
pub const PAYLOAD_PATH: &str = "library.json";
pub const SHARED_METADATA_PATH: &str = "sync-metadata.json";
pub const SETTINGS_PATH: &str = "settings.json";
pub const COVERS_DIR: &str = "covers";
pub const DEVICES_DIR: &str = "devices";

const DEVICE_METADATA_FILE: &str = "metadata.json";

/// `covers/<file_name>`
#[must_use]
pub fn cover_path(file_name: &str) -> String {
    format!("{COVERS_DIR}/{file_name}")
}

/// `devices/<device_id>/metadata.json`
#[must_use]
pub fn device_metadata_path(device_id: &str) -> String {
    format!("{DEVICES_DIR}/{device_id}/{DEVICE_METADATA_FILE}")
}
