//! Remote sync metadata documents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format version of [`DeviceRecord`].
pub const DEVICE_RECORD_VERSION: u32 = 1;

/// Per-device record stored at `devices/<deviceId>/metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    pub device_name: String,
    pub platform: String,
    pub last_sync: DateTime<Utc>,
    /// `last_sync` as Unix ms
    pub timestamp: i64,
    pub version: u32,
    pub schema_version: i32,
    pub app_version: String,
}

impl DeviceRecord {
    /// Build a record stamped at `now`.
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        platform: impl Into<String>,
        app_version: impl Into<String>,
        schema_version: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            platform: platform.into(),
            last_sync: now,
            timestamp: now.timestamp_millis(),
            version: DEVICE_RECORD_VERSION,
            schema_version,
            app_version: app_version.into(),
        }
    }
}

/// Shared document at `sync-metadata.json`, consulted by the compatibility gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedSyncMetadata {
    pub schema_version: i32,
    pub app_version: String,
    /// Device that last wrote this document
    pub device_id: String,
    pub synced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_record_json_shape() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = DeviceRecord::new("dev-1", "Laptop", "linux", "1.2.0", 5, now);
        let json = serde_json::to_value(&record).unwrap();

        for key in [
            "deviceId",
            "deviceName",
            "platform",
            "lastSync",
            "timestamp",
            "version",
            "schemaVersion",
            "appVersion",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["timestamp"], 1_717_243_200_000_i64);
    }

    #[test]
    fn shared_metadata_parses_camel_case() {
        let metadata: SharedSyncMetadata = serde_json::from_str(
            r#"{"schemaVersion":6,"appVersion":"2.0.0","deviceId":"d","syncedAt":"2024-06-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(metadata.schema_version, 6);
        assert_eq!(metadata.device_id, "d");
    }
}
