//! Synced user preferences

use std::collections::BTreeMap;

use serde_json::Value;

/// User preferences as a flat key/value map.
pub type SettingsMap = BTreeMap<String, Value>;

/// Key fragments that mark a setting as a credential, matched against the
/// lowercased key with every separator removed.
const CREDENTIAL_MARKERS: [&str; 6] = [
    "token",
    "secret",
    "password",
    "accesskey",
    "apikey",
    "credential",
];

/// Whether `key` holds a credential that must never leave this device.
///
/// `s3AccessKeyId`, `s3_access_key_id` and `s3.access-key.id` are the same key.
pub fn is_credential_key(key: &str) -> bool {
    let folded: String = key
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    CREDENTIAL_MARKERS
        .iter()
        .any(|marker| folded.contains(marker))
}

/// Settings minus every credential field.
#[must_use]
pub fn strip_credentials(settings: &SettingsMap) -> SettingsMap {
    settings
        .iter()
        .filter(|(key, _)| !is_credential_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Apply settings downloaded from another replica.
///
/// Incoming values overwrite local ones, except credential fields, which are
/// always kept from `local` (and never taken from `incoming`).
#[must_use]
pub fn merge_incoming(local: &SettingsMap, incoming: &SettingsMap) -> SettingsMap {
    let mut merged = local.clone();
    for (key, value) in incoming {
        if is_credential_key(key) {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> SettingsMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn detects_credential_keys() {
        assert!(is_credential_key("dropbox.refreshToken"));
        assert!(is_credential_key("s3_secret_access_key"));
        assert!(is_credential_key("isbn-api-key"));
        assert!(is_credential_key("googleBooksApiKey"));
        assert!(is_credential_key("s3AccessKeyId"));
        assert!(is_credential_key("S3_SECRET"));
        assert!(is_credential_key("webdav Password"));
        assert!(!is_credential_key("theme"));
        assert!(!is_credential_key("defaultSort"));
        assert!(!is_credential_key("coverAccessibilityLabels"));
    }

    #[test]
    fn strip_credentials_keeps_preferences() {
        let settings = map(json!({
            "theme": "dark",
            "dropbox.accessToken": "abc",
            "fontSize": 14
        }));
        let stripped = strip_credentials(&settings);
        assert_eq!(stripped.len(), 2);
        assert!(!stripped.contains_key("dropbox.accessToken"));
    }

    #[test]
    fn merge_incoming_preserves_local_credentials() {
        let local = map(json!({
            "theme": "light",
            "dropbox.accessToken": "local-token"
        }));
        let incoming = map(json!({
            "theme": "dark",
            "language": "de",
            "dropbox.accessToken": "remote-token"
        }));

        let merged = merge_incoming(&local, &incoming);
        assert_eq!(merged["theme"], json!("dark"));
        assert_eq!(merged["language"], json!("de"));
        assert_eq!(merged["dropbox.accessToken"], json!("local-token"));
    }

    #[test]
    fn camel_case_credentials_stay_local() {
        let local = map(json!({ "googleBooksApiKey": "mine" }));
        let incoming = map(json!({
            "googleBooksApiKey": "theirs",
            "s3AccessKeyId": "AKIA-theirs",
            "gridColumns": 5
        }));

        let merged = merge_incoming(&local, &incoming);
        assert_eq!(
            merged,
            map(json!({ "googleBooksApiKey": "mine", "gridColumns": 5 }))
        );
        assert_eq!(strip_credentials(&incoming), map(json!({ "gridColumns": 5 })));
    }
}
