//! Shared utility functions used across multiple modules.

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Normalize a remote path: trim whitespace and surrounding slashes.
pub fn normalize_remote_path(value: &str) -> String {
    value.trim().trim_matches('/').to_string()
}

/// Join a remote root and a relative path with a single `/`.
pub fn join_remote_path(root: &str, path: &str) -> String {
    let root = normalize_remote_path(root);
    let path = normalize_remote_path(path);
    match (root.is_empty(), path.is_empty()) {
        (true, _) => path,
        (false, true) => root,
        (false, false) => format!("{root}/{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://example.com ".to_string())),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn join_remote_path_handles_empty_segments() {
        assert_eq!(join_remote_path("", "covers/a.jpg"), "covers/a.jpg");
        assert_eq!(join_remote_path("/shelf/", ""), "shelf");
        assert_eq!(
            join_remote_path("/shelf/", "/devices/x/metadata.json"),
            "shelf/devices/x/metadata.json"
        );
    }
}
