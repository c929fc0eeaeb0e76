//! Book model

use serde::{Deserialize, Serialize};

use super::entity::impl_syncable;
use super::{EntityId, EntityKind};
use crate::util::unix_millis_now;

/// A book in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Unique identifier
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub published_year: Option<i64>,
    #[serde(default)]
    pub page_count: Option<i64>,
    /// File name of the cover asset under `covers/`
    #[serde(default)]
    pub cover_filename: Option<String>,
    /// Current shelf/box the book lives in
    #[serde(default)]
    pub storage_location_id: Option<EntityId>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Soft delete timestamp (Unix ms)
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl Book {
    /// Create a new book with the given title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: EntityId::new(),
            title: title.into(),
            subtitle: None,
            isbn: None,
            publisher: None,
            published_year: None,
            page_count: None,
            cover_filename: None,
            storage_location_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_syncable!(Book, EntityKind::Book);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Syncable;

    #[test]
    fn test_book_new() {
        let book = Book::new("Dune");
        assert_eq!(book.title, "Dune");
        assert!(!book.is_deleted());
        assert_eq!(book.created_at, book.updated_at);
    }

    #[test]
    fn test_mark_deleted_bumps_updated_at() {
        let mut book = Book::new("Dune");
        book.mark_deleted(book.updated_at + 10);
        assert!(book.is_deleted());
        assert_eq!(book.deleted_at, Some(book.updated_at));
    }

    #[test]
    fn test_book_json_is_camel_case() {
        let book = Book::new("Dune");
        let json = serde_json::to_value(&book).unwrap();
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("deletedAt").is_some());
        assert!(json.get("coverFilename").is_some());
    }
}
