//! Entity-level sync payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Author, Book, BookAuthor, Collection, CollectionBook, FilterPreset, LocationHistoryEntry,
    ReadingSession, StorageLocation, VocabularyEntry,
};

/// Every catalog table, tombstones included, as exported by one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryPayload {
    /// Local schema version of the exporting replica
    pub schema_version: i32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub storage_locations: Vec<StorageLocation>,
    #[serde(default)]
    pub reading_sessions: Vec<ReadingSession>,
    #[serde(default)]
    pub filter_presets: Vec<FilterPreset>,
    #[serde(default)]
    pub vocabulary_entries: Vec<VocabularyEntry>,
    #[serde(default)]
    pub location_history: Vec<LocationHistoryEntry>,
    #[serde(default)]
    pub book_authors: Vec<BookAuthor>,
    #[serde(default)]
    pub collection_books: Vec<CollectionBook>,
}

impl LibraryPayload {
    /// An empty payload stamped with `schema_version`.
    #[must_use]
    pub fn empty(schema_version: i32) -> Self {
        Self {
            schema_version,
            exported_at: Utc::now(),
            device_id: None,
            books: Vec::new(),
            authors: Vec::new(),
            collections: Vec::new(),
            storage_locations: Vec::new(),
            reading_sessions: Vec::new(),
            filter_presets: Vec::new(),
            vocabulary_entries: Vec::new(),
            location_history: Vec::new(),
            book_authors: Vec::new(),
            collection_books: Vec::new(),
        }
    }

    /// Total number of entity rows (links excluded).
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.books.len()
            + self.authors.len()
            + self.collections.len()
            + self.storage_locations.len()
            + self.reading_sessions.len()
            + self.filter_presets.len()
            + self.vocabulary_entries.len()
            + self.location_history.len()
    }
}
