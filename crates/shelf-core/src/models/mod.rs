//! Data models for Shelf

mod author;
mod book;
mod collection;
mod entity;
mod id;
mod links;
mod location;
mod metadata;
mod payload;
mod preset;
mod reading_session;
pub mod settings;
mod sync_conflict;

pub use author::Author;
pub use book::Book;
pub use collection::Collection;
pub use entity::{AppendOnly, EntityKind, Link, Syncable};
pub use id::EntityId;
pub use links::{BookAuthor, CollectionBook};
pub use location::{LocationHistoryEntry, StorageLocation};
pub use metadata::{DeviceRecord, SharedSyncMetadata, DEVICE_RECORD_VERSION};
pub use payload::LibraryPayload;
pub use preset::{FilterPreset, VocabularyEntry};
pub use reading_session::ReadingSession;
pub use settings::SettingsMap;
pub use sync_conflict::SyncConflict;
