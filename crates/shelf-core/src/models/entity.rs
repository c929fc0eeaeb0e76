//! Sync traits shared by every catalog table.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use super::EntityId;

/// Which catalog collection a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Book,
    Author,
    Collection,
    StorageLocation,
    ReadingSession,
    FilterPreset,
    VocabularyEntry,
    LocationHistory,
}

impl EntityKind {
    /// Stable lowercase name, also used as the conflict log key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Author => "author",
            Self::Collection => "collection",
            Self::StorageLocation => "storage_location",
            Self::ReadingSession => "reading_session",
            Self::FilterPreset => "filter_preset",
            Self::VocabularyEntry => "vocabulary_entry",
            Self::LocationHistory => "location_history",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row that carries last-write-wins metadata.
///
/// A row with `deleted_at` set is a tombstone: hidden from read paths but kept
/// so the deletion reaches other replicas.
pub trait Syncable: Clone + fmt::Debug + Send + Sync {
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;

    /// Unix ms of the last local mutation.
    fn updated_at(&self) -> i64;

    fn deleted_at(&self) -> Option<i64>;

    /// Stamp a local mutation.
    fn touch(&mut self, now: i64);

    /// Turn the row into a tombstone.
    fn mark_deleted(&mut self, now: i64);

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// A row that is immutable after creation except for soft-delete.
pub trait AppendOnly: Clone + fmt::Debug + Send + Sync {
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;

    fn created_at(&self) -> i64;

    fn deleted_at(&self) -> Option<i64>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// A many-to-many pair with no identity of its own.
pub trait Link: Clone + fmt::Debug + Ord + Hash + Send + Sync {
    fn left(&self) -> &EntityId;
    fn right(&self) -> &EntityId;
}

macro_rules! impl_syncable {
    ($ty:ty, $kind:expr) => {
        impl $crate::models::Syncable for $ty {
            const KIND: $crate::models::EntityKind = $kind;

            fn id(&self) -> &$crate::models::EntityId {
                &self.id
            }

            fn updated_at(&self) -> i64 {
                self.updated_at
            }

            fn deleted_at(&self) -> Option<i64> {
                self.deleted_at
            }

            fn touch(&mut self, now: i64) {
                self.updated_at = now;
            }

            fn mark_deleted(&mut self, now: i64) {
                self.deleted_at = Some(now);
                self.updated_at = now;
            }
        }
    };
}

pub(crate) use impl_syncable;
