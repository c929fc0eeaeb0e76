//! Storage locations and the per-book location history

use serde::{Deserialize, Serialize};

use super::entity::impl_syncable;
use super::{AppendOnly, EntityId, EntityKind};
use crate::util::unix_millis_now;

/// A physical place books are kept (room, shelf, box).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocation {
    pub id: EntityId,
    pub name: String,
    /// Enclosing location, if nested
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl StorageLocation {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            parent_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_syncable!(StorageLocation, EntityKind::StorageLocation);

/// Record of a book being moved to a location. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationHistoryEntry {
    pub id: EntityId,
    pub book_id: EntityId,
    /// `None` when the book was removed from every location
    #[serde(default)]
    pub storage_location_id: Option<EntityId>,
    pub created_at: i64,
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl LocationHistoryEntry {
    #[must_use]
    pub fn new(book_id: EntityId, storage_location_id: Option<EntityId>) -> Self {
        Self {
            id: EntityId::new(),
            book_id,
            storage_location_id,
            created_at: unix_millis_now(),
            deleted_at: None,
        }
    }
}

impl AppendOnly for LocationHistoryEntry {
    const KIND: EntityKind = EntityKind::LocationHistory;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn deleted_at(&self) -> Option<i64> {
        self.deleted_at
    }
}
