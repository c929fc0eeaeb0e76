//! Saved filter presets and controlled-vocabulary entries

use serde::{Deserialize, Serialize};

use super::entity::impl_syncable;
use super::{EntityId, EntityKind};
use crate::util::unix_millis_now;

/// A saved catalog filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPreset {
    pub id: EntityId,
    pub name: String,
    /// Serialized filter definition, opaque to the sync engine
    pub query: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl FilterPreset {
    #[must_use]
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            query: query.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_syncable!(FilterPreset, EntityKind::FilterPreset);

/// One allowed value of a controlled vocabulary (genre, format, language, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyEntry {
    pub id: EntityId,
    /// Vocabulary this value belongs to, e.g. "genre"
    pub vocabulary: String,
    pub value: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl VocabularyEntry {
    #[must_use]
    pub fn new(vocabulary: impl Into<String>, value: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: EntityId::new(),
            vocabulary: vocabulary.into(),
            value: value.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_syncable!(VocabularyEntry, EntityKind::VocabularyEntry);
