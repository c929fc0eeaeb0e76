//! Author model

use serde::{Deserialize, Serialize};

use super::entity::impl_syncable;
use super::{EntityId, EntityKind};
use crate::util::unix_millis_now;

/// A book author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: EntityId,
    pub name: String,
    /// Name used for ordering, e.g. "Herbert, Frank"
    #[serde(default)]
    pub sort_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl Author {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            sort_name: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_syncable!(Author, EntityKind::Author);
