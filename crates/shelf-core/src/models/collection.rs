//! User-defined book collections

use serde::{Deserialize, Serialize};

use super::entity::impl_syncable;
use super::{EntityId, EntityKind};
use crate::util::unix_millis_now;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl Collection {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_syncable!(Collection, EntityKind::Collection);
