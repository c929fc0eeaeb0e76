//! Reading session model

use serde::{Deserialize, Serialize};

use super::entity::impl_syncable;
use super::{EntityId, EntityKind};
use crate::util::unix_millis_now;

/// A span of time spent reading one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSession {
    pub id: EntityId,
    pub book_id: EntityId,
    /// Session start (Unix ms)
    pub started_at: i64,
    /// Session end (Unix ms); `None` while the session is open
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub start_page: Option<i64>,
    #[serde(default)]
    pub end_page: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl ReadingSession {
    /// Start a session for `book_id` now.
    #[must_use]
    pub fn start(book_id: EntityId) -> Self {
        let now = unix_millis_now();
        Self {
            id: EntityId::new(),
            book_id,
            started_at: now,
            ended_at: None,
            start_page: None,
            end_page: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Pages read, when both ends are known.
    #[must_use]
    pub fn pages_read(&self) -> Option<i64> {
        match (self.start_page, self.end_page) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }
}

impl_syncable!(ReadingSession, EntityKind::ReadingSession);
