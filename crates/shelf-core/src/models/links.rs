//! Many-to-many relationship rows

use serde::{Deserialize, Serialize};

use super::{EntityId, Link};

/// Book written by author.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAuthor {
    pub book_id: EntityId,
    pub author_id: EntityId,
}

impl BookAuthor {
    #[must_use]
    pub const fn new(book_id: EntityId, author_id: EntityId) -> Self {
        Self { book_id, author_id }
    }
}

impl Link for BookAuthor {
    fn left(&self) -> &EntityId {
        &self.book_id
    }

    fn right(&self) -> &EntityId {
        &self.author_id
    }
}

/// Book filed in collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionBook {
    pub collection_id: EntityId,
    pub book_id: EntityId,
}

impl CollectionBook {
    #[must_use]
    pub const fn new(collection_id: EntityId, book_id: EntityId) -> Self {
        Self {
            collection_id,
            book_id,
        }
    }
}

impl Link for CollectionBook {
    fn left(&self) -> &EntityId {
        &self.collection_id
    }

    fn right(&self) -> &EntityId {
        &self.book_id
    }
}
