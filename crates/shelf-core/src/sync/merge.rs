//! Last-write-wins reconciliation of two catalog snapshots.
//!
//! Everything here is pure: the functions take the local and remote rows and
//! return what must change locally. Applying the result is the repository's
//! job (`CatalogRepository::apply_merge`).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{
    AppendOnly, Author, Book, BookAuthor, Collection, CollectionBook, EntityId, EntityKind,
    FilterPreset, LibraryPayload, Link, LocationHistoryEntry, ReadingSession, StorageLocation,
    Syncable, VocabularyEntry,
};

/// Which side wins when both rows carry the same `updated_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TieBreak {
    #[default]
    PreferLocal,
    PreferRemote,
}

impl TieBreak {
    /// Name recorded in the conflict log.
    #[must_use]
    pub const fn strategy_name(self) -> &'static str {
        match self {
            Self::PreferLocal => "lww_prefer_local",
            Self::PreferRemote => "lww_prefer_remote",
        }
    }
}

/// An incoming row that lost against the local row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub kind: EntityKind,
    pub id: EntityId,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
}

/// Decisions for one entity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMerge<T> {
    /// Remote rows with no local counterpart
    pub to_insert: Vec<T>,
    /// Remote rows that replace the local row
    pub to_update: Vec<T>,
    /// Ids of live local rows that become tombstones (also present in `to_update`)
    pub to_delete: Vec<EntityId>,
    /// Local rows left as they are
    pub unchanged: usize,
    pub conflicts: Vec<MergeConflict>,
}

impl<T> Default for TableMerge<T> {
    fn default() -> Self {
        Self {
            to_insert: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
            unchanged: 0,
            conflicts: Vec::new(),
        }
    }
}

impl<T> TableMerge<T> {
    #[must_use]
    pub fn counts(&self) -> MergeCounts {
        MergeCounts {
            inserted: self.to_insert.len(),
            updated: self.to_update.len(),
            deleted: self.to_delete.len(),
            unchanged: self.unchanged,
            conflicts: self.conflicts.len(),
        }
    }

    /// Whether applying this table changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }
}

/// Scalar summary of a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCounts {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub conflicts: usize,
}

impl std::ops::AddAssign for MergeCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.deleted += rhs.deleted;
        self.unchanged += rhs.unchanged;
        self.conflicts += rhs.conflicts;
    }
}

/// Full result of merging a remote payload into the local catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub tie_break: TieBreak,
    pub books: TableMerge<Book>,
    pub authors: TableMerge<Author>,
    pub collections: TableMerge<Collection>,
    pub storage_locations: TableMerge<StorageLocation>,
    pub reading_sessions: TableMerge<ReadingSession>,
    pub filter_presets: TableMerge<FilterPreset>,
    pub vocabulary_entries: TableMerge<VocabularyEntry>,
    pub location_history: TableMerge<LocationHistoryEntry>,
    /// Complete link set after the merge; replaces the stored links
    pub book_authors: Vec<BookAuthor>,
    pub collection_books: Vec<CollectionBook>,
    /// Whether the rebuilt link sets differ from the local ones
    pub links_changed: bool,
}

impl MergeOutcome {
    /// Per-table counts, in a stable order.
    #[must_use]
    pub fn table_counts(&self) -> Vec<(EntityKind, MergeCounts)> {
        vec![
            (EntityKind::Book, self.books.counts()),
            (EntityKind::Author, self.authors.counts()),
            (EntityKind::Collection, self.collections.counts()),
            (EntityKind::StorageLocation, self.storage_locations.counts()),
            (EntityKind::ReadingSession, self.reading_sessions.counts()),
            (EntityKind::FilterPreset, self.filter_presets.counts()),
            (EntityKind::VocabularyEntry, self.vocabulary_entries.counts()),
            (EntityKind::LocationHistory, self.location_history.counts()),
        ]
    }

    /// Counts summed over every table.
    #[must_use]
    pub fn totals(&self) -> MergeCounts {
        let mut totals = MergeCounts::default();
        for (_, counts) in self.table_counts() {
            totals += counts;
        }
        totals
    }

    /// Every rejected incoming row across all tables.
    pub fn conflicts(&self) -> impl Iterator<Item = &MergeConflict> {
        self.books
            .conflicts
            .iter()
            .chain(&self.authors.conflicts)
            .chain(&self.collections.conflicts)
            .chain(&self.storage_locations.conflicts)
            .chain(&self.reading_sessions.conflicts)
            .chain(&self.filter_presets.conflicts)
            .chain(&self.vocabulary_entries.conflicts)
    }

    /// Whether the local store is already identical to the merged state.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.books.is_empty()
            && self.authors.is_empty()
            && self.collections.is_empty()
            && self.storage_locations.is_empty()
            && self.reading_sessions.is_empty()
            && self.filter_presets.is_empty()
            && self.vocabulary_entries.is_empty()
            && self.location_history.is_empty()
            && !self.links_changed
    }
}

/// Merge one syncable table.
///
/// Remote wins iff its `updated_at` is strictly newer; equal timestamps follow
/// `tie_break`. Rows that exist only locally are never touched, and tombstones
/// that exist only remotely are not imported.
pub fn merge_entities<T>(local: &[T], remote: &[T], tie_break: TieBreak) -> TableMerge<T>
where
    T: Syncable + PartialEq,
{
    let local_by_id: BTreeMap<&EntityId, &T> = local.iter().map(|row| (row.id(), row)).collect();
    let mut merge = TableMerge::default();
    let mut seen = BTreeSet::new();

    for incoming in remote {
        if !seen.insert(incoming.id()) {
            continue;
        }
        let Some(existing) = local_by_id.get(incoming.id()) else {
            if !incoming.is_deleted() {
                merge.to_insert.push(incoming.clone());
            }
            continue;
        };

        if *existing == incoming {
            merge.unchanged += 1;
            continue;
        }

        let remote_wins = match incoming.updated_at().cmp(&existing.updated_at()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => tie_break == TieBreak::PreferRemote,
        };

        if remote_wins {
            if incoming.is_deleted() && !existing.is_deleted() {
                merge.to_delete.push(incoming.id().clone());
            }
            merge.to_update.push(incoming.clone());
        } else {
            merge.unchanged += 1;
            merge.conflicts.push(MergeConflict {
                kind: T::KIND,
                id: incoming.id().clone(),
                local_updated_at: existing.updated_at(),
                incoming_updated_at: incoming.updated_at(),
            });
        }
    }

    merge.unchanged += local
        .iter()
        .filter(|row| !seen.contains(row.id()))
        .count();
    merge
}

/// Merge an append-only table: remote rows missing locally are inserted,
/// nothing is ever updated.
pub fn merge_append_only<T: AppendOnly>(local: &[T], remote: &[T]) -> TableMerge<T> {
    let local_ids: BTreeSet<&EntityId> = local.iter().map(AppendOnly::id).collect();
    let mut inserted = BTreeSet::new();
    let mut merge = TableMerge {
        unchanged: local.len(),
        ..TableMerge::default()
    };

    for incoming in remote {
        if incoming.is_deleted()
            || local_ids.contains(incoming.id())
            || !inserted.insert(incoming.id())
        {
            continue;
        }
        merge.to_insert.push(incoming.clone());
    }
    merge
}

/// Ids that are live (not tombstoned) once `merge` is applied over `local`.
pub fn live_ids<T: Syncable>(local: &[T], merge: &TableMerge<T>) -> BTreeSet<EntityId> {
    let mut state: BTreeMap<&EntityId, bool> = local
        .iter()
        .map(|row| (row.id(), row.is_deleted()))
        .collect();
    for row in merge.to_insert.iter().chain(&merge.to_update) {
        state.insert(row.id(), row.is_deleted());
    }
    state
        .into_iter()
        .filter(|(_, deleted)| !deleted)
        .map(|(id, _)| id.clone())
        .collect()
}

/// Union of local and remote links whose endpoints are both live.
///
/// The result is sorted and free of duplicates.
pub fn rebuild_links<L: Link>(
    local: &[L],
    remote: &[L],
    left_live: &BTreeSet<EntityId>,
    right_live: &BTreeSet<EntityId>,
) -> Vec<L> {
    local
        .iter()
        .chain(remote)
        .filter(|link| left_live.contains(link.left()) && right_live.contains(link.right()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn same_links<L: Link>(stored: &[L], rebuilt: &[L]) -> bool {
    let stored: BTreeSet<&L> = stored.iter().collect();
    let rebuilt: BTreeSet<&L> = rebuilt.iter().collect();
    stored == rebuilt
}

/// Merge every table of `remote` into `local` and rebuild the link tables.
#[must_use]
pub fn merge_payload(
    local: &LibraryPayload,
    remote: &LibraryPayload,
    tie_break: TieBreak,
) -> MergeOutcome {
    let books = merge_entities(&local.books, &remote.books, tie_break);
    let authors = merge_entities(&local.authors, &remote.authors, tie_break);
    let collections = merge_entities(&local.collections, &remote.collections, tie_break);

    let live_books = live_ids(&local.books, &books);
    let live_authors = live_ids(&local.authors, &authors);
    let live_collections = live_ids(&local.collections, &collections);

    let book_authors = rebuild_links(
        &local.book_authors,
        &remote.book_authors,
        &live_books,
        &live_authors,
    );
    let collection_books = rebuild_links(
        &local.collection_books,
        &remote.collection_books,
        &live_collections,
        &live_books,
    );
    let links_changed = !same_links(&local.book_authors, &book_authors)
        || !same_links(&local.collection_books, &collection_books);

    MergeOutcome {
        tie_break,
        books,
        authors,
        collections,
        storage_locations: merge_entities(
            &local.storage_locations,
            &remote.storage_locations,
            tie_break,
        ),
        reading_sessions: merge_entities(
            &local.reading_sessions,
            &remote.reading_sessions,
            tie_break,
        ),
        filter_presets: merge_entities(&local.filter_presets, &remote.filter_presets, tie_break),
        vocabulary_entries: merge_entities(
            &local.vocabulary_entries,
            &remote.vocabulary_entries,
            tie_break,
        ),
        location_history: merge_append_only(&local.location_history, &remote.location_history),
        book_authors,
        collection_books,
        links_changed,
    }
}
