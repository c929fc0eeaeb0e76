//! Row mapping between catalog models and their libSQL tables.

use libsql::{Connection, Row, Value};

use crate::error::Result;
use crate::models::{
    Author, Book, BookAuthor, Collection, CollectionBook, EntityId, FilterPreset, Link,
    LocationHistoryEntry, ReadingSession, StorageLocation, VocabularyEntry,
};

/// A model stored as one row of one table.
///
/// `COLUMNS[0]` is always the `id` primary key and `to_values` yields values
/// in `COLUMNS` order.
pub trait Table: Sized {
    const NAME: &'static str;
    const COLUMNS: &'static [&'static str];

    fn to_values(&self) -> Vec<Value>;

    fn from_row(row: &Row) -> Result<Self>;
}

fn column_list<T: Table>() -> String {
    T::COLUMNS.join(", ")
}

fn placeholders<T: Table>() -> String {
    vec!["?"; T::COLUMNS.len()].join(", ")
}

/// Every row of `T`, tombstones included, ordered by id.
pub async fn select_all<T: Table>(conn: &Connection) -> Result<Vec<T>> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY id",
        column_list::<T>(),
        T::NAME
    );
    let mut rows = conn.query(&sql, ()).await?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push(T::from_row(&row)?);
    }
    Ok(out)
}

/// Fetch one row by id, tombstones included.
pub async fn select_by_id<T: Table>(conn: &Connection, id: &EntityId) -> Result<Option<T>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?",
        column_list::<T>(),
        T::NAME
    );
    let mut rows = conn.query(&sql, [id.as_str()]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(T::from_row(&row)?)),
        None => Ok(None),
    }
}

/// Insert a row or overwrite every column of the existing row with that id.
///
/// Uses `ON CONFLICT DO UPDATE` rather than `INSERT OR REPLACE` so that link
/// rows cascading from this one survive.
pub async fn upsert<T: Table>(conn: &Connection, value: &T) -> Result<()> {
    let assignments = T::COLUMNS[1..]
        .iter()
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        T::NAME,
        column_list::<T>(),
        placeholders::<T>(),
        assignments
    );
    conn.execute(&sql, value.to_values()).await?;
    Ok(())
}

/// Insert a row unless one with the same id already exists.
pub async fn insert_if_absent<T: Table>(conn: &Connection, value: &T) -> Result<bool> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        T::NAME,
        column_list::<T>(),
        placeholders::<T>()
    );
    let changed = conn.execute(&sql, value.to_values()).await?;
    Ok(changed > 0)
}

fn id_value(id: &EntityId) -> Value {
    Value::from(id.as_str())
}

fn opt_id_value(id: Option<&EntityId>) -> Value {
    Value::from(id.map(EntityId::as_str))
}

fn get_id(row: &Row, idx: i32) -> Result<EntityId> {
    Ok(EntityId::from(row.get::<String>(idx)?))
}

fn get_opt_id(row: &Row, idx: i32) -> Result<Option<EntityId>> {
    Ok(row.get::<Option<String>>(idx)?.map(EntityId::from))
}

impl Table for Book {
    const NAME: &'static str = "books";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "subtitle",
        "isbn",
        "publisher",
        "published_year",
        "page_count",
        "cover_filename",
        "storage_location_id",
        "notes",
        "created_at",
        "updated_at",
        "deleted_at",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            id_value(&self.id),
            Value::from(self.title.clone()),
            Value::from(self.subtitle.clone()),
            Value::from(self.isbn.clone()),
            Value::from(self.publisher.clone()),
            Value::from(self.published_year),
            Value::from(self.page_count),
            Value::from(self.cover_filename.clone()),
            opt_id_value(self.storage_location_id.as_ref()),
            Value::from(self.notes.clone()),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.deleted_at),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: get_id(row, 0)?,
            title: row.get(1)?,
            subtitle: row.get(2)?,
            isbn: row.get(3)?,
            publisher: row.get(4)?,
            published_year: row.get(5)?,
            page_count: row.get(6)?,
            cover_filename: row.get(7)?,
            storage_location_id: get_opt_id(row, 8)?,
            notes: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            deleted_at: row.get(12)?,
        })
    }
}

impl Table for Author {
    const NAME: &'static str = "authors";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "sort_name",
        "created_at",
        "updated_at",
        "deleted_at",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            id_value(&self.id),
            Value::from(self.name.clone()),
            Value::from(self.sort_name.clone()),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.deleted_at),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: get_id(row, 0)?,
            name: row.get(1)?,
            sort_name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
        })
    }
}

impl Table for Collection {
    const NAME: &'static str = "collections";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "description",
        "created_at",
        "updated_at",
        "deleted_at",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            id_value(&self.id),
            Value::from(self.name.clone()),
            Value::from(self.description.clone()),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.deleted_at),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: get_id(row, 0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
        })
    }
}

impl Table for StorageLocation {
    const NAME: &'static str = "storage_locations";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "parent_id",
        "created_at",
        "updated_at",
        "deleted_at",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            id_value(&self.id),
            Value::from(self.name.clone()),
            opt_id_value(self.parent_id.as_ref()),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.deleted_at),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: get_id(row, 0)?,
            name: row.get(1)?,
            parent_id: get_opt_id(row, 2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
        })
    }
}

impl Table for ReadingSession {
    const NAME: &'static str = "reading_sessions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "book_id",
        "started_at",
        "ended_at",
        "start_page",
        "end_page",
        "created_at",
        "updated_at",
        "deleted_at",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            id_value(&self.id),
            id_value(&self.book_id),
            Value::from(self.started_at),
            Value::from(self.ended_at),
            Value::from(self.start_page),
            Value::from(self.end_page),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.deleted_at),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: get_id(row, 0)?,
            book_id: get_id(row, 1)?,
            started_at: row.get(2)?,
            ended_at: row.get(3)?,
            start_page: row.get(4)?,
            end_page: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            deleted_at: row.get(8)?,
        })
    }
}

impl Table for FilterPreset {
    const NAME: &'static str = "filter_presets";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "query",
        "created_at",
        "updated_at",
        "deleted_at",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            id_value(&self.id),
            Value::from(self.name.clone()),
            Value::from(self.query.clone()),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.deleted_at),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: get_id(row, 0)?,
            name: row.get(1)?,
            query: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
        })
    }
}

impl Table for VocabularyEntry {
    const NAME: &'static str = "vocabulary_entries";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "vocabulary",
        "value",
        "created_at",
        "updated_at",
        "deleted_at",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            id_value(&self.id),
            Value::from(self.vocabulary.clone()),
            Value::from(self.value.clone()),
            Value::from(self.created_at),
            Value::from(self.updated_at),
            Value::from(self.deleted_at),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: get_id(row, 0)?,
            vocabulary: row.get(1)?,
            value: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
        })
    }
}

impl Table for LocationHistoryEntry {
    const NAME: &'static str = "location_history";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "book_id",
        "storage_location_id",
        "created_at",
        "deleted_at",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            id_value(&self.id),
            id_value(&self.book_id),
            opt_id_value(self.storage_location_id.as_ref()),
            Value::from(self.created_at),
            Value::from(self.deleted_at),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: get_id(row, 0)?,
            book_id: get_id(row, 1)?,
            storage_location_id: get_opt_id(row, 2)?,
            created_at: row.get(3)?,
            deleted_at: row.get(4)?,
        })
    }
}

/// A link model stored in a two-column junction table.
pub trait LinkTable: Link {
    const NAME: &'static str;
    const LEFT: &'static str;
    const RIGHT: &'static str;

    fn from_ids(left: EntityId, right: EntityId) -> Self;
}

impl LinkTable for BookAuthor {
    const NAME: &'static str = "book_authors";
    const LEFT: &'static str = "book_id";
    const RIGHT: &'static str = "author_id";

    fn from_ids(left: EntityId, right: EntityId) -> Self {
        Self::new(left, right)
    }
}

impl LinkTable for CollectionBook {
    const NAME: &'static str = "collection_books";
    const LEFT: &'static str = "collection_id";
    const RIGHT: &'static str = "book_id";

    fn from_ids(left: EntityId, right: EntityId) -> Self {
        Self::new(left, right)
    }
}

/// Every stored link of `L`, sorted.
pub async fn select_links<L: LinkTable>(conn: &Connection) -> Result<Vec<L>> {
    let sql = format!(
        "SELECT {left}, {right} FROM {table} ORDER BY {left}, {right}",
        left = L::LEFT,
        right = L::RIGHT,
        table = L::NAME
    );
    let mut rows = conn.query(&sql, ()).await?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push(L::from_ids(get_id(&row, 0)?, get_id(&row, 1)?));
    }
    Ok(out)
}

pub async fn insert_link<L: LinkTable>(conn: &Connection, link: &L) -> Result<()> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
        L::NAME,
        L::LEFT,
        L::RIGHT
    );
    conn.execute(&sql, [link.left().as_str(), link.right().as_str()])
        .await?;
    Ok(())
}

pub async fn delete_link<L: LinkTable>(conn: &Connection, link: &L) -> Result<bool> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ? AND {} = ?",
        L::NAME,
        L::LEFT,
        L::RIGHT
    );
    let changed = conn
        .execute(&sql, [link.left().as_str(), link.right().as_str()])
        .await?;
    Ok(changed > 0)
}

/// Replace the whole link table with `links`.
pub async fn replace_links<L: LinkTable>(conn: &Connection, links: &[L]) -> Result<()> {
    conn.execute(&format!("DELETE FROM {}", L::NAME), ()).await?;
    for link in links {
        insert_link(conn, link).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_then_select_roundtrips_optional_columns() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();

        let mut book = Book::new("Dune");
        book.isbn = Some("9780441013593".to_string());
        book.published_year = Some(1965);
        upsert(conn, &book).await.unwrap();

        book.title = "Dune Messiah".to_string();
        book.deleted_at = Some(book.updated_at + 1);
        upsert(conn, &book).await.unwrap();

        let all = select_all::<Book>(conn).await.unwrap();
        assert_eq!(all, vec![book.clone()]);

        let fetched = select_by_id::<Book>(conn, &book.id).await.unwrap();
        assert_eq!(fetched, Some(book));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_if_absent_never_overwrites() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();

        let entry = LocationHistoryEntry::new(EntityId::from("b1"), None);
        assert!(insert_if_absent(conn, &entry).await.unwrap());

        let mut changed = entry.clone();
        changed.storage_location_id = Some(EntityId::from("shelf-2"));
        assert!(!insert_if_absent(conn, &changed).await.unwrap());

        let stored = select_all::<LocationHistoryEntry>(conn).await.unwrap();
        assert_eq!(stored, vec![entry]);
    }
}
