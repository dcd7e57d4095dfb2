//! Database operations for the records table.

use sitesync_engine::{checkpoint::format_timestamp, EntityKind, Record};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, QueryBuilder, Row};

/// Bound parameters per `IN (...)` lookup, well under SQLite's limit.
const LOOKUP_CHUNK: usize = 500;

/// A stored record row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub kind: String,
    pub id: String,
    pub body: String,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            kind: row.try_get("kind")?,
            id: row.try_get("id")?,
            body: row.try_get("body")?,
        })
    }
}

impl StoredRecord {
    /// Parse the stored JSON row back into a [`Record`].
    pub fn to_record(&self) -> crate::error::Result<Record> {
        let value: serde_json::Value = serde_json::from_str(&self.body)?;
        Ok(Record::from_value(value)?)
    }
}

/// Upsert a record (insert or replace).
pub async fn upsert_record<'e, E>(
    executor: E,
    kind: EntityKind,
    record: &Record,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let body = record.to_value().to_string();
    sqlx::query(
        r#"
        INSERT INTO records (kind, id, updated_at, deleted_at, body)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (kind, id) DO UPDATE SET
            updated_at = EXCLUDED.updated_at,
            deleted_at = EXCLUDED.deleted_at,
            body = EXCLUDED.body
        "#,
    )
    .bind(kind.table())
    .bind(&record.id)
    .bind(record.updated_at.map(format_timestamp))
    .bind(record.deleted_at.map(format_timestamp))
    .bind(body)
    .execute(executor)
    .await?;

    Ok(())
}

/// Get a record by kind and ID.
pub async fn get_record<'e, E>(
    executor: E,
    kind: EntityKind,
    id: &str,
) -> Result<Option<StoredRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT kind, id, body
        FROM records
        WHERE kind = ?1 AND id = ?2
        "#,
    )
    .bind(kind.table())
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Get all records of a kind, tombstones included, ordered by ID.
pub async fn get_records<'e, E>(
    executor: E,
    kind: EntityKind,
) -> Result<Vec<StoredRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT kind, id, body
        FROM records
        WHERE kind = ?1
        ORDER BY id
        "#,
    )
    .bind(kind.table())
    .fetch_all(executor)
    .await
}

/// Get the records of a kind with the given IDs.
pub async fn get_records_by_id(
    conn: &mut sqlx::SqliteConnection,
    kind: EntityKind,
    ids: &[String],
) -> Result<Vec<StoredRecord>, sqlx::Error> {
    let mut found = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(LOOKUP_CHUNK) {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT kind, id, body FROM records WHERE kind = ");
        query.push_bind(kind.table());
        query.push(" AND id IN (");
        let mut separated = query.separated(", ");
        for id in chunk {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = query
            .build_query_as::<StoredRecord>()
            .fetch_all(&mut *conn)
            .await?;
        found.extend(rows);
    }
    Ok(found)
}

/// Count records of a kind, tombstones included.
pub async fn count_records<'e, E>(executor: E, kind: EntityKind) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT COUNT(*) AS count FROM records WHERE kind = ?1")
        .bind(kind.table())
        .fetch_one(executor)
        .await?;
    row.try_get("count")
}
