//! Database operations for the records table.

use chrono::{DateTime, Utc};
use daybook_engine::{EntityKind, Record};
use sqlx::{PgConnection, PgPool, Row};

/// A stored record row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub kind: String,
    pub record_id: String,
    pub user_id: String,
    pub payload: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            kind: row.try_get("kind")?,
            record_id: row.try_get("record_id")?,
            user_id: row.try_get("user_id")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredRecord {
    /// Convert a database row back into an engine record.
    pub fn into_record(self) -> Result<(EntityKind, Record), daybook_engine::Error> {
        let kind: EntityKind = self.kind.parse()?;
        let fields = match self.payload {
            serde_json::Value::Object(fields) => fields,
            other => {
                return Err(daybook_engine::Error::Store(format!(
                    "{kind}/{} payload is not an object: {other}",
                    self.record_id
                )))
            }
        };

        Ok((
            kind,
            Record {
                id: self.record_id,
                user_id: self.user_id,
                created_at: self.created_at,
                updated_at: self.updated_at,
                fields,
            },
        ))
    }
}

const SELECT_COLUMNS: &str = "kind, record_id, user_id, payload, created_at, updated_at";

/// Fetch a record and lock its row for the rest of the transaction.
pub async fn find_record_for_update(
    conn: &mut PgConnection,
    kind: EntityKind,
    record_id: &str,
) -> Result<Option<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(&format!(
        "SELECT {SELECT_COLUMNS} FROM records WHERE kind = $1 AND record_id = $2 FOR UPDATE"
    ))
    .bind(kind.wire_name())
    .bind(record_id)
    .fetch_optional(conn)
    .await
}

/// Insert or overwrite a record on behalf of `user_id`.
///
/// The stored owner is always `user_id` and `updated_at` is always `now`,
/// whatever the client sent. Returns `false` when the row exists under a
/// different owner; nothing is written then. This also covers a row another
/// transaction inserted after our `FOR UPDATE` lookup found nothing.
pub async fn upsert_record(
    conn: &mut PgConnection,
    kind: EntityKind,
    record: &Record,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let payload = serde_json::Value::Object(record.fields.clone());

    let result = sqlx::query(
        r#"
        INSERT INTO records (kind, record_id, user_id, payload, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (kind, record_id) DO UPDATE SET
            payload = EXCLUDED.payload,
            created_at = COALESCE(records.created_at, EXCLUDED.created_at),
            updated_at = EXCLUDED.updated_at
        WHERE records.user_id = EXCLUDED.user_id
        "#,
    )
    .bind(kind.wire_name())
    .bind(&record.id)
    .bind(user_id)
    .bind(payload)
    .bind(record.created_at.unwrap_or(now))
    .bind(now)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Every record owned by `user_id`, oldest first within each kind.
pub async fn list_records_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(&format!(
        "SELECT {SELECT_COLUMNS} FROM records WHERE user_id = $1 \
         ORDER BY kind, created_at NULLS FIRST, record_id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}
