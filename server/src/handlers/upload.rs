//! Upload handler - applies a client's payload with last-write-wins.

use chrono::Utc;
use daybook_engine::{
    reconcile::Tally, resolve, Record, Resolution, SyncPayload, UploadReceipt,
};
use sqlx::PgPool;

use crate::db;
use crate::error::{AppError, Result};

/// Reject a payload before touching the database.
///
/// Fails with 400 when the payload is too large or a record has no id, and
/// with 403 when a record names a different owner.
pub fn check_upload(payload: &SyncPayload, user_id: &str, max_items: usize) -> Result<()> {
    let total = payload.len();
    if total > max_items {
        return Err(AppError::BadRequest(format!(
            "Too many items to sync ({total}, max {max_items})"
        )));
    }

    payload.validate()?;

    for (kind, records) in payload.iter() {
        if let Some(record) = records
            .iter()
            .find(|r| !r.user_id.is_empty() && r.user_id != user_id)
        {
            tracing::warn!(
                user_id,
                %kind,
                record_id = %record.id,
                claimed_owner = %record.user_id,
                "upload names another owner"
            );
            return Err(forbidden());
        }
    }

    Ok(())
}

/// The stored copy of a record. An unreadable row fails with 500.
fn stored_copy(row: db::StoredRecord) -> Result<Record> {
    let (kind, id) = (row.kind.clone(), row.record_id.clone());
    row.into_record().map(|(_, record)| record).map_err(|e| {
        tracing::error!(%kind, %id, error = %e, "stored record is unreadable");
        AppError::Internal(format!("stored record {kind}/{id} is unreadable"))
    })
}

fn forbidden() -> AppError {
    AppError::Forbidden("Cannot sync data for another user".to_string())
}

/// Apply an upload inside one transaction.
///
/// Any error drops the transaction, rolling back every write made so far.
pub async fn handle_upload(
    pool: &PgPool,
    user_id: &str,
    payload: &SyncPayload,
    max_items: usize,
) -> Result<UploadReceipt> {
    check_upload(payload, user_id, max_items)?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut receipt = UploadReceipt::default();

    for (kind, records) in payload.iter() {
        let mut tally = Tally::default();

        for record in records {
            let existing = db::find_record_for_update(&mut *tx, kind, &record.id)
                .await?
                .map(stored_copy)
                .transpose()?;

            let resolution = resolve(existing.as_ref(), record, user_id);
            if resolution == Resolution::Forbidden {
                tracing::warn!(user_id, %kind, record_id = %record.id, "record belongs to another user");
                return Err(forbidden());
            }

            if resolution.writes()
                && !db::upsert_record(&mut *tx, kind, record, user_id, now).await?
            {
                tracing::warn!(user_id, %kind, record_id = %record.id, "record was claimed by another user");
                return Err(forbidden());
            }
            tally.record(resolution);
        }

        if tally.processed() > 0 {
            receipt.synced.insert(kind, tally.processed());
        }
        receipt.conflicts_resolved += tally.conflicts;
    }

    tx.commit().await?;

    tracing::info!(
        user_id,
        total = payload.len(),
        conflicts = receipt.conflicts_resolved,
        "upload applied"
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_engine::EntityKind;

    fn payload(records: Vec<Record>) -> SyncPayload {
        SyncPayload::new().with(EntityKind::Task, records)
    }

    #[test]
    fn accepts_own_records() {
        let payload = payload(vec![Record::new("t-1", "u1"), Record::new("t-2", "")]);
        assert!(check_upload(&payload, "u1", 1000).is_ok());
    }

    #[test]
    fn rejects_oversized_payload() {
        let records = (0..3).map(|i| Record::new(format!("t-{i}"), "u1")).collect();
        let err = check_upload(&payload(records), "u1", 2).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn rejects_records_for_another_owner() {
        let payload = payload(vec![Record::new("t-1", "u1"), Record::new("t-2", "u2")]);
        let err = check_upload(&payload, "u1", 1000).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn rejects_records_without_id() {
        let payload = payload(vec![Record::new("", "u1")]);
        let err = check_upload(&payload, "u1", 1000).unwrap_err();
        assert!(matches!(
            err,
            AppError::Engine(daybook_engine::Error::InvalidPayload(_))
        ));
    }

    fn stored_row(kind: &str, payload: serde_json::Value) -> db::StoredRecord {
        db::StoredRecord {
            kind: kind.to_string(),
            record_id: "t-1".to_string(),
            user_id: "u1".to_string(),
            payload,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn unreadable_stored_row_is_an_internal_error() {
        let err = stored_copy(stored_row("tasks", serde_json::json!("not an object"))).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let err = stored_copy(stored_row("widgets", serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let record = stored_copy(stored_row("tasks", serde_json::json!({"title": "a"}))).unwrap();
        assert_eq!(record.user_id, "u1");
    }
}
