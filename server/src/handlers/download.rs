//! Download handler - serves a user's full snapshot.

use daybook_engine::{EntityKind, RemoteSnapshot};
use sqlx::PgPool;

use crate::db;
use crate::error::Result;

/// Build the snapshot of every record `user_id` owns.
pub async fn handle_download(pool: &PgPool, user_id: &str) -> Result<RemoteSnapshot> {
    let rows = db::list_records_for_user(pool, user_id).await?;

    let mut snapshot = RemoteSnapshot::new();
    for kind in EntityKind::ALL {
        snapshot.insert(kind, Vec::new());
    }

    for row in rows {
        let record_id = row.record_id.clone();
        match row.into_record() {
            Ok((kind, record)) => snapshot.push(kind, record),
            Err(e) => {
                // Skip rows this build cannot represent
                tracing::warn!(%record_id, error = %e, "skipping stored record");
            }
        }
    }

    tracing::debug!(user_id, total = snapshot.len(), "serving snapshot");
    Ok(snapshot)
}
