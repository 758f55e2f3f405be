//! Removal of records that belong to somebody else.
//!
//! After a download the local store should hold only the active identity's
//! data. Anything else is a leftover from another account on this device.

use crate::{EntityKind, LocalStore};
use std::collections::HashSet;

/// Delete every local record whose owner is not `identity`.
///
/// Returns how many records were removed. A record owned by `identity` is
/// never deleted; failures are logged and skipped.
pub async fn sweep_foreign_records(store: &dyn LocalStore, identity: &str) -> usize {
    let mut removed = 0;

    for kind in EntityKind::ALL {
        let records = match store.fetch_all(kind).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(%kind, error = %e, "cleanup could not scan records");
                continue;
            }
        };

        // Deletion is by id, so an id shared with one of our records is off limits.
        let ours: HashSet<&str> = records
            .iter()
            .filter(|r| r.is_owned_by(identity))
            .map(|r| r.id.as_str())
            .collect();

        for record in records.iter().filter(|r| !r.is_owned_by(identity)) {
            if ours.contains(record.id.as_str()) {
                tracing::warn!(%kind, id = %record.id, "foreign record shares an id with an owned one, keeping both");
                continue;
            }
            match store.delete(kind, &record.id).await {
                Ok(()) => {
                    tracing::debug!(%kind, id = %record.id, owner = %record.user_id, "removed foreign record");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(%kind, id = %record.id, error = %e, "failed to remove foreign record")
                }
            }
        }
    }

    if removed > 0 {
        tracing::info!(identity, removed, "cleanup removed foreign records");
    }
    removed
}
