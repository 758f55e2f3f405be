//! Re-ownership of records created before sign-in.
//!
//! Records created while signed out are tagged with a placeholder identity.
//! Once a real identity is known they are handed over to it so the next sync
//! picks them up.

use crate::{EntityKind, LocalStore};

/// Placeholder identity used for records created while signed out.
pub const DEFAULT_PLACEHOLDER_IDENTITY: &str = "local-user";

/// Move every record owned by `placeholder` to `identity`.
///
/// Returns how many records were re-owned. Running it twice migrates nothing
/// the second time. Failures are logged and skipped.
pub async fn migrate_placeholder_records(
    store: &dyn LocalStore,
    placeholder: &str,
    identity: &str,
) -> usize {
    if identity == placeholder {
        tracing::debug!(identity, "identity is the placeholder, skipping migration");
        return 0;
    }

    let mut migrated = 0;
    for kind in EntityKind::ALL {
        migrated += migrate_kind(store, kind, placeholder, identity).await;
    }

    if migrated > 0 {
        tracing::info!(identity, migrated, "migrated placeholder records");
    }
    migrated
}

async fn migrate_kind(
    store: &dyn LocalStore,
    kind: EntityKind,
    placeholder: &str,
    identity: &str,
) -> usize {
    let records = match store.fetch_all_owned(kind, placeholder).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(%kind, error = %e, "failed to load placeholder records");
            return 0;
        }
    };

    let mut migrated = 0;
    for mut record in records {
        if !record.is_owned_by(placeholder) {
            continue;
        }
        let id = record.id.clone();
        record.user_id = identity.to_string();
        match store.upsert(kind, record).await {
            Ok(()) => migrated += 1,
            Err(e) => tracing::warn!(%kind, %id, error = %e, "failed to migrate record"),
        }
    }
    migrated
}
