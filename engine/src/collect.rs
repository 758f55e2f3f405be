//! Assembly of the outbound payload from the local store.

use crate::{
    changes::select_changed, dedup::dedup_by_id, ownership::partition_by_owner, EntityKind,
    LocalStore, SyncPayload, Timestamp,
};
use std::collections::HashSet;

/// The payload plus what was dropped while building it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    pub payload: SyncPayload,
    /// Records that claimed to be ours but carried another owner
    pub rejected: usize,
    /// Duplicate ids discarded
    pub duplicates: usize,
    /// Owned records hidden behind a foreign duplicate that won deduplication
    pub shadowed: usize,
}

/// Gather every changed record owned by `identity`.
///
/// Kinds are walked in order: fetch, deduplicate, validate ownership, then
/// keep only what changed after `watermark`. A kind whose fetch fails is
/// logged and contributes nothing, so one broken table never blocks the rest.
pub async fn collect_changes(
    store: &dyn LocalStore,
    identity: &str,
    watermark: Option<Timestamp>,
) -> Collected {
    let mut collected = Collected::default();

    for kind in EntityKind::ALL {
        let fetched = match store.fetch_all_owned(kind, identity).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(%kind, identity, error = %e, "failed to load local records");
                collected.payload.insert(kind, Vec::new());
                continue;
            }
        };

        let owned_ids: HashSet<String> = fetched
            .iter()
            .filter(|r| r.is_owned_by(identity))
            .map(|r| r.id.clone())
            .collect();

        let deduped = dedup_by_id(fetched);
        collected.duplicates += deduped.discarded;

        let partition = partition_by_owner(deduped.records, identity);
        if !partition.rejected.is_empty() {
            tracing::warn!(
                %kind,
                identity,
                rejected = partition.rejected.len(),
                "dropping records owned by another identity"
            );
            collected.rejected += partition.rejected.len();

            for record in partition.rejected.iter().filter(|r| owned_ids.contains(&r.id)) {
                tracing::warn!(
                    %kind,
                    identity,
                    id = %record.id,
                    owner = %record.user_id,
                    "owned record not uploaded, a foreign duplicate came first"
                );
                collected.shadowed += 1;
            }
        }

        let changed = select_changed(partition.valid, watermark);
        tracing::debug!(%kind, identity, changed = changed.len(), "collected local changes");
        collected.payload.insert(kind, changed);
    }

    collected
}
