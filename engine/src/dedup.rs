//! Record deduplication.
//!
//! Local stores occasionally hold several rows with the same `id` for one
//! kind (interrupted writes, old migrations). The remote upserts by `id`, so
//! only one of them may leave the device.

use crate::{Record, RecordId};
use std::collections::HashSet;

/// Outcome of a deduplication pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Deduplicated {
    /// Kept records, in their original relative order
    pub records: Vec<Record>,
    /// How many later duplicates were discarded
    pub discarded: usize,
}

/// Keep the first occurrence of every `id`, discarding the rest.
///
/// Each discarded duplicate is logged. Never fails.
pub fn dedup_by_id(records: Vec<Record>) -> Deduplicated {
    let mut seen: HashSet<RecordId> = HashSet::with_capacity(records.len());
    let mut kept = Vec::with_capacity(records.len());
    let mut discarded = 0;

    for record in records {
        if seen.contains(&record.id) {
            tracing::warn!(id = %record.id, "discarding duplicate record");
            discarded += 1;
            continue;
        }
        seen.insert(record.id.clone());
        kept.push(record);
    }

    Deduplicated {
        records: kept,
        discarded,
    }
}
