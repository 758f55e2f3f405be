//! Watermark based change selection.

use crate::{Record, Timestamp};

/// Keep the records that changed after `watermark`.
///
/// With no watermark every record is selected. Records whose recency is
/// unknown are always selected; the comparison is strict so a record stamped
/// exactly at the watermark is considered already synced.
pub fn select_changed(records: Vec<Record>, watermark: Option<Timestamp>) -> Vec<Record> {
    let Some(watermark) = watermark else {
        return records;
    };

    records
        .into_iter()
        .filter(|record| record.recency().is_after(watermark))
        .collect()
}
