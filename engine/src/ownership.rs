//! Ownership validation.

use crate::Record;

/// Records split by whether they belong to the identity being synced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Partition {
    pub valid: Vec<Record>,
    pub rejected: Vec<Record>,
}

/// Split `records` into those owned by `identity` and everything else.
///
/// Relative order is preserved on both sides and records are never altered.
pub fn partition_by_owner(records: Vec<Record>, identity: &str) -> Partition {
    let (valid, rejected) = records
        .into_iter()
        .partition(|record| record.is_owned_by(identity));
    Partition { valid, rejected }
}
