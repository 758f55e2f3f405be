//! Last-write-wins reconciliation for the remote of record.
//!
//! When an uploaded record meets the copy already stored for the same id,
//! exactly one of them survives. The rules, in order:
//!
//! 1. No stored copy: insert.
//! 2. Stored copy owned by someone else: refuse the whole upload.
//! 3. Either side has no `updatedAt`: apply the incoming copy, since the
//!    comparison cannot be made.
//! 4. Incoming strictly newer: apply.
//! 5. Otherwise keep the stored copy and count a resolved conflict.

use crate::Record;
use serde::{Deserialize, Serialize};

/// What to do with one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    /// No stored record with this id
    Insert,
    /// The stored record belongs to another owner
    Forbidden,
    /// The incoming record replaces the stored one
    Apply,
    /// The stored record is at least as new; incoming is dropped
    KeepExisting,
}

impl Resolution {
    /// Whether the incoming record is written.
    pub fn writes(self) -> bool {
        matches!(self, Resolution::Insert | Resolution::Apply)
    }

    /// Whether this counts as a resolved conflict.
    pub fn is_conflict(self) -> bool {
        self == Resolution::KeepExisting
    }
}

/// Decide between the stored and the incoming copy of a record.
pub fn resolve(existing: Option<&Record>, incoming: &Record, owner: &str) -> Resolution {
    let Some(existing) = existing else {
        return Resolution::Insert;
    };

    if !existing.is_owned_by(owner) {
        return Resolution::Forbidden;
    }

    match (incoming.updated_at, existing.updated_at) {
        (Some(incoming_at), Some(existing_at)) if incoming_at <= existing_at => {
            Resolution::KeepExisting
        }
        _ => Resolution::Apply,
    }
}

/// Running totals for one reconciled upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub inserted: usize,
    pub applied: usize,
    pub conflicts: usize,
}

impl Tally {
    pub fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Insert => self.inserted += 1,
            Resolution::Apply => self.applied += 1,
            Resolution::KeepExisting => self.conflicts += 1,
            Resolution::Forbidden => {}
        }
    }

    /// Records processed, conflicts included.
    pub fn processed(&self) -> usize {
        self.inserted + self.applied + self.conflicts
    }
}
