//! Per-kind record collections exchanged with the remote.
//!
//! The same shape travels in both directions: the client uploads a
//! [`SyncPayload`] and downloads a [`RemoteSnapshot`]. On the wire both are a
//! JSON object keyed by the kind's wire name:
//!
//! ```json
//! { "tasks": [ ... ], "calendarNotes": [ ... ] }
//! ```

use crate::{error::Result, EntityKind, Error, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Records grouped by kind, iterated in kind order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncPayload {
    kinds: BTreeMap<EntityKind, Vec<Record>>,
}

/// The full set of records the remote holds for one identity.
pub type RemoteSnapshot = SyncPayload;

impl SyncPayload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the collection for `kind`.
    pub fn insert(&mut self, kind: EntityKind, records: Vec<Record>) {
        self.kinds.insert(kind, records);
    }

    /// Append one record to the collection for `kind`.
    pub fn push(&mut self, kind: EntityKind, record: Record) {
        self.kinds.entry(kind).or_default().push(record);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, kind: EntityKind, records: Vec<Record>) -> Self {
        self.insert(kind, records);
        self
    }

    /// Records for `kind`; empty when the kind is absent.
    pub fn get(&self, kind: EntityKind) -> &[Record] {
        self.kinds.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Take the collection for `kind` out of the payload.
    pub fn take(&mut self, kind: EntityKind) -> Vec<Record> {
        self.kinds.remove(&kind).unwrap_or_default()
    }

    /// Iterate over every present kind in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, &[Record])> {
        self.kinds.iter().map(|(kind, records)| (*kind, records.as_slice()))
    }

    /// Total number of records across every kind.
    pub fn len(&self) -> usize {
        self.kinds.values().map(Vec::len).sum()
    }

    /// Whether no kind holds any record.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-kind record counts, omitting empty kinds.
    pub fn counts(&self) -> BTreeMap<EntityKind, usize> {
        self.kinds
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(kind, records)| (*kind, records.len()))
            .collect()
    }

    /// Every structural problem with the payload, in kind then index order.
    pub fn violations(&self) -> Vec<PayloadViolation> {
        let mut violations = Vec::new();
        for (kind, records) in &self.kinds {
            for (index, record) in records.iter().enumerate() {
                if !record.has_id() {
                    violations.push(PayloadViolation {
                        kind: *kind,
                        index,
                        reason: "missing id",
                    });
                }
            }
        }
        violations
    }

    /// Fail if any record is unfit for upload.
    pub fn validate(&self) -> Result<()> {
        let violations = self.violations();
        if violations.is_empty() {
            return Ok(());
        }
        let described: Vec<String> = violations.iter().map(ToString::to_string).collect();
        Err(Error::InvalidPayload(described.join(", ")))
    }
}

/// A single record that failed payload validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadViolation {
    pub kind: EntityKind,
    pub index: usize,
    pub reason: &'static str,
}

impl fmt::Display for PayloadViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.kind, self.index, self.reason)
    }
}

/// The remote's answer to an accepted upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// Records processed per kind, conflicts included
    #[serde(default)]
    pub synced: BTreeMap<EntityKind, usize>,
    /// Records where the remote kept its own newer copy
    #[serde(default)]
    pub conflicts_resolved: usize,
}
