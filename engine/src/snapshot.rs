//! Snapshot types for persisting and restoring local store state.
//!
//! Snapshots are the bridge between the in-memory [`MemoryStore`](crate::MemoryStore)
//! and a file on disk. Every map is a `BTreeMap` so that the same state always
//! serializes to the same bytes.

use crate::{error::Result, EntityKind, Error, OwnerId, Record, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Records organized by kind, then by record ID
    pub records: BTreeMap<EntityKind, BTreeMap<RecordId, Record>>,
    /// Last successful sync per identity
    #[serde(default)]
    pub watermarks: BTreeMap<OwnerId, Timestamp>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreSnapshot {
    /// Create a new empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            records: BTreeMap::new(),
            watermarks: BTreeMap::new(),
        }
    }

    /// Add a record to the snapshot.
    pub fn add_record(&mut self, kind: EntityKind, record: Record) {
        self.records
            .entry(kind)
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Get a record from the snapshot.
    pub fn get_record(&self, kind: EntityKind, id: &str) -> Option<&Record> {
        self.records.get(&kind)?.get(id)
    }

    /// Count total records across all kinds.
    pub fn record_count(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    /// Check that every record is filed under its own id.
    pub fn validate(&self) -> Result<()> {
        for (kind, records) in &self.records {
            for (key, record) in records {
                if *key != record.id {
                    return Err(Error::InvalidSnapshot(format!(
                        "{kind} record filed under '{key}' has id '{}'",
                        record.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn create_empty_snapshot() {
        let snapshot = StoreSnapshot::new();
        assert_eq!(snapshot.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(snapshot.record_count(), 0);
        assert!(snapshot.watermarks.is_empty());
    }

    #[test]
    fn add_and_get_record() {
        let mut snapshot = StoreSnapshot::new();
        snapshot.add_record(
            EntityKind::Journal,
            Record::new("j-1", "u1").with_field("body", json!("Dear diary")),
        );

        assert_eq!(snapshot.record_count(), 1);
        let retrieved = snapshot.get_record(EntityKind::Journal, "j-1").unwrap();
        assert_eq!(retrieved.fields["body"], "Dear diary");
        assert!(snapshot.get_record(EntityKind::Task, "j-1").is_none());
    }

    #[test]
    fn json_roundtrip() {
        let mut snapshot = StoreSnapshot::new();
        snapshot.add_record(EntityKind::Task, Record::new("t-1", "u1"));
        snapshot.add_record(EntityKind::SleepEntry, Record::new("s-1", "u1"));
        snapshot
            .watermarks
            .insert("u1".into(), Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        let json = snapshot.to_json().unwrap();
        let restored = StoreSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, restored);
    }

    #[test]
    fn deterministic_serialization() {
        let mut a = StoreSnapshot::new();
        a.add_record(EntityKind::Goal, Record::new("g-2", "u1"));
        a.add_record(EntityKind::Task, Record::new("t-1", "u1"));
        a.add_record(EntityKind::Goal, Record::new("g-1", "u1"));

        let mut b = StoreSnapshot::new();
        b.add_record(EntityKind::Goal, Record::new("g-1", "u1"));
        b.add_record(EntityKind::Task, Record::new("t-1", "u1"));
        b.add_record(EntityKind::Goal, Record::new("g-2", "u1"));

        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }

    #[test]
    fn reject_future_format_version() {
        let json = r#"{"formatVersion":999,"records":{},"watermarks":{}}"#;
        let result = StoreSnapshot::from_json(json);
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn reject_misfiled_record() {
        let json = r#"{"formatVersion":1,"records":{"tasks":{"t-1":{"id":"t-2","userId":"u1"}}}}"#;
        let result = StoreSnapshot::from_json(json);
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }
}
