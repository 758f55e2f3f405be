//! MemoryStore - an in-memory local store with file persistence.
//!
//! Holds every kind's records and the per-identity watermarks behind locks.
//! Each trait call is atomic on its own; nothing spans calls. State can be
//! exported to a [`StoreSnapshot`] and written to disk.

use crate::{
    error::Result, EntityKind, Error, LocalStore, OwnerId, Record, RecordId, StoreSnapshot,
    Timestamp, WatermarkStore,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type Collections = BTreeMap<EntityKind, BTreeMap<RecordId, Record>>;

/// The in-memory local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    watermarks: RwLock<BTreeMap<OwnerId, Timestamp>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let store = Self::new();
        store.import_state(snapshot)?;
        Ok(store)
    }

    fn read_collections(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| Error::Store("record lock poisoned".into()))
    }

    fn write_collections(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| Error::Store("record lock poisoned".into()))
    }

    /// Insert or replace a record without going through the async trait.
    pub fn put(&self, kind: EntityKind, record: Record) -> Result<()> {
        self.write_collections()?
            .entry(kind)
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    /// Get a record by kind and id.
    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>> {
        Ok(self
            .read_collections()?
            .get(&kind)
            .and_then(|records| records.get(id))
            .cloned())
    }

    /// Get a record, failing if it does not exist.
    pub fn require(&self, kind: EntityKind, id: &str) -> Result<Record> {
        self.get(kind, id)?.ok_or_else(|| Error::RecordNotFound {
            kind,
            id: id.to_string(),
        })
    }

    /// All records of a kind, in id order.
    pub fn records(&self, kind: EntityKind) -> Result<Vec<Record>> {
        Ok(self
            .read_collections()?
            .get(&kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Number of records of a kind.
    pub fn len(&self, kind: EntityKind) -> Result<usize> {
        Ok(self
            .read_collections()?
            .get(&kind)
            .map(BTreeMap::len)
            .unwrap_or(0))
    }

    /// Number of records across every kind.
    pub fn total_len(&self) -> Result<usize> {
        Ok(self.read_collections()?.values().map(BTreeMap::len).sum())
    }

    /// Export the full state to a snapshot.
    pub fn export_state(&self) -> Result<StoreSnapshot> {
        let mut snapshot = StoreSnapshot::new();
        snapshot.records = self.read_collections()?.clone();
        snapshot.watermarks = self
            .watermarks
            .read()
            .map_err(|_| Error::Store("watermark lock poisoned".into()))?
            .clone();
        Ok(snapshot)
    }

    /// Replace the current state with a snapshot's.
    pub fn import_state(&self, snapshot: StoreSnapshot) -> Result<()> {
        snapshot.validate()?;
        *self.write_collections()? = snapshot.records;
        *self
            .watermarks
            .write()
            .map_err(|_| Error::Store("watermark lock poisoned".into()))? = snapshot.watermarks;
        Ok(())
    }

    /// Write the current state to `path` as pretty JSON.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.export_state()?.to_json_pretty()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a store previously written with [`save_to`](Self::save_to).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_snapshot(StoreSnapshot::from_json(&json)?)
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn fetch_all_owned(&self, kind: EntityKind, owner: &str) -> Result<Vec<Record>> {
        Ok(self
            .read_collections()?
            .get(&kind)
            .map(|records| {
                records
                    .values()
                    .filter(|r| r.is_owned_by(owner))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Record>> {
        self.records(kind)
    }

    async fn upsert(&self, kind: EntityKind, record: Record) -> Result<()> {
        self.put(kind, record)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        if let Some(records) = self.write_collections()?.get_mut(&kind) {
            records.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn watermark(&self, identity: &str) -> Result<Option<Timestamp>> {
        Ok(self
            .watermarks
            .read()
            .map_err(|_| Error::Store("watermark lock poisoned".into()))?
            .get(identity)
            .copied())
    }

    async fn set_watermark(&self, identity: &str, at: Timestamp) -> Result<()> {
        self.watermarks
            .write()
            .map_err(|_| Error::Store("watermark lock poisoned".into()))?
            .insert(identity.to_string(), at);
        Ok(())
    }
}
