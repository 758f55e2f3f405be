//! # Daybook Engine
//!
//! Offline-first sync for the Daybook journaling app.
//!
//! Every record is written to a local store first and reconciled with the
//! remote of record later, whenever the network and a valid session allow.
//! This crate owns that reconciliation; storage and transport are plugged in
//! through the traits in [`ports`].
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] belongs to one of the [`EntityKind`]s (tasks, expenses,
//! journals, goals, calendar notes, sleep entries, mood entries,
//! reflections) and carries:
//! - An `id`, unique within its kind
//! - The owning identity (`userId`)
//! - Optional `createdAt` / `updatedAt` timestamps
//! - Everything else as opaque JSON fields
//!
//! ### Watermarks
//!
//! Each identity has a sync watermark: the time of its last fully successful
//! upload or download. Only records changed after it are uploaded. It never
//! moves backwards and never moves on failure, so an interrupted sync is
//! simply repeated.
//!
//! ### Upload pipeline
//!
//! Per kind: fetch owned records, drop duplicate ids ([`dedup`]), drop
//! records owned by someone else ([`ownership`]), keep what changed
//! ([`changes`]). The result is one [`SyncPayload`] that is validated and
//! uploaded as a unit.
//!
//! ### Failures
//!
//! Failed remote calls are classified ([`classify`]) into retryable,
//! final, and "sign in again". The caller always gets a [`SyncResult`];
//! sync never panics and never returns `Err`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daybook_engine::{Credential, EntityKind, HttpRemote, MemoryStore, Record, Session, SyncEngine};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> daybook_engine::error::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store.put(EntityKind::Task, Record::new("t-1", "user-42"))?;
//!
//! let remote = Arc::new(HttpRemote::new("http://localhost:3000", Duration::from_secs(30))?);
//! let engine = SyncEngine::new(store.clone(), store, remote);
//!
//! let session = Session::new("user-42", Credential::new("session-token"));
//! let result = engine.sync(&session, None).await;
//! println!("{}", result.message);
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistence
//!
//! [`MemoryStore::export_state`] and [`MemoryStore::import_state`] convert to
//! and from [`StoreSnapshot`], which serializes to deterministic JSON.

pub mod broadcast;
pub mod changes;
pub mod classify;
pub mod cleanup;
pub mod clock;
pub mod collect;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod http;
pub mod migrate;
pub mod ownership;
pub mod payload;
pub mod ports;
pub mod reconcile;
pub mod record;
pub mod result;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use broadcast::{Broadcaster, ChannelBroadcaster, NoopBroadcaster, SyncEvent};
pub use classify::{classify, Classification};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{ProgressFn, SyncEngine};
pub use error::{Error, TransportError};
pub use http::HttpRemote;
pub use payload::{PayloadViolation, RemoteSnapshot, SyncPayload, UploadReceipt};
pub use ports::{Credential, LocalStore, RemoteStore, Session, WatermarkStore};
pub use reconcile::{resolve, Resolution};
pub use record::{EntityKind, Recency, Record};
pub use result::{SyncPhase, SyncResult, SyncStats};
pub use snapshot::{StoreSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use store::MemoryStore;

/// Type aliases for clarity
pub type RecordId = String;
pub type OwnerId = String;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
