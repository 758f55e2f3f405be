//! Seams between the engine and the outside world.
//!
//! The engine owns no storage and no network. Everything it touches goes
//! through these traits so an application can plug in its own database and
//! transport, and tests can plug in fakes.

use crate::{
    error::Result, EntityKind, OwnerId, Record, RemoteSnapshot, SyncPayload, Timestamp,
    TransportError, UploadReceipt,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The client-side durable record store.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Every record of `kind` tagged with `owner`.
    async fn fetch_all_owned(&self, kind: EntityKind, owner: &str) -> Result<Vec<Record>>;

    /// Every record of `kind`, regardless of owner.
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Record>>;

    /// Insert or replace the record with the same id.
    async fn upsert(&self, kind: EntityKind, record: Record) -> Result<()>;

    /// Remove the record with `id`. Removing a missing record is not an error.
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()>;
}

/// Persistence for per-identity sync watermarks.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn watermark(&self, identity: &str) -> Result<Option<Timestamp>>;

    async fn set_watermark(&self, identity: &str, at: Timestamp) -> Result<()>;
}

/// The remote authoritative store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload a payload, returning per-kind counts and resolved conflicts.
    async fn upload_payload(
        &self,
        payload: &SyncPayload,
        credential: &Credential,
    ) -> std::result::Result<UploadReceipt, TransportError>;

    /// Fetch every record the remote holds for the credential's identity.
    async fn download_snapshot(
        &self,
        credential: &Credential,
    ) -> std::result::Result<RemoteSnapshot, TransportError>;
}

/// A bearer credential for the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub token: String,
    /// Known expiry, if the issuer told us
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, at: Timestamp) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Whether the credential's known expiry is at or before `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Who is syncing, and with what.
///
/// Passed explicitly into every sync operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: OwnerId,
    pub credential: Option<Credential>,
}

impl Session {
    pub fn new(identity: impl Into<OwnerId>, credential: Credential) -> Self {
        Self {
            identity: identity.into(),
            credential: Some(credential),
        }
    }

    /// A session with no credential at all.
    pub fn anonymous(identity: impl Into<OwnerId>) -> Self {
        Self {
            identity: identity.into(),
            credential: None,
        }
    }
}
