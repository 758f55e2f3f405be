//! Error types for the Daybook sync engine.

use crate::EntityKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failed remote call, as observed by the engine.
///
/// `status` is `None` when no HTTP status was received at all (connection
/// refused, DNS failure, timeout). A response that arrived but could not be
/// decoded keeps its status.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct TransportError {
    pub status: Option<u16>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TransportError {
    /// A failure that never reached the remote or never got a status back.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            detail: None,
        }
    }

    /// A failure reported by the remote with an HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            detail: None,
        }
    }

    /// Attach diagnostic detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// All possible errors from the engine.
#[derive(Debug, Error)]
pub enum Error {
    // Local store errors
    #[error("local store error: {0}")]
    Store(String),

    #[error("record not found: {kind}/{id}")]
    RecordNotFound { kind: EntityKind, id: String },

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    // Remote errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    // Validation errors
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
