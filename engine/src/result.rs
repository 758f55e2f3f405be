//! The outcome of a sync or download, as reported to the caller.

use crate::{classify::Classification, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Phase reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    Loading,
    Saving,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Loading => f.write_str("loading"),
            SyncPhase::Saving => f.write_str("saving"),
        }
    }
}

/// Counts describing what a sync or download did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Records uploaded or merged, per kind
    pub per_kind: BTreeMap<EntityKind, usize>,
    /// Records where the remote kept its own newer copy
    pub conflicts_resolved: usize,
    /// Records skipped because another identity owns them
    pub rejected: usize,
    /// Records deleted locally by the cleanup sweep
    pub removed: usize,
}

impl SyncStats {
    pub fn total(&self) -> usize {
        self.per_kind.values().sum()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.per_kind.get(&kind).copied().unwrap_or(0)
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .per_kind
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(kind, count)| {
                let label = if *count == 1 {
                    kind.label()
                } else {
                    kind.plural_label()
                };
                format!("{count} {label}")
            })
            .collect();

        if parts.is_empty() {
            f.write_str("nothing")?;
        } else {
            f.write_str(&parts.join(", "))?;
        }
        write!(f, "; {} conflicts resolved", self.conflicts_resolved)
    }
}

/// What a sync or download call reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SyncStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expired: Option<bool>,
}

impl SyncResult {
    /// A successful outcome.
    pub fn ok(message: impl Into<String>, stats: SyncStats) -> Self {
        Self {
            success: true,
            message: message.into(),
            stats: Some(stats),
            error: None,
            retryable: None,
            token_expired: None,
        }
    }

    /// A failure with explicit retry guidance.
    pub fn failed(message: impl Into<String>, error: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            message: message.into(),
            stats: None,
            error: Some(error.into()),
            retryable: Some(retryable),
            token_expired: None,
        }
    }

    /// A failure derived from a classified transport error.
    pub fn from_classification(
        message: impl Into<String>,
        classification: Classification,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            stats: None,
            error: Some(classification.message),
            retryable: Some(classification.retryable),
            token_expired: classification.token_expired.then_some(true),
        }
    }

    /// The credential is known to be expired; re-authentication is required.
    pub fn token_expired(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            stats: None,
            error: Some(crate::classify::SESSION_EXPIRED.to_string()),
            retryable: Some(false),
            token_expired: Some(true),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable.unwrap_or(false)
    }

    pub fn is_token_expired(&self) -> bool {
        self.token_expired.unwrap_or(false)
    }
}
