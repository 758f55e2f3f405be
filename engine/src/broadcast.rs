//! Completion notifications for the embedding application.
//!
//! After a download has merged remote data, views showing local records are
//! stale. The engine announces that fact through a [`Broadcaster`] and never
//! waits for anybody to listen.

use crate::{EntityKind, OwnerId};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Something worth telling the rest of the application about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Remote data was merged into the local store
    Downloaded {
        identity: OwnerId,
        counts: BTreeMap<EntityKind, usize>,
    },
    /// The remote refused the credential; the user must sign in again
    CredentialExpired { identity: OwnerId },
}

impl SyncEvent {
    /// Total number of merged records, for `Downloaded`.
    pub fn total(&self) -> usize {
        match self {
            SyncEvent::Downloaded { counts, .. } => counts.values().sum(),
            SyncEvent::CredentialExpired { .. } => 0,
        }
    }
}

/// Fire-and-forget event sink.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, event: SyncEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn broadcast(&self, _event: SyncEvent) {}
}

/// Fans events out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<SyncEvent>,
}

impl ChannelBroadcaster {
    /// Create a broadcaster whose channel buffers up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Start listening. Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast(&self, event: SyncEvent) {
        // No subscribers is fine.
        if let Err(e) = self.sender.send(event) {
            tracing::trace!(event = ?e.0, "sync event dropped, nobody listening");
        }
    }
}
