//! The sync engine: upload of local changes and download of remote state.
//!
//! # Upload (`sync`)
//!
//! 1. Resolve the credential; a missing or known-expired one ends the call
//!    before any IO.
//! 2. Hand placeholder-owned records to the session identity.
//! 3. Collect changed records since the identity's watermark.
//! 4. Validate the payload as a whole; one bad record aborts everything.
//! 5. Upload, bounded by the configured timeout.
//! 6. Advance the watermark only if the upload succeeded.
//!
//! # Download (`download`)
//!
//! Fetch the remote snapshot, keep what the identity owns, upsert it record
//! by record, sweep out foreign records, advance the watermark and announce
//! the merge.
//!
//! Both operations share a per-identity single-flight guard: a second call
//! for an identity that is already syncing returns a retryable failure
//! without touching the store or the network.

use crate::{
    broadcast::{Broadcaster, NoopBroadcaster, SyncEvent},
    classify::classify,
    cleanup::sweep_foreign_records,
    clock::{Clock, SystemClock},
    collect::collect_changes,
    migrate::migrate_placeholder_records,
    ownership::partition_by_owner,
    Credential, EngineConfig, EntityKind, LocalStore, OwnerId, RemoteStore, Session, SyncPhase,
    SyncResult, SyncStats, TransportError, WatermarkStore,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Progress callback: the current phase and a short human readable note.
pub type ProgressFn<'a> = &'a (dyn Fn(SyncPhase, &str) + Send + Sync);

/// Message carried by the single-flight rejection.
pub const SYNC_IN_PROGRESS: &str = "sync already in progress";

/// Message for sessions with no credential.
pub const AUTHENTICATION_REQUIRED: &str = "authentication required";

/// Orchestrates upload and download for any number of identities.
pub struct SyncEngine {
    local: Arc<dyn LocalStore>,
    watermarks: Arc<dyn WatermarkStore>,
    remote: Arc<dyn RemoteStore>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    in_flight: Arc<Mutex<HashSet<OwnerId>>>,
}

impl SyncEngine {
    /// Create an engine with the system clock, no broadcaster and default config.
    pub fn new(
        local: Arc<dyn LocalStore>,
        watermarks: Arc<dyn WatermarkStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            local,
            watermarks,
            remote,
            broadcaster: Arc::new(NoopBroadcaster),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a sync or download is running for `identity`.
    pub fn is_syncing(&self, identity: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(identity)
    }

    /// Upload every local change made since the last successful sync.
    pub async fn sync(&self, session: &Session, progress: Option<ProgressFn<'_>>) -> SyncResult {
        let identity = session.identity.as_str();
        let Some(_guard) = InFlight::acquire(&self.in_flight, identity) else {
            tracing::debug!(identity, "sync rejected, another one is running");
            return SyncResult::failed("Sync skipped", SYNC_IN_PROGRESS, true);
        };

        let credential = match self.resolve_credential(session, "Sync failed") {
            Ok(credential) => credential,
            Err(result) => return result,
        };

        let started = self.clock.now();

        migrate_placeholder_records(
            self.local.as_ref(),
            &self.config.placeholder_identity,
            identity,
        )
        .await;

        report(progress, SyncPhase::Loading, "Collecting local changes");
        let watermark = match self.watermarks.watermark(identity).await {
            Ok(watermark) => watermark,
            Err(e) => {
                tracing::warn!(identity, error = %e, "could not read watermark, collecting everything");
                None
            }
        };

        let collected = collect_changes(self.local.as_ref(), identity, watermark).await;

        if collected.payload.is_empty() {
            tracing::debug!(identity, "no local changes to sync");
            let stats = SyncStats {
                rejected: collected.rejected,
                ..Default::default()
            };
            return SyncResult::ok("No changes to sync", stats);
        }

        let violations = collected.payload.violations();
        if !violations.is_empty() {
            let described: Vec<String> = violations.iter().map(ToString::to_string).collect();
            tracing::warn!(identity, violations = %described.join(", "), "refusing to upload invalid payload");
            return SyncResult::failed(
                "Sync failed",
                format!("Invalid data: {}", described.join(", ")),
                false,
            );
        }

        let total = collected.payload.len();
        report(
            progress,
            SyncPhase::Saving,
            &format!("Uploading {total} records"),
        );
        tracing::info!(identity, total, "uploading local changes");

        let receipt = match self
            .bounded(self.remote.upload_payload(&collected.payload, credential))
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => return self.failure("Sync failed", identity, &e),
        };

        self.commit_watermark(identity, started).await;

        let stats = SyncStats {
            per_kind: receipt.synced,
            conflicts_resolved: receipt.conflicts_resolved,
            rejected: collected.rejected,
            removed: 0,
        };
        tracing::info!(identity, %stats, "sync complete");
        SyncResult::ok(format!("Synced {stats}"), stats)
    }

    /// Replace local state with the remote's view for the session identity.
    pub async fn download(
        &self,
        session: &Session,
        progress: Option<ProgressFn<'_>>,
    ) -> SyncResult {
        let identity = session.identity.as_str();
        let Some(_guard) = InFlight::acquire(&self.in_flight, identity) else {
            tracing::debug!(identity, "download rejected, a sync is running");
            return SyncResult::failed("Download skipped", SYNC_IN_PROGRESS, true);
        };

        let credential = match self.resolve_credential(session, "Download failed") {
            Ok(credential) => credential,
            Err(result) => return result,
        };

        let started = self.clock.now();

        report(progress, SyncPhase::Loading, "Downloading remote data");
        let mut snapshot = match self.bounded(self.remote.download_snapshot(credential)).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.failure("Download failed", identity, &e),
        };

        report(progress, SyncPhase::Saving, "Merging remote data");
        let mut stats = SyncStats::default();
        for kind in EntityKind::ALL {
            let partition = partition_by_owner(snapshot.take(kind), identity);
            if !partition.rejected.is_empty() {
                tracing::warn!(
                    %kind,
                    identity,
                    rejected = partition.rejected.len(),
                    "remote sent records owned by another identity"
                );
                stats.rejected += partition.rejected.len();
            }

            let mut merged = 0;
            for record in partition.valid {
                let id = record.id.clone();
                match self.local.upsert(kind, record).await {
                    Ok(()) => merged += 1,
                    Err(e) => tracing::warn!(%kind, %id, error = %e, "failed to merge record"),
                }
            }
            if merged > 0 {
                stats.per_kind.insert(kind, merged);
            }
        }

        stats.removed = sweep_foreign_records(self.local.as_ref(), identity).await;
        self.commit_watermark(identity, started).await;

        self.broadcaster.broadcast(SyncEvent::Downloaded {
            identity: identity.to_string(),
            counts: stats.per_kind.clone(),
        });

        tracing::info!(identity, %stats, removed = stats.removed, "download complete");
        SyncResult::ok(format!("Downloaded {stats}"), stats)
    }

    fn resolve_credential<'s>(
        &self,
        session: &'s Session,
        message: &str,
    ) -> Result<&'s Credential, SyncResult> {
        let Some(credential) = session.credential.as_ref() else {
            tracing::debug!(identity = %session.identity, "no credential, not contacting the remote");
            return Err(SyncResult::failed(message, AUTHENTICATION_REQUIRED, false));
        };

        if credential.is_expired(self.clock.now()) {
            tracing::info!(identity = %session.identity, "credential expired");
            self.broadcaster.broadcast(SyncEvent::CredentialExpired {
                identity: session.identity.clone(),
            });
            return Err(SyncResult::token_expired(message));
        }

        Ok(credential)
    }

    /// Bound a remote call by the configured timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        let limit = self.config.request_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::network(format!(
                "request timed out after {}s",
                limit.as_secs_f32()
            ))),
        }
    }

    fn failure(&self, message: &str, identity: &str, error: &TransportError) -> SyncResult {
        let classification = classify(error);
        tracing::warn!(
            identity,
            status = ?error.status,
            error = %error,
            retryable = classification.retryable,
            "remote call failed"
        );

        if classification.token_expired {
            self.broadcaster.broadcast(SyncEvent::CredentialExpired {
                identity: identity.to_string(),
            });
        }
        SyncResult::from_classification(message, classification)
    }

    /// Move the watermark to `at`, never backwards.
    async fn commit_watermark(&self, identity: &str, at: crate::Timestamp) {
        let previous = match self.watermarks.watermark(identity).await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(identity, error = %e, "could not read watermark before commit");
                None
            }
        };
        let next = previous.map_or(at, |previous| previous.max(at));

        if let Err(e) = self.watermarks.set_watermark(identity, next).await {
            tracing::error!(identity, error = %e, "failed to store watermark");
        }
    }
}

fn report(progress: Option<ProgressFn<'_>>, phase: SyncPhase, note: &str) {
    tracing::debug!(%phase, note, "sync progress");
    if let Some(progress) = progress {
        progress(phase, note);
    }
}

/// Marks an identity as syncing until dropped.
struct InFlight {
    set: Arc<Mutex<HashSet<OwnerId>>>,
    identity: OwnerId,
}

impl InFlight {
    fn acquire(set: &Arc<Mutex<HashSet<OwnerId>>>, identity: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity.to_string());
        inserted.then(|| Self {
            set: Arc::clone(set),
            identity: identity.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.identity);
    }
}
