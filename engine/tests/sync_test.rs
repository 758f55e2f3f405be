//! End-to-end tests for daybook-engine
//!
//! These drive `SyncEngine` against a `MemoryStore` and a scripted remote.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use daybook_engine::{
    error::Result, Broadcaster, ChannelBroadcaster, Credential, EngineConfig, EntityKind,
    LocalStore, ManualClock, MemoryStore, Record, RemoteSnapshot, RemoteStore, Session,
    SyncEngine, SyncEvent, SyncPayload, SyncPhase, Timestamp, TransportError, UploadReceipt,
    WatermarkStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Test Doubles
// ============================================================================

/// A remote that records every call and answers from a script.
#[derive(Default)]
struct ScriptedRemote {
    uploads: Mutex<Vec<SyncPayload>>,
    downloads: AtomicUsize,
    upload_error: Mutex<Option<TransportError>>,
    snapshot: Mutex<RemoteSnapshot>,
    conflicts: usize,
    delay: Option<std::time::Duration>,
}

impl ScriptedRemote {
    fn failing_with(error: TransportError) -> Self {
        let remote = Self::default();
        *remote.upload_error.lock().unwrap() = Some(error);
        remote
    }

    fn serving(snapshot: RemoteSnapshot) -> Self {
        let remote = Self::default();
        *remote.snapshot.lock().unwrap() = snapshot;
        remote
    }

    fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    fn network_calls(&self) -> usize {
        self.upload_count() + self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    async fn upload_payload(
        &self,
        payload: &SyncPayload,
        _credential: &Credential,
    ) -> std::result::Result<UploadReceipt, TransportError> {
        self.uploads.lock().unwrap().push(payload.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.upload_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(UploadReceipt {
            synced: payload.counts(),
            conflicts_resolved: self.conflicts,
        })
    }

    async fn download_snapshot(
        &self,
        _credential: &Credential,
    ) -> std::result::Result<RemoteSnapshot, TransportError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

/// Counts every local store call made through it.
struct CountingStore {
    inner: Arc<MemoryStore>,
    calls: AtomicUsize,
}

#[async_trait]
impl LocalStore for CountingStore {
    async fn fetch_all_owned(&self, kind: EntityKind, owner: &str) -> Result<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_all_owned(kind, owner).await
    }

    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_all(kind).await
    }

    async fn upsert(&self, kind: EntityKind, record: Record) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(kind, record).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(kind, id).await
    }
}

/// Refuses to write the listed ids; everything else goes to `inner`.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    refused: Vec<&'static str>,
}

#[async_trait]
impl LocalStore for FlakyStore {
    async fn fetch_all_owned(&self, kind: EntityKind, owner: &str) -> Result<Vec<Record>> {
        self.inner.fetch_all_owned(kind, owner).await
    }

    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Record>> {
        self.inner.fetch_all(kind).await
    }

    async fn upsert(&self, kind: EntityKind, record: Record) -> Result<()> {
        if self.refused.contains(&record.id.as_str()) {
            return Err(daybook_engine::Error::Store("disk full".into()));
        }
        self.inner.upsert(kind, record).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.inner.delete(kind, id).await
    }
}

fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).unwrap()
}

const NOW: i64 = 1_736_935_200; // 2025-01-15T10:00:00Z

fn session(identity: &str) -> Session {
    Session::new(identity, Credential::new("token-abc"))
}

fn engine_with(
    store: &Arc<MemoryStore>,
    remote: &Arc<ScriptedRemote>,
) -> (SyncEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(at(NOW)));
    let engine =
        SyncEngine::new(store.clone(), store.clone(), remote.clone()).with_clock(clock.clone());
    (engine, clock)
}

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn end_to_end_sync_uploads_only_owned_records() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("t-1", "u1").updated(at(NOW - 60))).unwrap();
    store.put(EntityKind::Task, Record::new("t-2", "u1").updated(at(NOW - 30))).unwrap();
    store.put(EntityKind::Task, Record::new("t-3", "u2").updated(at(NOW - 30))).unwrap();

    let remote = Arc::new(ScriptedRemote::default());
    let (engine, _clock) = engine_with(&store, &remote);

    let result = engine.sync(&session("u1"), None).await;

    assert!(result.success, "{result:?}");
    let stats = result.stats.unwrap();
    assert_eq!(stats.count(EntityKind::Task), 2);
    assert_eq!(stats.total(), 2);

    let uploads = remote.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let ids: Vec<_> = uploads[0].get(EntityKind::Task).iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["t-1", "t-2"]);
    assert!(uploads[0].iter().flat_map(|(_, r)| r).all(|r| r.user_id == "u1"));

    assert_eq!(store.watermark("u1").await.unwrap(), Some(at(NOW)));
    assert_eq!(store.watermark("u2").await.unwrap(), None);
}

#[tokio::test]
async fn second_sync_without_changes_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Journal, Record::new("j-1", "u1").updated(at(NOW - 10))).unwrap();

    let remote = Arc::new(ScriptedRemote::default());
    let (engine, clock) = engine_with(&store, &remote);

    assert!(engine.sync(&session("u1"), None).await.success);
    assert_eq!(remote.upload_count(), 1);

    clock.advance(Duration::minutes(5));
    let result = engine.sync(&session("u1"), None).await;

    assert!(result.success);
    assert_eq!(result.message, "No changes to sync");
    assert_eq!(result.stats.unwrap().total(), 0);
    assert_eq!(remote.upload_count(), 1);
}

#[tokio::test]
async fn only_changes_after_the_watermark_are_uploaded() {
    let store = Arc::new(MemoryStore::new());
    store.set_watermark("u1", at(NOW - 100)).await.unwrap();
    store.put(EntityKind::Goal, Record::new("old", "u1").updated(at(NOW - 101))).unwrap();
    store.put(EntityKind::Goal, Record::new("new", "u1").updated(at(NOW - 99))).unwrap();
    store.put(EntityKind::SleepEntry, Record::new("legacy", "u1")).unwrap();

    let remote = Arc::new(ScriptedRemote::default());
    let (engine, _clock) = engine_with(&store, &remote);

    let result = engine.sync(&session("u1"), None).await;
    assert!(result.success);

    let uploads = remote.uploads.lock().unwrap();
    let goals: Vec<_> = uploads[0].get(EntityKind::Goal).iter().map(|r| r.id.as_str()).collect();
    assert_eq!(goals, vec!["new"]);
    assert_eq!(uploads[0].get(EntityKind::SleepEntry).len(), 1);
}

#[tokio::test]
async fn failed_upload_leaves_watermark_untouched() {
    let store = Arc::new(MemoryStore::new());
    store.set_watermark("u1", at(NOW - 500)).await.unwrap();
    store.put(EntityKind::Expense, Record::new("e-1", "u1").updated(at(NOW - 1))).unwrap();

    for error in [
        TransportError::network("connection reset"),
        TransportError::status(503, "maintenance"),
        TransportError::status(400, "Too many items to sync"),
    ] {
        let remote = Arc::new(ScriptedRemote::failing_with(error.clone()));
        let (engine, _clock) = engine_with(&store, &remote);

        let result = engine.sync(&session("u1"), None).await;
        assert!(!result.success);
        assert_eq!(store.watermark("u1").await.unwrap(), Some(at(NOW - 500)));
        assert_eq!(result.is_retryable(), error.status != Some(400));
    }
}

#[tokio::test]
async fn invalid_payload_never_reaches_the_network() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();
    store.put(EntityKind::MoodEntry, Record::new("", "u1")).unwrap();

    let remote = Arc::new(ScriptedRemote::default());
    let (engine, _clock) = engine_with(&store, &remote);

    let result = engine.sync(&session("u1"), None).await;

    assert!(!result.success);
    assert!(!result.is_retryable());
    let error = result.error.unwrap();
    assert!(error.starts_with("Invalid data"), "{error}");
    assert!(error.contains("moodEntries[0]"), "{error}");
    assert_eq!(remote.network_calls(), 0);
    assert_eq!(store.watermark("u1").await.unwrap(), None);
}

#[tokio::test]
async fn placeholder_records_are_migrated_then_uploaded() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Reflection, Record::new("r-1", "local-user")).unwrap();

    let remote = Arc::new(ScriptedRemote::default());
    let (engine, _clock) = engine_with(&store, &remote);

    let result = engine.sync(&session("u1"), None).await;
    assert!(result.success);
    assert_eq!(result.stats.unwrap().count(EntityKind::Reflection), 1);
    assert_eq!(store.require(EntityKind::Reflection, "r-1").unwrap().user_id, "u1");
}

#[tokio::test]
async fn progress_reports_loading_then_saving() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();

    let remote = Arc::new(ScriptedRemote::default());
    let (engine, _clock) = engine_with(&store, &remote);

    let phases = Mutex::new(Vec::new());
    let progress = |phase: SyncPhase, _note: &str| phases.lock().unwrap().push(phase);
    engine.sync(&session("u1"), Some(&progress)).await;

    assert_eq!(*phases.lock().unwrap(), vec![SyncPhase::Loading, SyncPhase::Saving]);
}

#[tokio::test]
async fn conflicts_reported_by_the_remote_are_surfaced() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();

    let remote = Arc::new(ScriptedRemote {
        conflicts: 1,
        ..Default::default()
    });
    let (engine, _clock) = engine_with(&store, &remote);

    let result = engine.sync(&session("u1"), None).await;
    assert_eq!(result.stats.unwrap().conflicts_resolved, 1);
    assert_eq!(result.message, "Synced 1 task; 1 conflicts resolved");
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn missing_credential_short_circuits() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();
    let remote = Arc::new(ScriptedRemote::default());
    let (engine, _clock) = engine_with(&store, &remote);

    let result = engine.sync(&Session::anonymous("u1"), None).await;
    assert!(!result.success);
    assert!(!result.is_retryable());
    assert!(!result.is_token_expired());
    assert_eq!(remote.network_calls(), 0);
}

#[tokio::test]
async fn expired_credential_short_circuits_and_broadcasts() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();
    let remote = Arc::new(ScriptedRemote::default());
    let broadcaster = Arc::new(ChannelBroadcaster::new(8));
    let mut events = broadcaster.subscribe();

    let (engine, _clock) = engine_with(&store, &remote);
    let engine = engine.with_broadcaster(broadcaster.clone());

    let session = Session::new("u1", Credential::new("tok").expiring_at(at(NOW - 1)));
    let result = engine.sync(&session, None).await;

    assert!(!result.success);
    assert!(result.is_token_expired());
    assert!(!result.is_retryable());
    assert_eq!(remote.network_calls(), 0);
    assert_eq!(
        events.try_recv().unwrap(),
        SyncEvent::CredentialExpired {
            identity: "u1".into()
        }
    );
}

#[tokio::test]
async fn unauthorized_response_flags_token_expiry() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();
    let remote = Arc::new(ScriptedRemote::failing_with(TransportError::status(
        401,
        "Invalid or expired token",
    )));
    let broadcaster = Arc::new(ChannelBroadcaster::new(8));
    let mut events = broadcaster.subscribe();

    let (engine, _clock) = engine_with(&store, &remote);
    let engine = engine.with_broadcaster(broadcaster.clone());

    let result = engine.sync(&session("u1"), None).await;
    assert!(result.is_token_expired());
    assert!(!result.is_retryable());
    assert!(matches!(
        events.try_recv().unwrap(),
        SyncEvent::CredentialExpired { .. }
    ));
}

// ============================================================================
// Timeouts and Single-Flight
// ============================================================================

#[tokio::test(start_paused = true)]
async fn slow_remote_times_out_as_retryable() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();
    let remote = Arc::new(ScriptedRemote {
        delay: Some(std::time::Duration::from_secs(60)),
        ..Default::default()
    });
    let (engine, _clock) = engine_with(&store, &remote);
    let engine = engine.with_config(
        EngineConfig::default().with_request_timeout(std::time::Duration::from_secs(5)),
    );

    let result = engine.sync(&session("u1"), None).await;
    assert!(!result.success);
    assert!(result.is_retryable());
    assert_eq!(store.watermark("u1").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn overlapping_calls_for_one_identity_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();
    let remote = Arc::new(ScriptedRemote {
        delay: Some(std::time::Duration::from_secs(1)),
        ..Default::default()
    });
    let (engine, _clock) = engine_with(&store, &remote);
    let engine = Arc::new(engine);

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.sync(&session("u1"), None).await }
    });
    tokio::task::yield_now().await;
    while !engine.is_syncing("u1") {
        tokio::task::yield_now().await;
    }

    let overlapping = engine.download(&session("u1"), None).await;
    assert!(!overlapping.success);
    assert!(overlapping.is_retryable());
    assert_eq!(overlapping.error.as_deref(), Some("sync already in progress"));

    let other_identity = engine.sync(&session("u2"), None).await;
    assert!(other_identity.success);

    assert!(first.await.unwrap().success);
    assert!(!engine.is_syncing("u1"));
    assert_eq!(remote.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_overlap_touches_nothing() {
    let inner = Arc::new(MemoryStore::new());
    let counting = Arc::new(CountingStore {
        inner: inner.clone(),
        calls: AtomicUsize::new(0),
    });
    let remote = Arc::new(ScriptedRemote {
        delay: Some(std::time::Duration::from_millis(200)),
        ..Default::default()
    });
    inner.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();

    let engine = Arc::new(SyncEngine::new(counting.clone(), inner.clone(), remote.clone()));
    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.sync(&session("u1"), None).await }
    });
    while remote.upload_count() == 0 {
        tokio::task::yield_now().await;
    }

    let calls_before = counting.calls.load(Ordering::SeqCst);
    let result = engine.sync(&session("u1"), None).await;
    assert!(!result.success);
    assert_eq!(counting.calls.load(Ordering::SeqCst), calls_before);
    assert_eq!(remote.upload_count(), 1);

    assert!(first.await.unwrap().success);
}

// ============================================================================
// Download
// ============================================================================

fn five_task_snapshot() -> RemoteSnapshot {
    SyncPayload::new().with(
        EntityKind::Task,
        vec![
            Record::new("t-1", "u1"),
            Record::new("t-2", "u1"),
            Record::new("t-3", "u2"),
            Record::new("t-4", "u1"),
            Record::new("t-5", "u3"),
        ],
    )
}

#[tokio::test]
async fn download_merges_owned_records_and_sweeps_foreign_ones() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("stale", "u9")).unwrap();
    store.put(EntityKind::Expense, Record::new("e-1", "u9")).unwrap();
    store.put(EntityKind::Expense, Record::new("e-2", "u1")).unwrap();

    let remote = Arc::new(ScriptedRemote::serving(five_task_snapshot()));
    let broadcaster = Arc::new(ChannelBroadcaster::new(8));
    let mut events = broadcaster.subscribe();
    let (engine, _clock) = engine_with(&store, &remote);
    let engine = engine.with_broadcaster(broadcaster.clone());

    let result = engine.download(&session("u1"), None).await;

    assert!(result.success, "{result:?}");
    let stats = result.stats.unwrap();
    assert_eq!(stats.count(EntityKind::Task), 3);
    assert_eq!(stats.rejected, 2);
    assert_eq!(stats.removed, 2);

    let tasks: Vec<_> = store
        .records(EntityKind::Task)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(tasks, vec!["t-1", "t-2", "t-4"]);
    assert!(store.get(EntityKind::Expense, "e-2").unwrap().is_some());
    assert!(store.get(EntityKind::Expense, "e-1").unwrap().is_none());

    let event = events.try_recv().unwrap();
    assert_eq!(event.total(), 3);
    assert_eq!(store.watermark("u1").await.unwrap(), Some(at(NOW)));
}

#[tokio::test]
async fn download_failure_keeps_local_state() {
    struct DownRemote;

    #[async_trait]
    impl RemoteStore for DownRemote {
        async fn upload_payload(
            &self,
            _payload: &SyncPayload,
            _credential: &Credential,
        ) -> std::result::Result<UploadReceipt, TransportError> {
            Err(TransportError::network("offline"))
        }

        async fn download_snapshot(
            &self,
            _credential: &Credential,
        ) -> std::result::Result<RemoteSnapshot, TransportError> {
            Err(TransportError::status(502, "bad gateway"))
        }
    }

    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Task, Record::new("foreign", "u9")).unwrap();
    let broadcaster = Arc::new(ChannelBroadcaster::new(8));
    let mut events = broadcaster.subscribe();
    let engine = SyncEngine::new(store.clone(), store.clone(), Arc::new(DownRemote))
        .with_broadcaster(broadcaster.clone());

    let result = engine.download(&session("u1"), None).await;

    assert!(!result.success);
    assert!(result.is_retryable());
    assert_eq!(store.total_len().unwrap(), 1);
    assert_eq!(store.watermark("u1").await.unwrap(), None);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn watermark_never_moves_backwards() {
    let store = Arc::new(MemoryStore::new());
    store.set_watermark("u1", at(NOW + 3600)).await.unwrap();

    let remote = Arc::new(ScriptedRemote::serving(SyncPayload::new()));
    let (engine, _clock) = engine_with(&store, &remote);

    assert!(engine.download(&session("u1"), None).await.success);
    assert_eq!(store.watermark("u1").await.unwrap(), Some(at(NOW + 3600)));
}

#[tokio::test]
async fn broadcaster_behind_a_trait_object_delivers_events() {
    let channel = Arc::new(ChannelBroadcaster::default());
    let mut events = channel.subscribe();
    let broadcaster: Arc<dyn Broadcaster> = channel.clone();

    broadcaster.broadcast(SyncEvent::CredentialExpired {
        identity: "u1".into(),
    });

    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::CredentialExpired {
            identity: "u1".into()
        }
    );
}

// ============================================================================
// Per-record Local Failures
// ============================================================================

fn flaky_engine(
    inner: &Arc<MemoryStore>,
    refused: Vec<&'static str>,
    remote: &Arc<ScriptedRemote>,
) -> SyncEngine {
    let flaky = Arc::new(FlakyStore {
        inner: inner.clone(),
        refused,
    });
    SyncEngine::new(flaky, inner.clone(), remote.clone())
        .with_clock(Arc::new(ManualClock::new(at(NOW))))
}

#[tokio::test]
async fn failed_merge_of_one_record_does_not_fail_the_download() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(ScriptedRemote::serving(SyncPayload::new().with(
        EntityKind::Task,
        vec![
            Record::new("t-1", "u1"),
            Record::new("t-bad", "u1"),
            Record::new("t-3", "u1"),
        ],
    )));
    let engine = flaky_engine(&store, vec!["t-bad"], &remote);

    let result = engine.download(&session("u1"), None).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.stats.unwrap().count(EntityKind::Task), 2);
    assert!(store.get(EntityKind::Task, "t-1").unwrap().is_some());
    assert!(store.get(EntityKind::Task, "t-bad").unwrap().is_none());
    assert!(store.get(EntityKind::Task, "t-3").unwrap().is_some());
    assert_eq!(store.watermark("u1").await.unwrap(), Some(at(NOW)));
}

#[tokio::test]
async fn failed_migration_of_one_record_does_not_fail_the_sync() {
    let store = Arc::new(MemoryStore::new());
    store.put(EntityKind::Journal, Record::new("j-1", "local-user")).unwrap();
    store.put(EntityKind::Journal, Record::new("j-bad", "local-user")).unwrap();
    store.put(EntityKind::Task, Record::new("t-1", "u1")).unwrap();

    let remote = Arc::new(ScriptedRemote::default());
    let engine = flaky_engine(&store, vec!["j-bad"], &remote);

    let result = engine.sync(&session("u1"), None).await;

    assert!(result.success, "{result:?}");
    let uploads = remote.uploads.lock().unwrap();
    let journals: Vec<_> = uploads[0]
        .get(EntityKind::Journal)
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(journals, vec!["j-1"]);
    assert_eq!(uploads[0].get(EntityKind::Task).len(), 1);

    assert_eq!(store.require(EntityKind::Journal, "j-bad").unwrap().user_id, "local-user");
    assert_eq!(store.watermark("u1").await.unwrap(), Some(at(NOW)));
}
