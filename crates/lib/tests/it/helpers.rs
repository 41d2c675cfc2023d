use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use crs_sync::{
    Result, Store, SyncConfig, SyncEngine, Timestamp,
    model::{AssessmentHistory, CrsProfile, UserProfile},
    remote::{InMemoryRemote, RecordPatch, RecordStream, RemoteError, RemoteRecord, RemoteStore},
    session::Session,
    store::MemoryCache,
};
use tokio::sync::mpsc;

// ==========================
// CORE TEST FACTORIES
// ==========================

/// Everything a sync test needs, wired together.
pub struct Harness<R> {
    pub store: Store,
    pub remote: Arc<R>,
    pub cache: Arc<MemoryCache>,
    pub engine: SyncEngine,
}

/// Engine over an [`InMemoryRemote`] with the default config.
pub fn harness() -> Harness<InMemoryRemote> {
    harness_with(SyncConfig::default())
}

pub fn harness_with(config: SyncConfig) -> Harness<InMemoryRemote> {
    build(Arc::new(InMemoryRemote::new()), config)
}

/// Engine over a [`ScriptedRemote`], whose change stream the test feeds.
pub fn scripted_harness() -> Harness<ScriptedRemote> {
    build(Arc::new(ScriptedRemote::default()), SyncConfig::default())
}

fn build<R: RemoteStore + 'static>(remote: Arc<R>, config: SyncConfig) -> Harness<R> {
    let cache = Arc::new(MemoryCache::new());
    let store = Store::open(cache.clone());
    let engine = SyncEngine::new(store.clone(), remote.clone(), config);
    Harness {
        store,
        remote,
        cache,
        engine,
    }
}

pub fn session(uid: &str) -> Session {
    Session::new(uid).with_email(format!("{uid}@example.com"))
}

/// Let spawned tasks run until they block, without moving the clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

// ==========================
// RECORD BUILDERS
// ==========================

pub fn crs_with_age(age: u8) -> CrsProfile {
    CrsProfile {
        age,
        ..CrsProfile::default()
    }
}

pub fn patch_for(uid: &str, crs: CrsProfile) -> RecordPatch {
    RecordPatch {
        user_profile: UserProfile::from_session(&session(uid)),
        crs_data: crs,
        assessment_history: AssessmentHistory::new(),
    }
}

pub fn record_at(uid: &str, crs: CrsProfile, updated_at: Timestamp) -> RemoteRecord {
    patch_for(uid, crs).into_record(updated_at)
}

// ==========================
// SCRIPTED REMOTE
// ==========================

type Feed = mpsc::UnboundedSender<std::result::Result<RemoteRecord, RemoteError>>;

/// Reads and writes go to an [`InMemoryRemote`]; change streams only carry
/// what the test pushes, so snapshot timestamps are fully controlled.
#[derive(Default)]
pub struct ScriptedRemote {
    pub inner: InMemoryRemote,
    feeds: Mutex<Vec<Feed>>,
}

impl ScriptedRemote {
    /// Deliver `record` on every open change stream.
    pub fn push(&self, record: RemoteRecord) {
        self.feeds
            .lock()
            .unwrap()
            .retain(|tx| tx.send(Ok(record.clone())).is_ok());
    }

    pub fn feed_count(&self) -> usize {
        let mut feeds = self.feeds.lock().unwrap();
        feeds.retain(|tx| !tx.is_closed());
        feeds.len()
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    async fn get(&self, key: &str) -> Result<Option<RemoteRecord>> {
        self.inner.get(key).await
    }

    async fn merge_write(&self, key: &str, patch: &RecordPatch) -> Result<Timestamp> {
        self.inner.merge_write(key, patch).await
    }

    async fn subscribe(&self, _key: &str) -> Result<RecordStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        Ok(rx)
    }
}
