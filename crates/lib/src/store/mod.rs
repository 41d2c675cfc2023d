//! Reactive store.
//!
//! The [`Store`] exclusively owns the user profile, CRS profile, assessment
//! history and sync metadata. Everything else, including the sync engine,
//! reads snapshots with [`Store::get_state`] and requests changes through the
//! store's update operations.
//!
//! Entities are held behind `Arc`s. A mutation that touches an entity swaps in
//! a new `Arc`, so observers detect "changed" with [`Arc::ptr_eq`] and cloning
//! a snapshot is cheap.
//!
//! Listeners run synchronously after each mutation, in registration order,
//! with no store lock held: a listener may read or mutate the store.

mod cache;
mod errors;

pub use cache::{FileCache, LocalCache, MemoryCache, default_file_cache};
pub use errors::CacheError;

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, Weak,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use serde::Serialize;
use tracing::{trace, warn};

use crate::{
    Result,
    model::{AssessmentHistory, AssessmentRecord, CrsProfile, Scorer, SyncMetadata, UserProfile},
    sync::{PhaseEvent, SyncPhase},
};

/// Snapshot of everything the store owns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub user_profile: Arc<UserProfile>,
    pub crs_data: Arc<CrsProfile>,
    pub assessment_history: Arc<AssessmentHistory>,
    pub sync: SyncMetadata,
    /// Coordination state between inbound merges and outbound writes
    pub phase: SyncPhase,
}

impl AppState {
    /// Guest defaults: nobody signed in, nothing synced.
    pub fn guest() -> Self {
        Self::guest_with_crs(CrsProfile::default())
    }

    /// Guest defaults, but with a known CRS profile (e.g. from the local cache).
    pub fn guest_with_crs(crs: CrsProfile) -> Self {
        Self {
            user_profile: Arc::new(UserProfile::guest()),
            crs_data: Arc::new(crs),
            assessment_history: Arc::new(AssessmentHistory::new()),
            sync: SyncMetadata::default(),
            phase: SyncPhase::Idle,
        }
    }

    /// Shorthand for `phase.is_applying_remote()`.
    pub fn is_applying_remote(&self) -> bool {
        self.phase.is_applying_remote()
    }

    /// Whether any of the remotely persisted entities differ by reference.
    pub fn synced_fields_changed(&self, previous: &AppState) -> bool {
        !Arc::ptr_eq(&self.user_profile, &previous.user_profile)
            || !Arc::ptr_eq(&self.crs_data, &previous.crs_data)
            || !Arc::ptr_eq(&self.assessment_history, &previous.assessment_history)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::guest()
    }
}

/// Shallow partial update for [`Store::set_state`].
///
/// Present fields replace the corresponding top-level entity; absent fields
/// are left untouched.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub user_profile: Option<Arc<UserProfile>>,
    pub crs_data: Option<Arc<CrsProfile>>,
    pub assessment_history: Option<Arc<AssessmentHistory>>,
    pub sync: Option<SyncMetadata>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_profile(mut self, profile: UserProfile) -> Self {
        self.user_profile = Some(Arc::new(profile));
        self
    }

    pub fn crs_data(mut self, crs: CrsProfile) -> Self {
        self.crs_data = Some(Arc::new(crs));
        self
    }

    pub fn assessment_history(mut self, history: AssessmentHistory) -> Self {
        self.assessment_history = Some(Arc::new(history));
        self
    }

    pub fn sync(mut self, sync: SyncMetadata) -> Self {
        self.sync = Some(sync);
        self
    }

    fn apply(self, state: &mut AppState) {
        if let Some(profile) = self.user_profile {
            state.user_profile = profile;
        }
        if let Some(crs) = self.crs_data {
            state.crs_data = crs;
        }
        if let Some(history) = self.assessment_history {
            state.assessment_history = history;
        }
        if let Some(sync) = self.sync {
            state.sync = sync;
        }
    }
}

/// Store listener, called with `(current, previous)` after every mutation.
pub type Listener = Arc<dyn Fn(&AppState, &AppState) + Send + Sync>;

struct StoreInner {
    state: Mutex<AppState>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    cache: Arc<dyn LocalCache>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the shared reactive store. Clones share the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &*lock(&self.inner.state))
            .field("listeners", &lock(&self.inner.listeners).len())
            .finish()
    }
}

impl Store {
    /// Open a store, seeding the CRS profile from `cache`.
    ///
    /// A missing or unreadable cache falls back to the default profile.
    pub fn open(cache: Arc<dyn LocalCache>) -> Self {
        let crs = match cache.load() {
            Ok(Some(crs)) => {
                trace!("Seeded CRS profile from local cache");
                crs
            }
            Ok(None) => CrsProfile::default(),
            Err(e) => {
                warn!("Ignoring unreadable CRS cache: {e}");
                CrsProfile::default()
            }
        };

        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(AppState::guest_with_crs(crs)),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                cache,
            }),
        }
    }

    /// A store backed by a fresh [`MemoryCache`].
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryCache::new()))
    }

    /// Snapshot of the current state.
    pub fn get_state(&self) -> AppState {
        lock(&self.inner.state).clone()
    }

    /// Shallow-merge `patch` into the state and notify listeners.
    pub fn set_state(&self, patch: StatePatch) {
        self.update(|state| patch.apply(state));
    }

    /// Mutate the state in place under the store lock, then notify listeners.
    ///
    /// `f` must not call back into the store.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut AppState),
    {
        let (current, previous) = {
            let mut state = lock(&self.inner.state);
            let previous = state.clone();
            f(&mut state);
            if !Arc::ptr_eq(&state.crs_data, &previous.crs_data) {
                self.persist_crs(&state.crs_data);
            }
            (state.clone(), previous)
        };
        self.notify(&current, &previous);
    }

    /// Subscribe to state changes.
    ///
    /// The listener is removed when the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AppState, &AppState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    /// Apply a [`SyncPhase`] transition atomically.
    ///
    /// Rejected transitions leave the state untouched and notify nobody.
    pub fn transition(&self, event: PhaseEvent) -> Result<SyncPhase> {
        let (current, previous) = {
            let mut state = lock(&self.inner.state);
            let next = state.phase.next(event)?;
            let previous = state.clone();
            state.phase = next;
            (state.clone(), previous)
        };
        self.notify(&current, &previous);
        Ok(current.phase)
    }

    /// Replace everything with guest defaults. Used on sign-out and when a
    /// different user signs in.
    pub fn reset_to_guest(&self) {
        self.update(|state| *state = AppState::guest());
    }

    /// Guest profile, empty history and fresh sync metadata, but keep the CRS
    /// profile. Used when no user's data was ever loaded, so calculator input
    /// made as a guest (or restored from the cache) survives.
    pub fn clear_session(&self) {
        self.update(|state| {
            let crs = Arc::clone(&state.crs_data);
            *state = AppState::guest();
            state.crs_data = crs;
        });
    }

    // === Convenience mutations ===

    /// Edit the CRS profile.
    pub fn update_crs<F>(&self, f: F)
    where
        F: FnOnce(&mut CrsProfile),
    {
        self.update(|state| {
            let mut crs = (*state.crs_data).clone();
            f(&mut crs);
            state.crs_data = Arc::new(crs);
        });
    }

    pub fn set_crs(&self, crs: CrsProfile) {
        self.set_state(StatePatch::new().crs_data(crs));
    }

    pub fn set_user_profile(&self, profile: UserProfile) {
        self.set_state(StatePatch::new().user_profile(profile));
    }

    /// Edit the user profile.
    pub fn update_user_profile<F>(&self, f: F)
    where
        F: FnOnce(&mut UserProfile),
    {
        self.update(|state| {
            let mut profile = (*state.user_profile).clone();
            f(&mut profile);
            state.user_profile = Arc::new(profile);
        });
    }

    /// Prepend a record to the assessment history, evicting the oldest
    /// entries beyond the limit.
    pub fn add_assessment(&self, record: AssessmentRecord) {
        self.update(|state| {
            state.assessment_history = Arc::new(state.assessment_history.with_record(record));
        });
    }

    /// Recompute the cached score with `scorer` and store it.
    pub fn refresh_score(&self, scorer: &dyn Scorer) -> u32 {
        let score = scorer.compute(&self.get_state().crs_data);
        self.update_crs(|crs| crs.last_score = Some(score));
        score
    }

    fn persist_crs(&self, crs: &CrsProfile) {
        if let Err(e) = self.inner.cache.save(crs) {
            warn!("Failed to cache CRS profile locally: {e}");
        }
    }

    fn notify(&self, current: &AppState, previous: &AppState) {
        // Snapshot the listener list so listeners can (un)subscribe re-entrantly.
        let listeners: Vec<Listener> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(current, previous);
        }
    }
}

/// Registration returned by [`Store::subscribe`].
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the listener. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.store.upgrade() {
            lock(&inner.listeners).retain(|(id, _)| *id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
