//! The recipe synchronization store.
//!
//! Owns the local cache and, when a remote collection is configured, a
//! background task that seeds the collection, applies change snapshots and
//! periodically pushes records that never received a remote id.
//!
//! Writes always land in the local cache before the call returns. The remote
//! counterpart runs on its own task and only once the store is
//! [`SyncState::Ready`]; its result is available through the returned
//! [`WriteReceipt`] but nobody has to wait for it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::{LocalCache, RECIPES_KEY};
use crate::db::Database;
use crate::defaults::default_recipes;
use crate::models::{Document, Recipe, RecipePatch, is_local_id};
use crate::reconcile::{PendingWrites, drift_candidates, merge_snapshot, remote_names, seed_missing};
use crate::remote::{RemoteCollection, Snapshots, decode_snapshot, encode_patch, encode_recipe};

pub const DEFAULT_COLLECTION: &str = "recipes";
pub const DEFAULT_SEED_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_DRIFT_INTERVAL: Duration = Duration::from_secs(10);
const MIN_DRIFT_INTERVAL: Duration = Duration::from_millis(100);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Key the local cache persists under.
    pub storage_key: String,
    /// Remote collection name.
    pub collection: String,
    /// Pause between creates while seeding.
    pub seed_delay: Duration,
    pub drift_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage_key: RECIPES_KEY.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            seed_delay: DEFAULT_SEED_DELAY,
            drift_interval: DEFAULT_DRIFT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Cold,
    Seeding,
    Ready,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cold => "cold",
            Self::Seeding => "seeding",
            Self::Ready => "ready",
        })
    }
}

/// What happened to the remote half of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Committed,
    /// No remote request was made: no remote configured, the store was not
    /// ready, the record was never synced, or the id was unknown.
    Skipped,
    Failed(String),
}

/// Returned by every write. The local half has already happened.
#[derive(Debug)]
pub struct WriteReceipt {
    applied: bool,
    id: Option<String>,
    remote: Option<JoinHandle<RemoteOutcome>>,
}

impl WriteReceipt {
    fn not_found() -> Self {
        Self {
            applied: false,
            id: None,
            remote: None,
        }
    }

    fn local(id: &str) -> Self {
        Self {
            applied: true,
            id: Some(id.to_string()),
            remote: None,
        }
    }

    fn spawned(id: &str, handle: JoinHandle<RemoteOutcome>) -> Self {
        Self {
            applied: true,
            id: Some(id.to_string()),
            remote: Some(handle),
        }
    }

    /// False when the target id was unknown and nothing changed.
    #[must_use]
    pub fn applied_locally(&self) -> bool {
        self.applied
    }

    /// The id the record had when the write was applied.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn remote_pending(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn remote_outcome(self) -> RemoteOutcome {
        match self.remote {
            Some(handle) => handle
                .await
                .unwrap_or_else(|e| RemoteOutcome::Failed(format!("remote task ended: {e}"))),
            None => RemoteOutcome::Skipped,
        }
    }
}

struct Inner {
    cache: LocalCache,
    pending: PendingWrites,
}

struct Shared {
    inner: Mutex<Inner>,
    remote: Option<Arc<dyn RemoteCollection>>,
    state: watch::Sender<SyncState>,
    revision: watch::Sender<u64>,
    subscribed: AtomicBool,
    drift_running: AtomicBool,
    config: SyncConfig,
    defaults: Vec<Recipe>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remote_if_ready(&self) -> Option<Arc<dyn RemoteCollection>> {
        if *self.state.borrow() == SyncState::Ready {
            self.remote.clone()
        } else {
            None
        }
    }

    fn apply_snapshot(&self, docs: &[Document]) {
        let incoming = decode_snapshot(docs);
        let count = {
            let mut inner = self.lock();
            let merged = merge_snapshot(inner.cache.get_all(), incoming, &inner.pending);
            let count = merged.len();
            inner.cache.replace_all(merged);
            count
        };
        self.revision.send_modify(|r| *r += 1);
        debug!(documents = docs.len(), recipes = count, "applied remote snapshot");
    }
}

/// Ids the remote collection knows about. Locally-minted and placeholder ids
/// never reach it.
fn has_remote_id(id: &str) -> bool {
    !id.is_empty() && !is_local_id(id)
}

fn outcome(op: &'static str, id: &str, result: Result<()>) -> RemoteOutcome {
    match result {
        Ok(()) => {
            debug!(op, id, "remote write committed");
            RemoteOutcome::Committed
        }
        Err(e) => {
            let message = format!("{e:#}");
            warn!(op, id, error = %message, "remote write failed, local change kept");
            RemoteOutcome::Failed(message)
        }
    }
}

/// Create `recipe` remotely and re-key the local record to the assigned id.
async fn push_create(
    shared: Arc<Shared>,
    remote: Arc<dyn RemoteCollection>,
    recipe: Recipe,
) -> RemoteOutcome {
    let local_id = recipe.id.clone();
    let result = remote.create(encode_recipe(&recipe)).await;
    let orphaned = shared.lock().pending.finish_create(&local_id);

    let remote_id = match result {
        Ok(id) => id,
        Err(e) => {
            let message = format!("{e:#}");
            warn!(id = %local_id, name = %recipe.name, error = %message, "remote create failed, kept locally");
            return RemoteOutcome::Failed(message);
        }
    };

    if orphaned {
        debug!(id = %local_id, %remote_id, "recipe removed while its create was in flight");
        return outcome("delete", &remote_id, remote.delete(&remote_id).await);
    }

    let latest = {
        let mut inner = shared.lock();
        let latest = inner.cache.get_by_id(&local_id).cloned();
        if inner.cache.get_by_id(&remote_id).is_some() {
            // A snapshot already delivered the new document
            inner.cache.remove(&local_id);
        } else {
            inner.cache.rewrite_id(&local_id, &remote_id);
        }
        latest
    };
    debug!(%local_id, %remote_id, "local recipe now synced");

    // Edits made while the create was in flight only touched the local copy
    if let Some(latest) = latest.filter(|l| *l != recipe) {
        let result = remote.update(&remote_id, encode_recipe(&latest)).await;
        outcome("update", &remote_id, result);
    }
    RemoteOutcome::Committed
}

struct DriftGuard<'a>(&'a AtomicBool);

impl Drop for DriftGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn drift_pass(shared: &Arc<Shared>) -> Result<usize> {
    let Some(remote) = shared.remote_if_ready() else {
        return Ok(0);
    };
    if shared.drift_running.swap(true, Ordering::AcqRel) {
        debug!("drift resync already running");
        return Ok(0);
    }
    let _guard = DriftGuard(&shared.drift_running);

    let docs = remote
        .list()
        .await
        .context("Failed to list remote collection for drift resync")?;
    let names = remote_names(&docs);

    let candidates = {
        let mut inner = shared.lock();
        let candidates = drift_candidates(inner.cache.get_all(), &names, &inner.pending);
        for recipe in &candidates {
            inner.pending.begin_create(&recipe.id);
        }
        candidates
    };
    if candidates.is_empty() {
        return Ok(0);
    }

    info!(count = candidates.len(), "pushing unsynced local recipes");
    let mut pushed = 0;
    for recipe in candidates {
        let result = push_create(Arc::clone(shared), Arc::clone(&remote), recipe).await;
        if result == RemoteOutcome::Committed {
            pushed += 1;
        }
    }
    Ok(pushed)
}

async fn attach(shared: &Shared, remote: &dyn RemoteCollection) -> Option<Snapshots> {
    match remote.subscribe().await {
        Ok(rx) => {
            shared.subscribed.store(true, Ordering::Release);
            debug!("subscribed to remote changes");
            Some(rx)
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "failed to subscribe to remote changes");
            None
        }
    }
}

async fn next_snapshot(snapshots: &mut Option<Snapshots>) -> Option<Vec<Document>> {
    match snapshots {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

enum Event {
    Shutdown,
    Snapshot(Option<Vec<Document>>),
    Drift,
}

async fn run(
    shared: Arc<Shared>,
    remote: Arc<dyn RemoteCollection>,
    mut shutdown: watch::Receiver<bool>,
) {
    let seeded = tokio::select! {
        _ = shutdown.changed() => return,
        report = seed_missing(remote.as_ref(), &shared.defaults, shared.config.seed_delay) => report,
    };
    if let Err(e) = seeded {
        warn!(error = %format!("{e:#}"), "seed pass failed, continuing unseeded");
    }
    shared.state.send_replace(SyncState::Ready);
    info!("recipe store ready");

    let mut snapshots = attach(&shared, remote.as_ref()).await;

    let period = shared.config.drift_interval.max(MIN_DRIFT_INTERVAL);
    let mut drift = tokio::time::interval_at(Instant::now() + period, period);
    drift.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => Event::Shutdown,
            snapshot = next_snapshot(&mut snapshots) => Event::Snapshot(snapshot),
            _ = drift.tick() => Event::Drift,
        };

        match event {
            Event::Shutdown => break,
            Event::Snapshot(Some(docs)) => shared.apply_snapshot(&docs),
            Event::Snapshot(None) => {
                warn!("remote subscription closed");
                shared.subscribed.store(false, Ordering::Release);
                snapshots = None;
            }
            Event::Drift => {
                if snapshots.is_none() {
                    snapshots = attach(&shared, remote.as_ref()).await;
                }
                if let Err(e) = drift_pass(&shared).await {
                    warn!(error = %format!("{e:#}"), "drift resync failed");
                }
            }
        }
    }

    shared.subscribed.store(false, Ordering::Release);
    debug!("recipe store background task stopped");
}

/// Local-first recipe store mirrored to an optional remote collection.
pub struct RecipeStore {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RecipeStore {
    /// Load the local cache from `db`. Nothing touches the remote until
    /// [`RecipeStore::start`].
    #[must_use]
    pub fn open(db: Database, remote: Option<Arc<dyn RemoteCollection>>, config: SyncConfig) -> Self {
        Self::open_with_defaults(db, remote, config, default_recipes())
    }

    /// Like [`RecipeStore::open`] with a custom dataset used both as the
    /// local fallback and as the seed for the remote collection.
    #[must_use]
    pub fn open_with_defaults(
        db: Database,
        remote: Option<Arc<dyn RemoteCollection>>,
        config: SyncConfig,
        defaults: Vec<Recipe>,
    ) -> Self {
        let cache = LocalCache::load_with_defaults(db, &config.storage_key, &defaults);
        let (state, _) = watch::channel(SyncState::Cold);
        let (revision, _) = watch::channel(0);
        let (shutdown, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    cache,
                    pending: PendingWrites::default(),
                }),
                remote,
                state,
                revision,
                subscribed: AtomicBool::new(false),
                drift_running: AtomicBool::new(false),
                config,
                defaults,
            }),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Begin seeding and syncing in the background. Only the first call on a
    /// store with a remote does anything; returns whether this call started it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let Some(remote) = self.shared.remote.clone() else {
            debug!("no remote configured, store stays local-only");
            return false;
        };
        let started = self.shared.state.send_if_modified(|state| {
            if *state == SyncState::Cold {
                *state = SyncState::Seeding;
                true
            } else {
                false
            }
        });
        if !started {
            return false;
        }

        info!(collection = %self.shared.config.collection, "starting recipe sync");
        let handle = tokio::spawn(run(
            Arc::clone(&self.shared),
            remote,
            self.shutdown.subscribe(),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        true
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.shared.state.borrow()
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.shared.subscribed.load(Ordering::Acquire)
    }

    /// Resolves once the seed pass has finished, whether or not it succeeded.
    /// Never resolves on a store that was not started.
    pub async fn ready(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == SyncState::Ready).await;
    }

    /// Number of remote snapshots applied so far.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.shared.revision.borrow()
    }

    /// Resolves once at least `revision` snapshots have been applied.
    pub async fn wait_for_revision(&self, revision: u64) {
        let mut rx = self.shared.revision.subscribe();
        let _ = rx.wait_for(|r| *r >= revision).await;
    }

    #[must_use]
    pub fn get_all(&self) -> Vec<Recipe> {
        self.shared.lock().cache.get_all().to_vec()
    }

    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<Recipe> {
        self.shared.lock().cache.get_by_id(id).cloned()
    }

    /// Append a recipe. A locally-minted id is assigned if it has none, and
    /// replaced with the remote id once the create commits. Recipes that
    /// arrive with an id of their own are taken to exist remotely already.
    pub fn add(&self, recipe: Recipe) -> WriteReceipt {
        let remote = self.shared.remote_if_ready();
        let stored = {
            let mut inner = self.shared.lock();
            let stored = inner.cache.add(recipe);
            if remote.is_some() && is_local_id(&stored.id) {
                inner.pending.begin_create(&stored.id);
            }
            stored
        };

        match remote {
            Some(remote) if is_local_id(&stored.id) => {
                let id = stored.id.clone();
                let handle = tokio::spawn(push_create(Arc::clone(&self.shared), remote, stored));
                WriteReceipt::spawned(&id, handle)
            }
            _ => WriteReceipt::local(&stored.id),
        }
    }

    pub fn update(&self, id: &str, patch: &RecipePatch) -> WriteReceipt {
        let remote = self.shared.remote_if_ready().filter(|_| has_remote_id(id));
        {
            let mut inner = self.shared.lock();
            if inner.cache.update(id, patch).is_none() {
                return WriteReceipt::not_found();
            }
            if remote.is_some() {
                inner.pending.begin_update(id);
            }
        }
        match remote {
            Some(remote) => WriteReceipt::spawned(id, self.spawn_update(remote, id, encode_patch(patch))),
            None => WriteReceipt::local(id),
        }
    }

    pub fn toggle_favorite(&self, id: &str) -> WriteReceipt {
        let remote = self.shared.remote_if_ready().filter(|_| has_remote_id(id));
        let flag = {
            let mut inner = self.shared.lock();
            let Some(flag) = inner.cache.toggle_favorite(id) else {
                return WriteReceipt::not_found();
            };
            if remote.is_some() {
                inner.pending.begin_update(id);
            }
            flag
        };
        match remote {
            Some(remote) => {
                let patch = RecipePatch {
                    is_favorite: Some(flag),
                    ..RecipePatch::default()
                };
                WriteReceipt::spawned(id, self.spawn_update(remote, id, encode_patch(&patch)))
            }
            None => WriteReceipt::local(id),
        }
    }

    pub fn remove(&self, id: &str) -> WriteReceipt {
        let remote = self.shared.remote_if_ready().filter(|_| has_remote_id(id));
        {
            let mut inner = self.shared.lock();
            if inner.cache.remove(id).is_none() {
                return WriteReceipt::not_found();
            }
            if inner.pending.mark_removed(id) {
                debug!(id, "removed a recipe whose create is in flight");
            }
            if remote.is_some() {
                inner.pending.begin_delete(id);
            }
        }
        let Some(remote) = remote else {
            return WriteReceipt::local(id);
        };

        let shared = Arc::clone(&self.shared);
        let target = id.to_string();
        let handle = tokio::spawn(async move {
            let result = remote.delete(&target).await;
            shared.lock().pending.finish_delete(&target);
            outcome("delete", &target, result)
        });
        WriteReceipt::spawned(id, handle)
    }

    fn spawn_update(
        &self,
        remote: Arc<dyn RemoteCollection>,
        id: &str,
        fields: Map<String, Value>,
    ) -> JoinHandle<RemoteOutcome> {
        let shared = Arc::clone(&self.shared);
        let target = id.to_string();
        tokio::spawn(async move {
            let result = remote.update(&target, fields).await;
            shared.lock().pending.finish_update(&target);
            outcome("update", &target, result)
        })
    }

    /// Merge a full-collection snapshot into the local cache.
    pub fn apply_snapshot(&self, docs: &[Document]) {
        self.shared.apply_snapshot(docs);
    }

    /// Push locally-minted recipes whose name is missing remotely and adopt
    /// the ids they are given. Returns how many were pushed. Does nothing
    /// unless the store is ready, or while another pass is running.
    pub async fn resync_drift(&self) -> Result<usize> {
        drift_pass(&self.shared).await
    }

    /// Stop the background task. In-flight remote writes are left to finish.
    pub async fn close(self) {
        self.shutdown.send_replace(true);
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut handle) = handle else {
            return;
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => debug!("recipe store closed"),
            Ok(Err(e)) => warn!("recipe store task failed: {e}"),
            Err(_) => {
                warn!("recipe store task did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}
