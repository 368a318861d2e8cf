//! In-memory task list cache.
//!
//! The cache holds one snapshot of the whole collection. A full fetch is the
//! only writer: mutations never patch entries, they ask for a reload.
//! Overlapping reload requests share a single `list()` call, but a request
//! never joins a fetch that was already sent when it arrived. It waits for
//! the next one instead, so the result always reflects writes that
//! completed before the request.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{BoardError, BoardResult};
use crate::gateway::TaskGateway;
use crate::session::SessionContext;
use crate::types::{Task, TaskId};

/// One complete fetch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub version: u64,
    pub tasks: Vec<Task>,
}

impl TaskSnapshot {
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheView {
    Unloaded,
    Loaded(Arc<TaskSnapshot>),
}

impl CacheView {
    pub fn snapshot(&self) -> Option<&Arc<TaskSnapshot>> {
        match self {
            CacheView::Unloaded => None,
            CacheView::Loaded(snapshot) => Some(snapshot),
        }
    }
}

type ReloadOutcome = BoardResult<Arc<TaskSnapshot>>;

struct Reload {
    id: u64,
    outcome: watch::Receiver<Option<ReloadOutcome>>,
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<TaskSnapshot>>,
    version: u64,
    next_reload: u64,
    /// Fetch already sent to the server.
    running: Option<Reload>,
    /// Fetch not yet sent. Every new request joins it.
    queued: Option<Reload>,
}

pub struct TaskListCache {
    gateway: Arc<dyn TaskGateway>,
    session: Arc<SessionContext>,
    state: Mutex<CacheState>,
    versions: watch::Sender<u64>,
}

impl std::fmt::Debug for TaskListCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("TaskListCache")
            .field("version", &state.version)
            .field("loaded", &state.snapshot.is_some())
            .field("reloading", &state.running.is_some())
            .field("reload_queued", &state.queued.is_some())
            .finish()
    }
}

enum ReloadRole {
    Leader {
        id: u64,
        sender: watch::Sender<Option<ReloadOutcome>>,
        ahead: Option<watch::Receiver<Option<ReloadOutcome>>>,
    },
    Follower(watch::Receiver<Option<ReloadOutcome>>),
}

/// Releases the reload's slot however the leader ends, including when its
/// future is dropped mid-fetch.
struct ReloadLease<'a> {
    cache: &'a TaskListCache,
    id: u64,
}

impl Drop for ReloadLease<'_> {
    fn drop(&mut self) {
        let mut state = self.cache.lock_state();
        if state.running.as_ref().is_some_and(|r| r.id == self.id) {
            state.running = None;
        }
        if state.queued.as_ref().is_some_and(|r| r.id == self.id) {
            state.queued = None;
        }
    }
}

impl TaskListCache {
    /// Creates the cache and clears it whenever the session ends.
    pub fn new(gateway: Arc<dyn TaskGateway>, session: Arc<SessionContext>) -> Arc<Self> {
        let (versions, _) = watch::channel(0);
        let cache = Arc::new(Self {
            gateway,
            session: Arc::clone(&session),
            state: Mutex::new(CacheState::default()),
            versions,
        });

        let weak = Arc::downgrade(&cache);
        session.on_logout(move |_| {
            if let Some(cache) = weak.upgrade() {
                cache.clear();
            }
        });
        cache
    }

    pub fn get(&self) -> CacheView {
        match self.lock_state().snapshot.as_ref() {
            Some(snapshot) => CacheView::Loaded(Arc::clone(snapshot)),
            None => CacheView::Unloaded,
        }
    }

    pub fn version(&self) -> u64 {
        self.lock_state().version
    }

    /// Receives the version after every replace or clear.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.versions.subscribe()
    }

    /// Swaps in a whole new collection.
    pub fn replace(&self, tasks: Vec<Task>) -> Arc<TaskSnapshot> {
        let (snapshot, version) = {
            let mut state = self.lock_state();
            state.version += 1;
            let snapshot = Arc::new(TaskSnapshot {
                version: state.version,
                tasks,
            });
            state.snapshot = Some(Arc::clone(&snapshot));
            (snapshot, state.version)
        };

        debug!(version, task_count = snapshot.tasks.len(), "task cache replaced");
        self.versions.send_replace(version);
        snapshot
    }

    pub fn clear(&self) {
        let version = {
            let mut state = self.lock_state();
            if state.snapshot.is_none() {
                return;
            }
            state.snapshot = None;
            state.version += 1;
            state.version
        };

        debug!(version, "task cache cleared");
        self.versions.send_replace(version);
    }

    /// Refetches the full list and swaps it in.
    ///
    /// Callers that arrive before the fetch is sent share it. A caller that
    /// arrives while a fetch is already out queues one trailing fetch, shared
    /// with everyone after it, which starts once the running one is done.
    pub async fn invalidate_and_reload(&self) -> ReloadOutcome {
        let role = {
            let mut state = self.lock_state();
            match state.queued.as_ref() {
                Some(reload) => ReloadRole::Follower(reload.outcome.clone()),
                None => {
                    state.next_reload += 1;
                    let id = state.next_reload;
                    let (sender, receiver) = watch::channel(None);
                    state.queued = Some(Reload {
                        id,
                        outcome: receiver,
                    });
                    let ahead = state.running.as_ref().map(|r| r.outcome.clone());
                    ReloadRole::Leader { id, sender, ahead }
                }
            }
        };

        match role {
            ReloadRole::Follower(mut receiver) => {
                debug!("joining queued task list reload");
                match receiver.wait_for(Option::is_some).await {
                    Ok(outcome) => outcome.clone().unwrap_or(Err(BoardError::ReloadAborted)),
                    Err(_) => Err(BoardError::ReloadAborted),
                }
            }
            ReloadRole::Leader { id, sender, ahead } => {
                let lease = ReloadLease { cache: self, id };
                if let Some(mut ahead) = ahead {
                    debug!(reload = id, "waiting for running reload before refetching");
                    // Its result predates this request.
                    let _ = ahead.wait_for(Option::is_some).await;
                }
                // Lets requests issued in the same turn join before the fetch goes out.
                tokio::task::yield_now().await;
                self.mark_running(id);

                let outcome = self.fetch_and_apply().await;
                sender.send_replace(Some(outcome.clone()));
                drop(lease);
                outcome
            }
        }
    }

    fn mark_running(&self, id: u64) {
        let mut state = self.lock_state();
        if state.queued.as_ref().is_some_and(|r| r.id == id) {
            state.running = state.queued.take();
        }
    }

    async fn fetch_and_apply(&self) -> ReloadOutcome {
        let epoch = self.session.epoch();
        let tasks = self.gateway.list().await?;

        if !self.session.is_current(epoch) {
            warn!(
                epoch,
                "discarding task list fetched under a session that has since ended"
            );
            return Err(BoardError::SessionChanged);
        }
        Ok(self.replace(tasks))
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
