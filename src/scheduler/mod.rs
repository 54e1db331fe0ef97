//! Bounded-concurrency, priority-aware reload queue.
//!
//! A dispatcher task acquires a permit from a semaphore sized to
//! `max_concurrent_reloads`, then pops the highest-priority entry from the
//! backlog and spawns it. `Short` entries run before `Default` ones, FIFO within
//! a tier.
//!
//! One mutex guards both the backlog and the in-flight map (`id → token`), which
//! covers queued and running reloads alike. `schedule` checks and inserts under
//! that lock and task completion removes under it, so there is never a window in
//! which two reloads for the same bookmark can coexist.

use crate::reload_task::ReloadTask;
use crate::types::{BookmarkId, Priority};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{BinaryHeap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, watch};
use tokio_util::sync::CancellationToken;

/// Executes one dequeued reload
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    /// Run `task` until it finishes or `token` fires
    ///
    /// A returned task is enqueued as a follow-up in the same critical section
    /// that releases the finished one, unless the scheduler was sealed or the
    /// finished task was cancelled meanwhile.
    async fn run(&self, task: ReloadTask, token: CancellationToken) -> Option<ReloadTask>;
}

/// Entry in the backlog
struct QueuedReload {
    task: ReloadTask,
    token: CancellationToken,
    priority: Priority,
    /// Monotonic insertion counter for FIFO tie-breaking
    seq: u64,
}

impl PartialEq for QueuedReload {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedReload {}

// BinaryHeap is a max-heap: higher priority wins, then the older entry
impl Ord for QueuedReload {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.priority.cmp(&other.priority) {
            std::cmp::Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

impl PartialOrd for QueuedReload {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct SchedulerState {
    backlog: BinaryHeap<QueuedReload>,
    in_flight: HashMap<BookmarkId, CancellationToken>,
    next_seq: u64,
    sealed: bool,
}

impl SchedulerState {
    fn push(&mut self, task: ReloadTask) {
        let token = CancellationToken::new();
        self.in_flight.insert(task.id(), token.clone());
        let seq = self.next_seq;
        self.next_seq += 1;
        self.backlog.push(QueuedReload {
            priority: task.priority(),
            task,
            token,
            seq,
        });
    }

    /// Drop the backlog and release its dedup entries; returns how many were dropped
    fn drain_backlog(&mut self) -> usize {
        let dropped: Vec<QueuedReload> = self.backlog.drain().collect();
        for entry in &dropped {
            self.in_flight.remove(&entry.task.id());
        }
        dropped.len()
    }
}

struct Shared {
    state: Mutex<SchedulerState>,
    permits: Arc<Semaphore>,
    wake: Notify,
    /// Number of dispatched reloads that have not finished yet
    running: watch::Sender<usize>,
    /// Stops the dispatcher
    stop: CancellationToken,
    runner: Arc<dyn TaskRunner>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        // No critical section can leave the state half-updated
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Priority work queue for reload tasks
pub struct ReloadScheduler {
    shared: Arc<Shared>,
}

impl ReloadScheduler {
    /// Create the scheduler and spawn its dispatcher
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(max_concurrent: usize, runner: Arc<dyn TaskRunner>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState::default()),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            wake: Notify::new(),
            running: watch::channel(0).0,
            stop: CancellationToken::new(),
            runner,
        });

        tokio::spawn(dispatch(Arc::clone(&shared)));

        Self { shared }
    }

    /// Enqueue a reload
    ///
    /// Returns `false` if the scheduler is sealed or a reload for the same
    /// bookmark is already queued or running.
    pub fn schedule(&self, task: ReloadTask) -> bool {
        let id = task.id();
        {
            let mut state = self.shared.lock_state();
            if state.sealed {
                tracing::debug!(bookmark_id = id.0, "Scheduler sealed, rejecting reload");
                return false;
            }
            if state.in_flight.contains_key(&id) {
                tracing::debug!(bookmark_id = id.0, "Reload already queued, skipping");
                return false;
            }
            state.push(task);
        }

        self.shared.wake.notify_one();
        true
    }

    /// Enqueue several reloads; returns how many were accepted
    pub fn schedule_all(&self, tasks: impl IntoIterator<Item = ReloadTask>) -> usize {
        tasks
            .into_iter()
            .map(|task| self.schedule(task))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Whether a reload for `id` is queued or running
    pub fn is_queued(&self, id: BookmarkId) -> bool {
        self.shared.lock_state().in_flight.contains_key(&id)
    }

    /// Cancel the reload of one bookmark
    ///
    /// A queued entry is dropped, a running one has its token cancelled. Returns
    /// whether anything was found.
    pub fn cancel(&self, id: BookmarkId) -> bool {
        let mut state = self.shared.lock_state();
        let Some(token) = state.in_flight.get(&id).cloned() else {
            return false;
        };
        token.cancel();

        let before = state.backlog.len();
        let kept: Vec<QueuedReload> = state
            .backlog
            .drain()
            .filter(|entry| entry.task.id() != id)
            .collect();
        let was_queued = kept.len() < before;
        state.backlog = kept.into_iter().collect();
        if was_queued {
            state.in_flight.remove(&id);
        }

        tracing::debug!(bookmark_id = id.0, was_queued, "Cancelled reload");
        true
    }

    /// Register a reload running outside the pool under `token`
    ///
    /// The bookmark counts as queued until the returned claim is dropped.
    /// Returns `None` if the scheduler is sealed or the bookmark is already queued.
    pub fn claim(&self, id: BookmarkId, token: CancellationToken) -> Option<Claim> {
        let mut state = self.shared.lock_state();
        if state.sealed || state.in_flight.contains_key(&id) {
            return None;
        }
        state.in_flight.insert(id, token);
        Some(Claim {
            shared: Arc::clone(&self.shared),
            id,
        })
    }

    /// Stop outstanding work
    ///
    /// Drops the backlog and cancels every running reload. `seal` additionally
    /// rejects all future work and stops the dispatcher; `join` waits until no
    /// dispatched reload is running anymore.
    pub async fn cancel_all(&self, join: bool, seal: bool) {
        if seal {
            self.seal();
        } else {
            let mut state = self.shared.lock_state();
            let dropped = state.drain_backlog();
            for token in state.in_flight.values() {
                token.cancel();
            }
            tracing::info!(
                dropped,
                running = state.in_flight.len(),
                "Cancelled outstanding reloads"
            );
        }

        if join {
            self.join().await;
        }
    }

    /// Stop immediately: reject future work, drop the backlog, cancel running
    /// reloads and stop dispatching. Never waits.
    pub fn seal(&self) {
        {
            let mut state = self.shared.lock_state();
            if state.sealed {
                return;
            }
            state.sealed = true;
            let dropped = state.drain_backlog();
            for token in state.in_flight.values() {
                token.cancel();
            }
            tracing::info!(dropped, "Reload scheduler sealed");
        }
        self.shared.stop.cancel();
    }

    /// Whether [`ReloadScheduler::seal`] was called
    pub fn is_sealed(&self) -> bool {
        self.shared.lock_state().sealed
    }

    /// Wait until no dispatched reload is running
    pub async fn join(&self) {
        let mut running = self.shared.running.subscribe();
        // The sender lives in `shared`, which outlives this borrow
        let _ = running.wait_for(|count| *count == 0).await;
    }

    /// Number of reloads waiting for a worker
    pub fn queued_len(&self) -> usize {
        self.shared.lock_state().backlog.len()
    }

    /// Number of dispatched reloads still running
    pub fn running_len(&self) -> usize {
        *self.shared.running.borrow()
    }
}

impl Drop for ReloadScheduler {
    fn drop(&mut self) {
        self.shared.stop.cancel();
    }
}

/// Dedup entry of a reload running outside the pool; released on drop
pub struct Claim {
    shared: Arc<Shared>,
    id: BookmarkId,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.shared.lock_state().in_flight.remove(&self.id);
    }
}

async fn dispatch(shared: Arc<Shared>) {
    loop {
        let permit = tokio::select! {
            biased;
            _ = shared.stop.cancelled() => break,
            permit = Arc::clone(&shared.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let next = {
            let mut state = shared.lock_state();
            if state.sealed {
                break;
            }
            let next = state.backlog.pop();
            if next.is_some() {
                // Counted under the lock so `cancel_all(join)` cannot miss it
                shared.running.send_modify(|count| *count += 1);
            }
            next
        };

        match next {
            Some(entry) => {
                tokio::spawn(run_entry(Arc::clone(&shared), entry, permit));
            }
            None => {
                drop(permit);
                tokio::select! {
                    biased;
                    _ = shared.stop.cancelled() => break,
                    _ = shared.wake.notified() => {}
                }
            }
        }
    }

    tracing::debug!("Reload dispatcher stopped");
}

async fn run_entry(shared: Arc<Shared>, entry: QueuedReload, _permit: OwnedSemaphorePermit) {
    let QueuedReload { task, token, .. } = entry;
    let id = task.id();

    let result = AssertUnwindSafe(shared.runner.run(task, token.clone()))
        .catch_unwind()
        .await;

    let follow_up = match result {
        Ok(follow_up) => follow_up,
        Err(panic) => {
            tracing::error!(
                bookmark_id = id.0,
                panic = panic_message(panic.as_ref()),
                "Reload task panicked"
            );
            None
        }
    };

    let requeued = {
        let mut state = shared.lock_state();
        state.in_flight.remove(&id);
        let requeued = match follow_up {
            Some(task) if !state.sealed && !token.is_cancelled() => {
                state.push(task);
                true
            }
            _ => false,
        };
        shared
            .running
            .send_modify(|count| *count = count.saturating_sub(1));
        requeued
    };

    if requeued {
        tracing::debug!(bookmark_id = id.0, "Re-submitted reload");
        shared.wake.notify_one();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}
