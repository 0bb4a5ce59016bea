//! Single-occupancy background task slot with cooperative cancellation.
//!
//! Every screen owns one [`TaskSlot`]. Starting a task cancels whatever the
//! slot currently holds, waits for that worker to exit, and only then spawns
//! the replacement, so at most one task per slot is ever active.
//!
//! Cancellation is cooperative: [`CancelToken::cancel`] flips a flag that the
//! job checks between its steps (decode, transform, compress, save). A
//! cancelled job stops at its next check point and its results are dropped.
//!
//! ```text
//! start(job B) ──► cancel(A) ──► join(A) ──► spawn(B)
//!                                             │
//!                          B returns ──► clear slot ──► on_finish()
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crate::types::Cancelled;

/// Shared cancellation flag handed to a running job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Check point: `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

struct Running {
    id: u64,
    token: CancelToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct SlotInner {
    next_id: u64,
    running: Option<Running>,
    /// Cancelled workers that may still be unwinding to their next check point.
    retired: Vec<JoinHandle<()>>,
}

/// Holds at most one in-flight background task.
pub struct TaskSlot {
    name: String,
    inner: Arc<Mutex<SlotInner>>,
    /// Serializes `start` calls so two starters cannot both spawn.
    start_lock: Mutex<()>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_unless_current(handle: JoinHandle<()>) {
    if handle.thread().id() == std::thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        tracing::warn!("background task panicked while shutting down");
    }
}

impl TaskSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(SlotInner::default())),
            start_lock: Mutex::new(()),
        }
    }

    /// Replace the held task with `job`.
    ///
    /// The previous task (if any) is cancelled and joined before `job` is
    /// spawned. When `job` returns without being replaced, the slot is
    /// cleared and `on_finish` runs on the worker thread.
    pub fn start<F, D>(&self, job: F, on_finish: D) -> CancelToken
    where
        F: FnOnce(&CancelToken) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        let _starting = lock(&self.start_lock);

        let (previous, retired) = {
            let mut inner = lock(&self.inner);
            (inner.running.take(), std::mem::take(&mut inner.retired))
        };
        if let Some(previous) = previous {
            tracing::debug!(slot = %self.name, task = previous.id, "replacing running task");
            previous.token.cancel();
            if let Some(handle) = previous.handle {
                join_unless_current(handle);
            }
        }
        for handle in retired {
            join_unless_current(handle);
        }

        let token = CancelToken::new();
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;

        let worker_token = token.clone();
        let slot = Arc::clone(&self.inner);
        let name = self.name.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("{}-task-{id}", self.name))
            .spawn(move || {
                job(&worker_token);
                let finished_naturally = {
                    let mut inner = lock(&slot);
                    match inner.running.take() {
                        Some(mut running) if running.id == id => {
                            // Keep the handle so `wait` can join past `on_finish`.
                            if let Some(handle) = running.handle.take() {
                                inner.retired.push(handle);
                            }
                            true
                        }
                        other => {
                            inner.running = other;
                            false
                        }
                    }
                };
                if finished_naturally {
                    tracing::debug!(slot = %name, task = id, "task finished");
                    on_finish();
                }
            });

        match spawned {
            Ok(handle) => {
                inner.running = Some(Running {
                    id,
                    token: token.clone(),
                    handle: Some(handle),
                });
            }
            Err(err) => {
                tracing::warn!(slot = %self.name, "could not spawn worker: {err}");
                token.cancel();
            }
        }
        token
    }

    /// Cancel the held task and clear the slot.
    ///
    /// Returns `false` (and does nothing) when no task is held. The cancelled
    /// worker is not joined here; the next `start` waits for it.
    pub fn cancel(&self) -> bool {
        let mut inner = lock(&self.inner);
        let Some(mut running) = inner.running.take() else {
            return false;
        };
        tracing::info!(slot = %self.name, task = running.id, "task cancelled");
        running.token.cancel();
        if let Some(handle) = running.handle.take() {
            inner.retired.push(handle);
        }
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner).running.is_some()
    }

    /// Block until the held task and any cancelled workers have exited.
    pub fn wait(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut inner = lock(&self.inner);
            let mut handles = std::mem::take(&mut inner.retired);
            if let Some(running) = inner.running.as_mut()
                && let Some(handle) = running.handle.take()
            {
                handles.push(handle);
            }
            handles
        };
        for handle in handles {
            join_unless_current(handle);
        }
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
