//! Observable screen state and debounced recomputation.
//!
//! [`Store`] owns one screen's state behind a mutex. All mutation goes
//! through [`Store::update`]; every update publishes a snapshot to each
//! subscriber channel, in update order.
//!
//! [`Debouncer`] runs the most recent scheduled job once its quiet period
//! passes without a newer call. Preview rendering uses it so a burst of
//! slider ticks renders once.

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::task::lock;

struct StoreInner<S> {
    state: Mutex<S>,
    subscribers: Mutex<Vec<Sender<S>>>,
}

/// Single-writer observable state.
pub struct Store<S> {
    inner: Arc<StoreInner<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Clone + Send + 'static> Store<S> {
    pub fn new(initial: S) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(initial),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn snapshot(&self) -> S {
        lock(&self.inner.state).clone()
    }

    /// Read without cloning the whole state.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&lock(&self.inner.state))
    }

    /// Mutate the state and notify subscribers with the new snapshot.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut state = lock(&self.inner.state);
        let result = f(&mut state);
        let snapshot = state.clone();
        lock(&self.inner.subscribers).retain(|tx| tx.send(snapshot.clone()).is_ok());
        result
    }

    /// Receive a snapshot after every subsequent update.
    ///
    /// Dropping the receiver unsubscribes on the next update.
    pub fn subscribe(&self) -> Receiver<S> {
        let (tx, rx) = channel();
        lock(&self.inner.subscribers).push(tx);
        rx
    }
}

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct DebounceState {
    pending: Option<(Instant, Job)>,
    shutdown: bool,
}

/// Runs only the latest scheduled job after a quiet interval.
pub struct Debouncer {
    interval: Duration,
    shared: Arc<(Mutex<DebounceState>, Condvar)>,
    worker: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        let shared = Arc::new((Mutex::new(DebounceState::default()), Condvar::new()));
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("debounce".into())
            .spawn(move || debounce_loop(&worker_shared))
            .map_err(|err| tracing::warn!("could not spawn debounce worker: {err}"))
            .ok();
        Self {
            interval,
            shared,
            worker,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedule `job`, replacing any job that has not run yet.
    pub fn call(&self, job: impl FnOnce() + Send + 'static) {
        if self.worker.is_none() {
            job();
            return;
        }
        let (state, wake) = &*self.shared;
        lock(state).pending = Some((Instant::now() + self.interval, Box::new(job)));
        wake.notify_one();
    }
}

fn debounce_loop(shared: &(Mutex<DebounceState>, Condvar)) {
    let (state, wake) = shared;
    let mut guard = lock(state);
    loop {
        if guard.shutdown {
            return;
        }
        let deadline = guard.pending.as_ref().map(|(deadline, _)| *deadline);
        match deadline {
            None => {
                guard = wake.wait(guard).unwrap_or_else(|e| e.into_inner());
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    if let Some((_, job)) = guard.pending.take() {
                        drop(guard);
                        job();
                        guard = lock(state);
                    }
                } else {
                    guard = wake
                        .wait_timeout(guard, deadline - now)
                        .map(|(g, _)| g)
                        .unwrap_or_else(|e| e.into_inner().0);
                }
            }
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        {
            let (state, wake) = &*self.shared;
            let mut guard = lock(state);
            guard.shutdown = true;
            guard.pending = None;
            wake.notify_all();
        }
        if let Some(worker) = self.worker.take()
            && worker.thread().id() != std::thread::current().id()
        {
            let _ = worker.join();
        }
    }
}
