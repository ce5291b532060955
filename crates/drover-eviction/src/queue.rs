//! Delay queue releasing keys at their scheduled time.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::limiter::RateLimiter;

/// A waiting queue entry.
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    /// When the entry was first admitted; preserved across ready-time
    /// updates, reset on re-admission after `done`.
    enqueued_at: Instant,
    /// Earliest instant the entry may be dispatched.
    ready_at: Instant,
    /// Admission order; breaks ties among equal `ready_at`.
    seq: u64,
}

/// State of a key currently handed to a worker.
#[derive(Debug, Clone, Copy, Default)]
struct InFlight {
    /// Release instant requested while the key was in flight, if any.
    /// Earliest request wins.
    readd_at: Option<Instant>,
}

#[derive(Debug)]
struct QueueState<K> {
    waiting: HashMap<K, QueueEntry>,
    in_flight: HashMap<K, InFlight>,
    shutdown: bool,
    next_seq: u64,
}

impl<K> Default for QueueState<K> {
    fn default() -> Self {
        Self {
            waiting: HashMap::new(),
            in_flight: HashMap::new(),
            shutdown: false,
            next_seq: 0,
        }
    }
}

/// FIFO queue releasing each key no earlier than its scheduled instant.
///
/// At most one live entry exists per key: admitting a waiting key is
/// idempotent, and admitting an in-flight key defers re-admission until the
/// worker calls [`done`](Self::done). Dispatch order is release time first,
/// admission order second.
///
/// Safe under concurrent admissions, [`get`](Self::get) calls, and shutdown.
pub struct DelayQueue<K> {
    name: String,
    limiter: Arc<dyn RateLimiter<K>>,
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

impl<K> DelayQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Create a queue paced by the given limiter.
    #[must_use]
    pub fn new(name: impl Into<String>, limiter: Arc<dyn RateLimiter<K>>) -> Self {
        Self {
            name: name.into(),
            limiter,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// The queue's name, used in logs and metric labels.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admit a key for immediate dispatch.
    ///
    /// Idempotent for a key that is already waiting, even one scheduled for
    /// a later release. A key currently in flight is re-admitted once its
    /// worker calls [`done`](Self::done). After shutdown, admissions are
    /// dropped.
    pub fn add(&self, key: K) {
        let now = Instant::now();
        self.admit(key, now, now, false);
    }

    /// Admit a key, eligible for dispatch after `delay`.
    ///
    /// A waiting key keeps its original admission time and only moves
    /// earlier: a shorter delay lowers the release time, a longer one is
    /// ignored. In-flight and post-shutdown admissions behave as in
    /// [`add`](Self::add).
    pub fn add_after(&self, key: K, delay: Duration) {
        let now = Instant::now();
        self.admit(key, now, now + delay, true);
    }

    fn admit(&self, key: K, now: Instant, ready_at: Instant, lower_existing: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.shutdown {
            debug!(queue = %self.name, key = ?key, "dropping admission after shutdown");
            return;
        }

        if let Some(in_flight) = state.in_flight.get_mut(&key) {
            in_flight.readd_at = Some(match in_flight.readd_at {
                Some(existing) => existing.min(ready_at),
                None => ready_at,
            });
            return;
        }

        let seq = state.next_seq;
        let mut wake = false;
        match state.waiting.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                if lower_existing && ready_at < occupied.get().ready_at {
                    occupied.get_mut().ready_at = ready_at;
                    wake = true;
                }
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(QueueEntry {
                    enqueued_at: now,
                    ready_at,
                    seq,
                });
                state.next_seq += 1;
                wake = true;
            }
        }
        drop(guard);

        if wake {
            self.notify.notify_waiters();
        }
    }

    /// Admit a key after the composed limiter's delay for it.
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.limiter.when(&key);
        self.add_after(key, delay);
    }

    /// Wait for the next released key and mark it in flight.
    ///
    /// Returns the key together with how long it waited in the queue, or
    /// `None` once the queue has shut down and no entry is ready for
    /// dispatch: an already-released backlog still drains, but entries
    /// waiting on a future release time are abandoned.
    pub async fn get(&self) -> Option<(K, Duration)> {
        loop {
            let notified = self.notify.notified();

            let deadline = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                let now = Instant::now();

                let released = state
                    .waiting
                    .iter()
                    .filter(|(_, entry)| entry.ready_at <= now)
                    .min_by_key(|(_, entry)| (entry.ready_at, entry.seq))
                    .map(|(key, _)| key.clone());

                if let Some(key) = released {
                    if let Some(entry) = state.waiting.remove(&key) {
                        state.in_flight.insert(key.clone(), InFlight::default());
                        return Some((key, now.duration_since(entry.enqueued_at)));
                    }
                }

                if state.shutdown {
                    return None;
                }

                state.waiting.values().map(|entry| entry.ready_at).min()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = notified => {}
                        () = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Acknowledge completion of an in-flight key.
    ///
    /// A re-admission requested while the key was in flight re-enters now as
    /// a fresh lifecycle: its queue time restarts, and it keeps the release
    /// instant recorded at request time.
    pub fn done(&self, key: &K) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(in_flight) = state.in_flight.remove(key) else {
            return;
        };
        let Some(readd_at) = in_flight.readd_at else {
            return;
        };
        if state.shutdown {
            debug!(queue = %self.name, key = ?key, "dropping re-admission after shutdown");
            return;
        }

        let now = Instant::now();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.waiting.insert(
            key.clone(),
            QueueEntry {
                enqueued_at: now,
                ready_at: readd_at.max(now),
                seq,
            },
        );
        drop(guard);

        self.notify.notify_waiters();
    }

    /// Clear the composed limiter's per-key state.
    pub fn forget(&self, key: &K) {
        self.limiter.forget(key);
    }

    /// Number of requeues the composed limiter has recorded for a key.
    #[must_use]
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.limiter.num_requeues(key)
    }

    /// Number of waiting (not in-flight) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// True when no entries are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut the queue down.
    ///
    /// Idempotent and terminal: subsequent admissions are dropped, and
    /// [`get`](Self::get) signals shutdown once no entry is ready.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        debug!(queue = %self.name, "delay queue shutting down");
        self.notify.notify_waiters();
    }

    /// True once shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutdown
    }
}
