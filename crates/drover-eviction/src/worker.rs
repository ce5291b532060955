//! Eviction worker: a named delay queue plus a pool of reconcile loops.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use drover_fleet::ClusterInformer;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{EvictionQueueOptions, RetryBackoffOptions};
use crate::error::{ReconcileError, Result};
use crate::limiter::eviction_rate_limiter;
use crate::metrics::EvictionMetrics;
use crate::queue::DelayQueue;

/// Derives a queue key from an enqueued object.
///
/// `Ok(None)` drops the object silently; an error is logged and dropped.
pub type KeyFunc<O, K> = Arc<dyn Fn(&O) -> Result<Option<K>> + Send + Sync>;

/// Resolves `(cluster name, resource kind)` metric labels for a key.
pub type ResourceKindFunc<K> = Arc<dyn Fn(&K) -> Option<(String, String)> + Send + Sync>;

/// Processes one eviction task.
///
/// Implementations must be idempotent and safe to retry: the worker requeues
/// every failure through the composed rate limiter and never interprets the
/// error beyond logging and counting it.
pub trait Reconciler<K>: Send + Sync {
    /// Reconcile the task identified by `key`.
    fn reconcile(
        &self,
        key: &K,
    ) -> impl Future<Output = std::result::Result<(), ReconcileError>> + Send;
}

/// Configuration for building an [`EvictionWorker`].
pub struct EvictionWorkerOptions<O, K, R> {
    /// Queue name, used in logs and metric labels.
    pub name: String,
    /// Derives queue keys from enqueued objects.
    pub key_fn: KeyFunc<O, K>,
    /// Reconciles dispatched keys.
    pub reconciler: Arc<R>,
    /// Optional resolver for per-kind metric labels.
    pub resource_kind_fn: Option<ResourceKindFunc<K>>,
    /// Fleet view backing the dynamic rate limiter.
    pub informer: Arc<dyn ClusterInformer>,
    /// Fleet-health pacing tunables.
    pub queue_options: EvictionQueueOptions,
    /// Per-key retry backoff tunables.
    pub backoff: RetryBackoffOptions,
    /// Metric recorders shared with the embedding control plane.
    pub metrics: EvictionMetrics,
}

/// A named eviction queue and its pool of reconcile loops.
///
/// Tasks admitted through [`enqueue`](Self::enqueue) are released at a pace
/// derived from fleet health, reconciled by the worker pool, and requeued
/// with backoff on failure. Reconcile errors are never fatal: they surface
/// only through logs and metrics.
pub struct EvictionWorker<O, K, R> {
    name: String,
    key_fn: KeyFunc<O, K>,
    reconciler: Arc<R>,
    resource_kind_fn: Option<ResourceKindFunc<K>>,
    queue: DelayQueue<K>,
    metrics: EvictionMetrics,
    _object: PhantomData<fn(&O)>,
}

impl<O, K, R> EvictionWorker<O, K, R>
where
    O: 'static,
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Reconciler<K> + 'static,
{
    /// Build a worker over a fresh delay queue paced by the composite of the
    /// fleet-health limiter and per-key retry backoff.
    ///
    /// # Errors
    ///
    /// Returns [`EvictionError::InvalidOptions`](crate::EvictionError::InvalidOptions)
    /// when either option set fails validation.
    pub fn new(options: EvictionWorkerOptions<O, K, R>) -> Result<Self> {
        options.queue_options.validate()?;
        options.backoff.validate()?;

        let limiter = eviction_rate_limiter::<K>(
            Arc::clone(&options.informer),
            options.queue_options,
            options.backoff,
            options.metrics.clone(),
        );
        let queue = DelayQueue::new(options.name.clone(), Arc::new(limiter));

        Ok(Self {
            name: options.name,
            key_fn: options.key_fn,
            reconciler: options.reconciler,
            resource_kind_fn: options.resource_kind_fn,
            queue,
            metrics: options.metrics,
            _object: PhantomData,
        })
    }

    /// The worker's queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of tasks waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when no tasks are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Derive a key from `obj` and admit it at the composite limiter's pace.
    ///
    /// Objects whose key cannot be derived are logged and dropped; objects
    /// that map to no key are dropped silently.
    pub fn enqueue(&self, obj: &O) {
        match (self.key_fn)(obj) {
            Ok(Some(key)) => {
                let labels = self.kind_labels(&key);
                self.queue.add_rate_limited(key);
                self.record_admission(labels);
            }
            Ok(None) => {}
            Err(e) => {
                error!(queue = %self.name, error = %e, "failed to derive key for enqueued object");
            }
        }
    }

    /// Admit a key for immediate dispatch, updating queue metrics.
    pub fn add(&self, key: K) {
        let labels = self.kind_labels(&key);
        self.queue.add(key);
        self.record_admission(labels);
    }

    /// Admit a key after a delay, updating queue metrics.
    pub fn add_after(&self, key: K, delay: Duration) {
        let labels = self.kind_labels(&key);
        self.queue.add_after(key, delay);
        self.record_admission(labels);
    }

    /// Spawn `worker_count` reconcile loops plus an observer that shuts the
    /// queue down when `cancel` fires.
    ///
    /// In-flight reconciles finish naturally; loops exit once the queue
    /// signals shutdown.
    pub fn run(self: &Arc<Self>, cancel: CancellationToken, worker_count: usize) {
        info!(queue = %self.name, workers = worker_count, "starting eviction workers");
        for _ in 0..worker_count {
            let worker = Arc::clone(self);
            tokio::spawn(async move { worker.worker_loop().await });
        }

        let worker = Arc::clone(self);
        tokio::spawn(async move {
            cancel.cancelled().await;
            info!(queue = %worker.name, "shutting down eviction worker");
            worker.queue.shutdown();
        });
    }

    fn kind_labels(&self, key: &K) -> Option<(String, String)> {
        self.resource_kind_fn.as_ref().and_then(|f| f(key))
    }

    fn record_admission(&self, labels: Option<(String, String)>) {
        self.metrics.set_queue_depth(&self.name, self.queue.len());
        if let Some((cluster, kind)) = labels {
            self.metrics.inc_kind_queued(&cluster, &kind);
        }
    }

    /// Drain the queue until shutdown.
    async fn worker_loop(&self) {
        while self.process_next().await {}
        debug!(queue = %self.name, "eviction worker loop exiting");
    }

    /// Process one task. Returns `false` once the queue has shut down.
    async fn process_next(&self) -> bool {
        let Some((key, queued)) = self.queue.get().await else {
            return false;
        };

        self.metrics.set_queue_depth(&self.name, self.queue.len());
        self.metrics.observe_queue_duration(&self.name, queued);
        let labels = self.kind_labels(&key);

        let started = Instant::now();
        let result = self.reconciler.reconcile(&key).await;
        self.metrics
            .record_processing(&self.name, result.is_ok(), started.elapsed());

        match result {
            Err(e) => {
                warn!(queue = %self.name, key = ?key, error = %e, "reconcile failed, requeueing with backoff");
                self.queue.add_rate_limited(key.clone());
                // The task is still queued, so the per-kind gauge stays up.
                self.queue.done(&key);
            }
            Ok(()) => {
                self.queue.forget(&key);
                if let Some((cluster, kind)) = labels {
                    self.metrics.dec_kind_queued(&cluster, &kind);
                }
                self.queue.done(&key);
            }
        }
        true
    }
}
