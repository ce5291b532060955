//! Prometheus metrics for eviction queues and fleet health.
//!
//! [`EvictionMetrics`] is a facade of recorders shared by the worker and the
//! dynamic rate limiter: queue depth, per-kind queued counts, dispatch and
//! processing latencies, reconcile outcomes, and the fleet health observed
//! at each dispatch decision.

use std::sync::atomic::AtomicU64;
use std::time::Duration;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Outcome label value for a successful reconcile.
pub const RESULT_SUCCESS: &str = "success";
/// Outcome label value for a failed reconcile.
pub const RESULT_ERROR: &str = "error";

/// Label set for per-queue metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct QueueLabels {
    /// The queue name.
    pub queue_name: String,
}

/// Label set for per-kind queued-count gauges.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    /// The member cluster the resource is bound to.
    pub cluster_name: String,
    /// The resource kind queued for eviction.
    pub resource_kind: String,
}

/// Label set for reconcile outcome counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    /// The queue name.
    pub queue_name: String,
    /// [`RESULT_SUCCESS`] or [`RESULT_ERROR`].
    pub result: String,
}

// Buckets: 1ms to ~8s with exponential growth, matching the spread of a
// single eviction RPC round-trip.
fn processing_latency_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.001, 2.0, 14))
}

// Buckets: 1ms to ~2097s; queue residency reaches the paused delay (1000s)
// when the fleet is unhealthy.
fn queue_duration_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.001, 2.0, 22))
}

/// Recorders for eviction queue and fleet health metrics.
///
/// Cheap to clone; clones share the underlying metrics.
#[derive(Clone)]
pub struct EvictionMetrics {
    eviction_total: Family<QueueLabels, Gauge>,
    evict_kind_total: Family<KindLabels, Gauge>,
    processing_latency_seconds: Family<QueueLabels, Histogram>,
    queue_duration_seconds: Family<QueueLabels, Histogram>,
    processing_total: Family<OutcomeLabels, Counter>,
    cluster_fault_num: Gauge,
    cluster_failure_rate: Gauge<f64, AtomicU64>,
}

impl std::fmt::Debug for EvictionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionMetrics")
            .field("cluster_fault_num", &self.cluster_fault_num.get())
            .field("cluster_failure_rate", &self.cluster_failure_rate.get())
            .finish_non_exhaustive()
    }
}

impl EvictionMetrics {
    /// Create the metric set and register it with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::unregistered();

        registry.register(
            "eviction_total",
            "Current number of waiting items per eviction queue",
            metrics.eviction_total.clone(),
        );
        registry.register(
            "evict_kind_total",
            "Items currently queued for eviction per cluster and resource kind",
            metrics.evict_kind_total.clone(),
        );
        registry.register(
            "eviction_processing_latency_seconds",
            "Seconds from dequeue to reconcile return",
            metrics.processing_latency_seconds.clone(),
        );
        registry.register(
            "eviction_queue_duration_seconds",
            "Seconds an item waited in the queue before dispatch",
            metrics.queue_duration_seconds.clone(),
        );
        // The text encoder appends `_total` to counter names.
        registry.register(
            "eviction_processing",
            "Reconcile attempts per queue and outcome",
            metrics.processing_total.clone(),
        );
        registry.register(
            "cluster_fault_num",
            "Unhealthy clusters observed at the last dispatch decision",
            metrics.cluster_fault_num.clone(),
        );
        registry.register(
            "cluster_failure_rate",
            "Ratio of unhealthy to total clusters at the last dispatch decision",
            metrics.cluster_failure_rate.clone(),
        );

        metrics
    }

    /// Create a metric set registered nowhere.
    ///
    /// For tests and embedders that export through another registry.
    #[must_use]
    pub fn unregistered() -> Self {
        let processing_latency_seconds: Family<QueueLabels, Histogram> =
            Family::new_with_constructor(processing_latency_histogram);
        let queue_duration_seconds: Family<QueueLabels, Histogram> =
            Family::new_with_constructor(queue_duration_histogram);

        Self {
            eviction_total: Family::default(),
            evict_kind_total: Family::default(),
            processing_latency_seconds,
            queue_duration_seconds,
            processing_total: Family::default(),
            cluster_fault_num: Gauge::default(),
            cluster_failure_rate: Gauge::default(),
        }
    }

    /// Set the waiting-entry depth gauge for a queue.
    #[allow(clippy::cast_possible_wrap)] // Queue depths won't exceed i64::MAX
    pub fn set_queue_depth(&self, queue_name: &str, depth: usize) {
        self.eviction_total
            .get_or_create(&QueueLabels {
                queue_name: queue_name.to_string(),
            })
            .set(depth as i64);
    }

    /// Read back the depth gauge for a queue.
    #[must_use]
    pub fn queue_depth(&self, queue_name: &str) -> i64 {
        self.eviction_total
            .get_or_create(&QueueLabels {
                queue_name: queue_name.to_string(),
            })
            .get()
    }

    /// Increment the queued count for a (cluster, kind) pair.
    pub fn inc_kind_queued(&self, cluster_name: &str, resource_kind: &str) {
        self.evict_kind_total
            .get_or_create(&KindLabels {
                cluster_name: cluster_name.to_string(),
                resource_kind: resource_kind.to_string(),
            })
            .inc();
    }

    /// Decrement the queued count for a (cluster, kind) pair.
    pub fn dec_kind_queued(&self, cluster_name: &str, resource_kind: &str) {
        self.evict_kind_total
            .get_or_create(&KindLabels {
                cluster_name: cluster_name.to_string(),
                resource_kind: resource_kind.to_string(),
            })
            .dec();
    }

    /// Read back the queued count for a (cluster, kind) pair.
    #[must_use]
    pub fn kind_queued(&self, cluster_name: &str, resource_kind: &str) -> i64 {
        self.evict_kind_total
            .get_or_create(&KindLabels {
                cluster_name: cluster_name.to_string(),
                resource_kind: resource_kind.to_string(),
            })
            .get()
    }

    /// Record one reconcile attempt: processing latency plus an outcome
    /// count.
    pub fn record_processing(&self, queue_name: &str, success: bool, elapsed: Duration) {
        self.processing_latency_seconds
            .get_or_create(&QueueLabels {
                queue_name: queue_name.to_string(),
            })
            .observe(elapsed.as_secs_f64());

        let result = if success { RESULT_SUCCESS } else { RESULT_ERROR };
        self.processing_total
            .get_or_create(&OutcomeLabels {
                queue_name: queue_name.to_string(),
                result: result.to_string(),
            })
            .inc();
    }

    /// Read back the reconcile attempt count for a queue and outcome.
    #[must_use]
    pub fn processing_count(&self, queue_name: &str, result: &str) -> u64 {
        self.processing_total
            .get_or_create(&OutcomeLabels {
                queue_name: queue_name.to_string(),
                result: result.to_string(),
            })
            .get()
    }

    /// Observe how long an item waited in the queue before dispatch.
    pub fn observe_queue_duration(&self, queue_name: &str, waited: Duration) {
        self.queue_duration_seconds
            .get_or_create(&QueueLabels {
                queue_name: queue_name.to_string(),
            })
            .observe(waited.as_secs_f64());
    }

    /// Publish the fleet health observed during a dispatch decision.
    #[allow(clippy::cast_possible_wrap)] // Cluster counts won't exceed i64::MAX
    pub fn set_fleet_health(&self, unhealthy: usize, failure_rate: f64) {
        self.cluster_fault_num.set(unhealthy as i64);
        self.cluster_failure_rate.set(failure_rate);
    }

    /// Read back the unhealthy-cluster gauge.
    #[must_use]
    pub fn fault_num(&self) -> i64 {
        self.cluster_fault_num.get()
    }

    /// Read back the fleet failure-rate gauge.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        self.cluster_failure_rate.get()
    }
}
