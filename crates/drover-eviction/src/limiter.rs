//! Rate limiters governing the eviction release pace.
//!
//! [`DynamicRateLimiter`] derives a per-item delay from live fleet health,
//! [`ExponentialBackoffLimiter`] tracks per-key retry backoff, and
//! [`MaxOfRateLimiter`] composes limiters by taking the longest delay.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use drover_fleet::ClusterInformer;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::config::{EvictionQueueOptions, RetryBackoffOptions};
use crate::metrics::EvictionMetrics;

/// Delay returned while the computed eviction rate is zero.
///
/// Finite so that a fleet recovery re-enables dispatch in bounded time and
/// shorter composed backoffs win again once the pause lifts.
pub const PAUSED_EVICTION_DELAY: Duration = Duration::from_secs(1000);

/// Per-key release pacing for a delay queue.
pub trait RateLimiter<K>: Send + Sync {
    /// Delay to apply before the given key may be dispatched.
    fn when(&self, key: &K) -> Duration;

    /// Clear any per-key state; the next `when` for the key starts fresh.
    fn forget(&self, key: &K);

    /// Number of requeues recorded for the key since it was last forgotten.
    fn num_requeues(&self, key: &K) -> u32;
}

/// Rate limiter that adjusts the eviction pace to aggregate fleet health.
///
/// Every `when` call reads the fleet snapshot through the informer and
/// selects a rate: the primary rate while the fleet is healthy, the
/// secondary rate while it is unhealthy but large-scale, and a pause (a
/// [`PAUSED_EVICTION_DELAY`] release delay) while it is unhealthy and small.
/// An unobservable fleet also pauses: halting is the fail-safe direction.
///
/// Stateless per key; retry backoff is composed externally via
/// [`MaxOfRateLimiter`].
pub struct DynamicRateLimiter {
    options: EvictionQueueOptions,
    informer: Arc<dyn ClusterInformer>,
    metrics: EvictionMetrics,
}

impl DynamicRateLimiter {
    /// Create a limiter reading fleet health through the given informer.
    #[must_use]
    pub fn new(
        informer: Arc<dyn ClusterInformer>,
        options: EvictionQueueOptions,
        metrics: EvictionMetrics,
    ) -> Self {
        Self {
            options,
            informer,
            metrics,
        }
    }

    /// Evictions per second appropriate for the current fleet health.
    ///
    /// Zero means eviction is paused.
    #[allow(clippy::cast_precision_loss)] // Cluster counts are far below 2^52
    fn current_rate(&self) -> f64 {
        let Some(lister) = self.informer.lister() else {
            error!("failed to get cluster lister, halting eviction for safety");
            return 0.0;
        };
        let clusters = match lister.list() {
            Ok(clusters) => clusters,
            Err(e) => {
                error!(error = %e, "failed to list clusters from cache, halting eviction for safety");
                return 0.0;
            }
        };

        let total = clusters.len();
        if total == 0 {
            return self.options.resource_eviction_rate;
        }

        let unhealthy = clusters.iter().filter(|c| !c.status.is_ready()).count();
        let failure_rate = unhealthy as f64 / total as f64;
        self.metrics.set_fleet_health(unhealthy, failure_rate);

        if failure_rate <= self.options.unhealthy_cluster_threshold {
            return self.options.resource_eviction_rate;
        }

        if total > self.options.large_cluster_num_threshold {
            debug!(
                failure_rate,
                rate = self.options.secondary_resource_eviction_rate,
                "fleet is unhealthy, downgrading eviction to the secondary rate"
            );
            return self.options.secondary_resource_eviction_rate;
        }

        debug!(failure_rate, "fleet is unhealthy and small, halting eviction");
        0.0
    }
}

impl<K> RateLimiter<K> for DynamicRateLimiter {
    fn when(&self, _key: &K) -> Duration {
        let rate = self.current_rate();
        if rate <= 0.0 {
            return PAUSED_EVICTION_DELAY;
        }
        Duration::from_secs_f64(1.0 / rate)
    }

    fn forget(&self, _key: &K) {}

    fn num_requeues(&self, _key: &K) -> u32 {
        0
    }
}

/// Per-key exponential retry backoff.
///
/// Each `when` call counts one requeue for the key and doubles its delay,
/// capped at the configured maximum. `forget` resets the key.
pub struct ExponentialBackoffLimiter<K> {
    base_delay: Duration,
    max_delay: Duration,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash + Clone> ExponentialBackoffLimiter<K> {
    /// Create a limiter from the given backoff options.
    #[must_use]
    pub fn new(options: RetryBackoffOptions) -> Self {
        Self {
            base_delay: options.base_delay,
            max_delay: options.max_delay,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone + Send + Sync> RateLimiter<K> for ExponentialBackoffLimiter<K> {
    fn when(&self, key: &K) -> Duration {
        let exponent = {
            let mut failures = self.failures.lock();
            let count = failures.entry(key.clone()).or_insert(0);
            let exponent = *count;
            *count = count.saturating_add(1);
            exponent
        };

        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn forget(&self, key: &K) {
        self.failures.lock().remove(key);
    }

    fn num_requeues(&self, key: &K) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }
}

/// Combinator returning the longest delay among its children.
///
/// `forget` broadcasts to every child; `num_requeues` reports the largest
/// child count.
pub struct MaxOfRateLimiter<K> {
    limiters: Vec<Arc<dyn RateLimiter<K>>>,
}

impl<K> MaxOfRateLimiter<K> {
    /// Compose the given limiters.
    #[must_use]
    pub fn new(limiters: Vec<Arc<dyn RateLimiter<K>>>) -> Self {
        Self { limiters }
    }
}

impl<K> RateLimiter<K> for MaxOfRateLimiter<K> {
    fn when(&self, key: &K) -> Duration {
        self.limiters
            .iter()
            .map(|limiter| limiter.when(key))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, key: &K) {
        for limiter in &self.limiters {
            limiter.forget(key);
        }
    }

    fn num_requeues(&self, key: &K) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Build the standard eviction limiter: fleet-health pacing combined with
/// per-key retry backoff, taking whichever delay is longer.
#[must_use]
pub fn eviction_rate_limiter<K>(
    informer: Arc<dyn ClusterInformer>,
    queue_options: EvictionQueueOptions,
    backoff: RetryBackoffOptions,
    metrics: EvictionMetrics,
) -> MaxOfRateLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    MaxOfRateLimiter::new(vec![
        Arc::new(DynamicRateLimiter::new(informer, queue_options, metrics)),
        Arc::new(ExponentialBackoffLimiter::new(backoff)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_fleet::{ClusterLister, ClusterRecord, FleetError, InMemoryFleet};

    /// Informer whose cache never syncs.
    struct UnsyncedInformer;

    impl ClusterInformer for UnsyncedInformer {
        fn lister(&self) -> Option<Arc<dyn ClusterLister>> {
            None
        }
    }

    /// Lister whose snapshot reads always fail.
    struct FailingLister;

    impl ClusterLister for FailingLister {
        fn list(&self) -> drover_fleet::Result<Vec<ClusterRecord>> {
            Err(FleetError::ListFailed {
                reason: "cache read failed".into(),
            })
        }
    }

    struct FailingInformer;

    impl ClusterInformer for FailingInformer {
        fn lister(&self) -> Option<Arc<dyn ClusterLister>> {
            Some(Arc::new(FailingLister))
        }
    }

    fn fleet(total: usize, not_ready: usize) -> InMemoryFleet {
        let clusters = (0..total)
            .map(|i| ClusterRecord::new(format!("member-{i}")).with_ready(i >= not_ready))
            .collect();
        InMemoryFleet::with_clusters(clusters)
    }

    fn dynamic(informer: Arc<dyn ClusterInformer>, metrics: EvictionMetrics) -> DynamicRateLimiter {
        DynamicRateLimiter::new(informer, EvictionQueueOptions::default(), metrics)
    }

    #[test]
    fn healthy_fleet_uses_primary_rate() {
        let limiter = dynamic(Arc::new(fleet(4, 0)), EvictionMetrics::unregistered());
        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &"task"),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn large_unhealthy_fleet_uses_secondary_rate() {
        let metrics = EvictionMetrics::unregistered();
        let limiter = dynamic(Arc::new(fleet(20, 12)), metrics.clone());

        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &"task"),
            Duration::from_secs(10)
        );
        assert_eq!(metrics.fault_num(), 12);
        assert_eq!(metrics.failure_rate(), 0.6);
    }

    #[test]
    fn small_unhealthy_fleet_pauses_then_recovers() {
        let fleet = fleet(6, 4);
        let limiter = dynamic(Arc::new(fleet.clone()), EvictionMetrics::unregistered());

        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &"task"),
            PAUSED_EVICTION_DELAY
        );

        // One cluster recovers: 3/6 is back under the threshold.
        fleet.set_clusters(
            (0..6)
                .map(|i| ClusterRecord::new(format!("member-{i}")).with_ready(i >= 3))
                .collect(),
        );
        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &"task"),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn ratio_exactly_at_threshold_is_healthy() {
        // 55/100 is not strictly above 0.55.
        let limiter = dynamic(Arc::new(fleet(100, 55)), EvictionMetrics::unregistered());
        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &"task"),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn count_exactly_at_large_threshold_pauses() {
        // 10 clusters is not strictly above 10, so an unhealthy fleet halts.
        let limiter = dynamic(Arc::new(fleet(10, 8)), EvictionMetrics::unregistered());
        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &"task"),
            PAUSED_EVICTION_DELAY
        );
    }

    #[test]
    fn empty_fleet_counts_as_healthy() {
        let limiter = dynamic(Arc::new(InMemoryFleet::new()), EvictionMetrics::unregistered());
        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &"task"),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn unsynced_informer_pauses() {
        let limiter = dynamic(Arc::new(UnsyncedInformer), EvictionMetrics::unregistered());
        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &"task"),
            PAUSED_EVICTION_DELAY
        );
    }

    #[test]
    fn failing_lister_pauses() {
        let limiter = dynamic(Arc::new(FailingInformer), EvictionMetrics::unregistered());
        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &"task"),
            PAUSED_EVICTION_DELAY
        );
    }

    #[test]
    fn dynamic_limiter_is_stateless_per_key() {
        let limiter = dynamic(Arc::new(fleet(4, 0)), EvictionMetrics::unregistered());
        RateLimiter::<&str>::when(&limiter, &"task");
        assert_eq!(RateLimiter::<&str>::num_requeues(&limiter, &"task"), 0);
        RateLimiter::<&str>::forget(&limiter, &"task");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let limiter = ExponentialBackoffLimiter::new(RetryBackoffOptions {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(32),
        });

        assert_eq!(limiter.when(&"k"), Duration::from_millis(5));
        assert_eq!(limiter.when(&"k"), Duration::from_millis(10));
        assert_eq!(limiter.when(&"k"), Duration::from_millis(20));
        assert_eq!(limiter.when(&"k"), Duration::from_millis(32));
        assert_eq!(limiter.when(&"k"), Duration::from_millis(32));
        assert_eq!(limiter.num_requeues(&"k"), 5);
    }

    #[test]
    fn backoff_tracks_keys_independently() {
        let limiter = ExponentialBackoffLimiter::new(RetryBackoffOptions::default());

        limiter.when(&"a");
        limiter.when(&"a");
        limiter.when(&"b");

        assert_eq!(limiter.num_requeues(&"a"), 2);
        assert_eq!(limiter.num_requeues(&"b"), 1);
    }

    #[test]
    fn backoff_forget_resets_the_key() {
        let limiter = ExponentialBackoffLimiter::new(RetryBackoffOptions::default());

        limiter.when(&"k");
        limiter.when(&"k");
        limiter.forget(&"k");

        assert_eq!(limiter.num_requeues(&"k"), 0);
        assert_eq!(limiter.when(&"k"), Duration::from_millis(5));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let limiter = ExponentialBackoffLimiter::new(RetryBackoffOptions::default());

        for _ in 0..64 {
            limiter.when(&"k");
        }
        assert_eq!(limiter.when(&"k"), Duration::from_secs(1000));
    }

    /// Limiter returning a fixed delay for every key.
    struct FixedLimiter(Duration);

    impl<K> RateLimiter<K> for FixedLimiter {
        fn when(&self, _key: &K) -> Duration {
            self.0
        }

        fn forget(&self, _key: &K) {}

        fn num_requeues(&self, _key: &K) -> u32 {
            0
        }
    }

    #[test]
    fn max_of_returns_longest_delay() {
        let limiter: MaxOfRateLimiter<&str> = MaxOfRateLimiter::new(vec![
            Arc::new(FixedLimiter(Duration::from_secs(2))),
            Arc::new(FixedLimiter(Duration::from_millis(10))),
        ]);
        assert_eq!(limiter.when(&"k"), Duration::from_secs(2));
    }

    #[test]
    fn max_of_empty_set_returns_zero() {
        let limiter: MaxOfRateLimiter<&str> = MaxOfRateLimiter::new(Vec::new());
        assert_eq!(limiter.when(&"k"), Duration::ZERO);
        assert_eq!(limiter.num_requeues(&"k"), 0);
    }

    #[test]
    fn max_of_broadcasts_forget_and_reports_max_requeues() {
        let backoff = Arc::new(ExponentialBackoffLimiter::new(RetryBackoffOptions::default()));
        let limiter: MaxOfRateLimiter<&str> = MaxOfRateLimiter::new(vec![
            Arc::new(FixedLimiter(Duration::ZERO)),
            Arc::clone(&backoff) as Arc<dyn RateLimiter<&str>>,
        ]);

        limiter.when(&"k");
        limiter.when(&"k");
        assert_eq!(limiter.num_requeues(&"k"), 2);

        limiter.forget(&"k");
        assert_eq!(backoff.num_requeues(&"k"), 0);
    }

    #[test]
    fn composed_limiter_prefers_health_pacing_over_small_backoff() {
        let limiter = eviction_rate_limiter::<&str>(
            Arc::new(fleet(4, 0)),
            EvictionQueueOptions::default(),
            RetryBackoffOptions::default(),
            EvictionMetrics::unregistered(),
        );

        // Backoff starts at 5ms; health pacing (2s) dominates.
        assert_eq!(limiter.when(&"k"), Duration::from_secs(2));
        assert_eq!(limiter.when(&"k"), Duration::from_secs(2));

        // After a forget the composite yields the first-admission delay again.
        limiter.forget(&"k");
        assert_eq!(limiter.num_requeues(&"k"), 0);
        assert_eq!(limiter.when(&"k"), Duration::from_secs(2));
    }
}
