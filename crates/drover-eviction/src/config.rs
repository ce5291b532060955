//! Eviction pacing and retry backoff options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EvictionError, Result};

/// Tunables for the fleet-health eviction rate limiter.
///
/// The fleet counts as *unhealthy* when the ratio of not-ready clusters to
/// total clusters strictly exceeds `unhealthy_cluster_threshold`, and as
/// *large-scale* when the total cluster count strictly exceeds
/// `large_cluster_num_threshold`. A healthy fleet evicts at
/// `resource_eviction_rate`; an unhealthy large-scale fleet is downgraded to
/// `secondary_resource_eviction_rate`; an unhealthy small fleet pauses
/// eviction entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvictionQueueOptions {
    /// Evictions released per second while the fleet is healthy.
    pub resource_eviction_rate: f64,
    /// Evictions released per second while the fleet is unhealthy and
    /// large-scale.
    pub secondary_resource_eviction_rate: f64,
    /// Fraction of unhealthy clusters above which the fleet counts as
    /// unhealthy. Open interval (0, 1).
    pub unhealthy_cluster_threshold: f64,
    /// Cluster count above which the fleet counts as large-scale.
    pub large_cluster_num_threshold: usize,
}

impl Default for EvictionQueueOptions {
    fn default() -> Self {
        Self {
            resource_eviction_rate: 0.5,
            secondary_resource_eviction_rate: 0.1,
            unhealthy_cluster_threshold: 0.55,
            large_cluster_num_threshold: 10,
        }
    }
}

impl EvictionQueueOptions {
    /// Validate the option set.
    ///
    /// # Errors
    ///
    /// Returns [`EvictionError::InvalidOptions`] when a rate is not strictly
    /// positive and finite, the secondary rate exceeds the primary rate, or
    /// the unhealthy threshold falls outside the open interval (0, 1).
    pub fn validate(&self) -> Result<()> {
        if !self.resource_eviction_rate.is_finite() || self.resource_eviction_rate <= 0.0 {
            return Err(EvictionError::InvalidOptions {
                reason: format!(
                    "resource eviction rate must be a positive number, got {}",
                    self.resource_eviction_rate
                ),
            });
        }
        if !self.secondary_resource_eviction_rate.is_finite()
            || self.secondary_resource_eviction_rate <= 0.0
        {
            return Err(EvictionError::InvalidOptions {
                reason: format!(
                    "secondary resource eviction rate must be a positive number, got {}",
                    self.secondary_resource_eviction_rate
                ),
            });
        }
        if self.secondary_resource_eviction_rate > self.resource_eviction_rate {
            return Err(EvictionError::InvalidOptions {
                reason: format!(
                    "secondary resource eviction rate {} must not exceed resource eviction rate {}",
                    self.secondary_resource_eviction_rate, self.resource_eviction_rate
                ),
            });
        }
        if self.unhealthy_cluster_threshold <= 0.0 || self.unhealthy_cluster_threshold >= 1.0 {
            return Err(EvictionError::InvalidOptions {
                reason: format!(
                    "unhealthy cluster threshold must be inside (0, 1), got {}",
                    self.unhealthy_cluster_threshold
                ),
            });
        }
        Ok(())
    }
}

/// Tunables for the per-key retry backoff limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBackoffOptions {
    /// Delay applied to a key's first retry.
    pub base_delay: Duration,
    /// Upper bound on any backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryBackoffOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
        }
    }
}

impl RetryBackoffOptions {
    /// Validate the option set.
    ///
    /// # Errors
    ///
    /// Returns [`EvictionError::InvalidOptions`] when the base delay is zero
    /// or exceeds the maximum delay.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(EvictionError::InvalidOptions {
                reason: "retry base delay must be non-zero".into(),
            });
        }
        if self.base_delay > self.max_delay {
            return Err(EvictionError::InvalidOptions {
                reason: format!(
                    "retry base delay {:?} must not exceed max delay {:?}",
                    self.base_delay, self.max_delay
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_options_defaults() {
        let options = EvictionQueueOptions::default();
        assert_eq!(options.resource_eviction_rate, 0.5);
        assert_eq!(options.secondary_resource_eviction_rate, 0.1);
        assert_eq!(options.unhealthy_cluster_threshold, 0.55);
        assert_eq!(options.large_cluster_num_threshold, 10);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn queue_options_reject_non_positive_rate() {
        let options = EvictionQueueOptions {
            resource_eviction_rate: 0.0,
            ..EvictionQueueOptions::default()
        };
        assert!(options.validate().is_err());

        let options = EvictionQueueOptions {
            secondary_resource_eviction_rate: -0.1,
            ..EvictionQueueOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn queue_options_reject_non_finite_rate() {
        let options = EvictionQueueOptions {
            resource_eviction_rate: f64::INFINITY,
            ..EvictionQueueOptions::default()
        };
        assert!(options.validate().is_err());

        let options = EvictionQueueOptions {
            secondary_resource_eviction_rate: f64::NAN,
            ..EvictionQueueOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn queue_options_reject_secondary_above_primary() {
        let options = EvictionQueueOptions {
            resource_eviction_rate: 0.1,
            secondary_resource_eviction_rate: 0.5,
            ..EvictionQueueOptions::default()
        };
        let err = options.validate().expect_err("secondary above primary");
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn queue_options_reject_threshold_outside_open_interval() {
        for threshold in [0.0, 1.0, -0.2, 1.5] {
            let options = EvictionQueueOptions {
                unhealthy_cluster_threshold: threshold,
                ..EvictionQueueOptions::default()
            };
            assert!(options.validate().is_err(), "threshold {threshold}");
        }
    }

    #[test]
    fn queue_options_deserialize_from_json() {
        let options: EvictionQueueOptions = serde_json::from_str(
            r#"{
                "resource_eviction_rate": 1.0,
                "secondary_resource_eviction_rate": 0.2,
                "unhealthy_cluster_threshold": 0.5,
                "large_cluster_num_threshold": 20
            }"#,
        )
        .expect("deserialize");

        assert_eq!(options.resource_eviction_rate, 1.0);
        assert_eq!(options.large_cluster_num_threshold, 20);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn backoff_options_defaults() {
        let options = RetryBackoffOptions::default();
        assert_eq!(options.base_delay, Duration::from_millis(5));
        assert_eq!(options.max_delay, Duration::from_secs(1000));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn backoff_options_reject_zero_base() {
        let options = RetryBackoffOptions {
            base_delay: Duration::ZERO,
            ..RetryBackoffOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn backoff_options_reject_base_above_max() {
        let options = RetryBackoffOptions {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
        };
        assert!(options.validate().is_err());
    }
}
