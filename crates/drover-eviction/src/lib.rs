//! # drover-eviction
//!
//! Health-aware, rate-limited eviction dispatching for the drover control
//! plane.
//!
//! When member clusters fail in bulk, unthrottled eviction cascades load
//! onto the surviving clusters and the control plane itself. This crate
//! turns the raw eviction stream into a smoothed, self-regulating one whose
//! throughput follows aggregate fleet health:
//!
//! - [`DynamicRateLimiter`] — reads the fleet snapshot on every dispatch
//!   decision and derives a per-item release delay
//! - [`ExponentialBackoffLimiter`] — per-key retry backoff
//! - [`MaxOfRateLimiter`] — composes limiters by taking the longest delay
//! - [`DelayQueue`] — FIFO queue with per-item scheduled release and
//!   shutdown-aware dequeue
//! - [`EvictionWorker`] — worker pool timing and reconciling released
//!   tasks, requeueing failures through the composed limiter
//! - [`EvictionMetrics`] — recorders for queue depth, per-kind counts,
//!   latencies, outcomes, and fleet health
//!
//! An unhealthy fleet slows eviction down; a small unhealthy fleet pauses
//! it; an unobservable fleet pauses it too, because halting is the fail-safe
//! direction.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use drover_eviction::{
//!     DynamicRateLimiter, EvictionMetrics, EvictionQueueOptions, RateLimiter,
//! };
//! use drover_fleet::{ClusterRecord, InMemoryFleet};
//!
//! let fleet = InMemoryFleet::with_clusters(vec![
//!     ClusterRecord::new("east").with_ready(true),
//!     ClusterRecord::new("west").with_ready(true),
//! ]);
//!
//! let limiter = DynamicRateLimiter::new(
//!     Arc::new(fleet),
//!     EvictionQueueOptions::default(),
//!     EvictionMetrics::unregistered(),
//! );
//!
//! // A healthy fleet releases one eviction every two seconds at the
//! // default rate.
//! assert_eq!(
//!     RateLimiter::<&str>::when(&limiter, &"binding-1"),
//!     Duration::from_secs(2)
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod queue;
pub mod worker;

pub use config::{EvictionQueueOptions, RetryBackoffOptions};
pub use error::{EvictionError, ReconcileError, Result};
pub use limiter::{
    eviction_rate_limiter, DynamicRateLimiter, ExponentialBackoffLimiter, MaxOfRateLimiter,
    RateLimiter, PAUSED_EVICTION_DELAY,
};
pub use metrics::{
    EvictionMetrics, KindLabels, OutcomeLabels, QueueLabels, RESULT_ERROR, RESULT_SUCCESS,
};
pub use queue::DelayQueue;
pub use worker::{
    EvictionWorker, EvictionWorkerOptions, KeyFunc, Reconciler, ResourceKindFunc,
};
