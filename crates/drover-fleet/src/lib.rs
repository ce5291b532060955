//! # drover-fleet
//!
//! Fleet model for drover control-plane crates: member-cluster records,
//! status conditions, the readiness predicate, and the lister/informer
//! contracts through which dispatchers observe fleet health.
//!
//! Listers serve from a local cache snapshot; nothing in this crate performs
//! network I/O, so health reads are safe on hot dispatch paths.
//!
//! # Example
//!
//! ```rust
//! use drover_fleet::{ClusterInformer, ClusterRecord, InMemoryFleet};
//!
//! let fleet = InMemoryFleet::new();
//! fleet.set_clusters(vec![
//!     ClusterRecord::new("east").with_ready(true),
//!     ClusterRecord::new("west").with_ready(false),
//! ]);
//!
//! let lister = fleet.lister().expect("in-memory fleet is always synced");
//! let clusters = lister.list().unwrap();
//! assert_eq!(clusters.iter().filter(|c| c.status.is_ready()).count(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod informer;
pub mod record;

pub use error::{FleetError, Result};
pub use informer::{ClusterInformer, ClusterLister, InMemoryFleet};
pub use record::{
    ClusterCondition, ClusterRecord, ClusterStatus, ConditionStatus, READY_CONDITION,
};
