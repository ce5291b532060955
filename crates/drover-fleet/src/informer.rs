//! Lister and informer contracts over the fleet cache.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::record::ClusterRecord;

/// Read-only snapshot access to every known cluster record.
///
/// Implementations must serve from a local cache: `list` sits on hot
/// dispatch paths and must not perform I/O.
pub trait ClusterLister: Send + Sync {
    /// List all cluster records in the local snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::ListFailed`](crate::FleetError::ListFailed)
    /// when the snapshot cannot be read.
    fn list(&self) -> Result<Vec<ClusterRecord>>;
}

/// Source of a [`ClusterLister`] once the backing cache has synced.
pub trait ClusterInformer: Send + Sync {
    /// The current lister, or `None` while the cache has not yet synced.
    fn lister(&self) -> Option<Arc<dyn ClusterLister>>;
}

#[derive(Debug, Default)]
struct Snapshot {
    clusters: RwLock<Vec<ClusterRecord>>,
}

impl ClusterLister for Snapshot {
    fn list(&self) -> Result<Vec<ClusterRecord>> {
        Ok(self.clusters.read().clone())
    }
}

/// An in-memory fleet snapshot implementing both fleet contracts.
///
/// Serves tests and embedders that maintain their own cluster cache.
/// Cheap to clone; clones share the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFleet {
    snapshot: Arc<Snapshot>,
}

impl InMemoryFleet {
    /// Create an empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fleet pre-populated with the given records.
    #[must_use]
    pub fn with_clusters(clusters: Vec<ClusterRecord>) -> Self {
        let fleet = Self::new();
        fleet.set_clusters(clusters);
        fleet
    }

    /// Replace the snapshot with the given records.
    pub fn set_clusters(&self, clusters: Vec<ClusterRecord>) {
        *self.snapshot.clusters.write() = clusters;
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.snapshot.clusters.write().clear();
    }

    /// Number of records in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.clusters.read().len()
    }

    /// True when the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClusterLister for InMemoryFleet {
    fn list(&self) -> Result<Vec<ClusterRecord>> {
        self.snapshot.list()
    }
}

impl ClusterInformer for InMemoryFleet {
    fn lister(&self) -> Option<Arc<dyn ClusterLister>> {
        Some(Arc::clone(&self.snapshot) as Arc<dyn ClusterLister>)
    }
}
