use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::snapshot::MetadataSnapshot;

/// Holds the latest [`MetadataSnapshot`] of a cluster.
///
/// Readers get a shared reference to a whole snapshot; an update swaps the reference, so a reader
/// never observes a mix of two fetches.
#[derive(Debug, Default)]
pub(crate) struct MetadataCache {
    cache: RwLock<Option<Arc<MetadataSnapshot>>>,
}

impl MetadataCache {
    /// Grab the cached snapshot, if one was stored yet.
    pub(crate) fn get(&self) -> Option<Arc<MetadataSnapshot>> {
        self.cache.read().as_ref().map(Arc::clone)
    }

    pub(crate) fn update(&self, snapshot: Arc<MetadataSnapshot>) {
        debug!(
            topics = snapshot.topics.len(),
            brokers = snapshot.brokers.len(),
            "updated metadata cache"
        );
        *self.cache.write() = Some(snapshot);
    }
}
