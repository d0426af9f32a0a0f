use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, error};

use crate::{
    cluster::{
        ClusterConnection,
        error::{Error, RequestContext, Result},
    },
    wire::{BrokerWire, PartitionOffset},
};

/// Committed offsets of one consumer group for the partitions of one topic.
///
/// Computed on request, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOffsetRecord {
    pub group_id: String,

    /// One entry per partition of the topic, ordered by partition ID.
    ///
    /// Partitions the group never committed on have no offset; partition-level errors are kept
    /// per entry.
    pub partitions: Vec<PartitionOffset>,
}

impl<W> ClusterConnection<W>
where
    W: BrokerWire,
{
    /// Committed offsets of every consumer group of the cluster for `topic`.
    ///
    /// `topic` is looked up in the cached snapshot only; an unknown topic fails before anything is
    /// sent to the cluster. If fetching the offsets of any group fails the whole call fails.
    pub async fn consumer_offsets(&self, topic: &str) -> Result<Vec<ConsumerOffsetRecord>> {
        let partitions = self
            .cache
            .get()
            .and_then(|snapshot| snapshot.topic(topic).map(|t| t.partition_ids()))
            .ok_or_else(|| Error::TopicNotFound(topic.to_owned()))?;

        let mut slot = self.handle.lock().await;
        let handle = self.ensure_healthy(&mut slot).await?;

        let mut groups = self
            .call(self.wire.list_consumer_groups(handle))
            .await
            .map_err(|e| Error::request(RequestContext::Cluster, e))?;
        groups.sort();
        groups.dedup();
        debug!(topic, groups = groups.len(), "Fetching consumer offsets");

        let partitions = partitions.as_slice();
        stream::iter(groups)
            .map(|group_id| async move {
                let mut offsets = self
                    .call(
                        self.wire
                            .fetch_group_offsets(handle, &group_id, topic, partitions),
                    )
                    .await
                    .map_err(|e| {
                        error!(%e, group = group_id.as_str(), topic, "offset fetch failed");
                        Error::request(
                            RequestContext::Group {
                                group: group_id.clone(),
                                topic: topic.to_owned(),
                            },
                            e,
                        )
                    })?;
                offsets.sort_by_key(|o| o.partition);

                Ok::<_, Error>(ConsumerOffsetRecord {
                    group_id,
                    partitions: offsets,
                })
            })
            .buffered(self.config.offset_fetch_concurrency.max(1))
            .try_collect()
            .await
    }
}
