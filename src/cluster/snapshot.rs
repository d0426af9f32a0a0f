use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    metadata::{Metadata, MetadataBroker, MetadataPartition, MetadataTopic},
    topic::{BrokerEndpoint, PartitionDescriptor, Topic},
};

/// Point-in-time view of a cluster, produced by exactly one metadata fetch.
///
/// Snapshots are never merged: every refresh replaces the previous one as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSnapshot {
    /// Brokers, ordered by node ID.
    pub brokers: Vec<BrokerEndpoint>,

    pub controller_id: Option<i32>,

    /// Topics, ordered by name.
    pub topics: Vec<Topic>,

    pub fetched_at: DateTime<Utc>,
}

impl MetadataSnapshot {
    pub fn new(metadata: Metadata, fetched_at: DateTime<Utc>) -> Self {
        let mut brokers: Vec<_> = metadata.brokers.into_iter().map(endpoint).collect();
        brokers.sort_by_key(|b| b.node_id);

        let by_id: HashMap<i32, &BrokerEndpoint> = brokers.iter().map(|b| (b.node_id, b)).collect();

        let mut topics: Vec<_> = metadata
            .topics
            .into_iter()
            .map(|t| resolve_topic(t, &by_id))
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            brokers,
            controller_id: metadata.controller_id,
            topics,
            fetched_at,
        }
    }

    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics
            .binary_search_by(|t| t.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.topics[idx])
    }

    pub fn controller(&self) -> Option<&BrokerEndpoint> {
        let id = self.controller_id?;
        self.brokers.iter().find(|b| b.node_id == id)
    }

    /// Same snapshot without `name`, for when a topic is known to be gone but the cluster could
    /// not be asked again.
    pub(crate) fn without_topic(&self, name: &str) -> Self {
        Self {
            topics: self
                .topics
                .iter()
                .filter(|t| t.name != name)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}

fn endpoint(b: MetadataBroker) -> BrokerEndpoint {
    BrokerEndpoint {
        node_id: b.node_id,
        host: b.host,
        port: b.port,
        rack: b.rack,
    }
}

fn resolve_topic(t: MetadataTopic, brokers: &HashMap<i32, &BrokerEndpoint>) -> Topic {
    let mut partitions: Vec<_> = t
        .partitions
        .into_iter()
        .map(|p| resolve_partition(&t.name, p, brokers))
        .collect();
    partitions.sort_by_key(|p| p.partition);

    Topic {
        name: t.name,
        is_internal: t.is_internal.unwrap_or_default(),
        partitions,
        error: t.error,
    }
}

fn resolve_partition(
    topic: &str,
    p: MetadataPartition,
    brokers: &HashMap<i32, &BrokerEndpoint>,
) -> PartitionDescriptor {
    let lookup = |id: &i32| brokers.get(id).map(|b| (*b).clone());

    PartitionDescriptor {
        topic: topic.to_owned(),
        partition: p.partition_index,
        leader: lookup(&p.leader_id),
        replicas: p.replica_nodes.iter().filter_map(lookup).collect(),
        isr: p.isr_nodes.iter().filter_map(lookup).collect(),
        offline_replicas: p
            .replica_nodes
            .iter()
            .filter(|id| !brokers.contains_key(*id))
            .copied()
            .collect(),
        error: p.error,
    }
}
