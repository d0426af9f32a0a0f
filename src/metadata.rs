//! Cluster-wide Kafka metadata, as reported by a broker.
//!
//! These are the raw answers of [`BrokerWire::fetch_metadata`](crate::wire::BrokerWire::fetch_metadata).
//! Broker IDs are not resolved here; see [`MetadataSnapshot`](crate::cluster::MetadataSnapshot) for
//! the resolved view that is cached by a [`ClusterConnection`](crate::cluster::ClusterConnection).
use crate::protocol::error::Error as ProtocolError;

/// Metadata container for the entire cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    /// Brokers.
    pub brokers: Vec<MetadataBroker>,

    /// The ID of the controller broker.
    pub controller_id: Option<i32>,

    /// Topics.
    pub topics: Vec<MetadataTopic>,
}

/// Metadata for a certain broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBroker {
    /// The broker ID
    pub node_id: i32,

    /// The broker hostname
    pub host: String,

    /// The broker port
    pub port: i32,

    /// Rack.
    pub rack: Option<String>,
}

/// Metadata for a certain topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTopic {
    /// The topic name
    pub name: String,

    /// The topic error, if any.
    pub error: Option<ProtocolError>,

    /// True if the topic is internal
    pub is_internal: Option<bool>,

    /// Each partition in the topic
    pub partitions: Vec<MetadataPartition>,
}

/// Metadata for a certain partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPartition {
    /// The partition index
    pub partition_index: i32,

    /// The partition error, if any.
    pub error: Option<ProtocolError>,

    /// The ID of the leader broker, `-1` if there is none
    pub leader_id: i32,

    /// The set of all nodes that host this partition
    pub replica_nodes: Vec<i32>,

    /// The set of all nodes that are in sync with the leader for this partition
    pub isr_nodes: Vec<i32>,
}
