//! The broker wire capability a [`ClusterConnection`](crate::cluster::ClusterConnection) is built on.
//!
//! A [`BrokerWire`] speaks the Kafka protocol to individual brokers. Everything above it (health
//! checks, reconnects, metadata caching, offset aggregation) lives in this crate and is independent
//! of the concrete client library.
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{metadata::Metadata, protocol::error::Error as ProtocolError, topic::TopicConfig};

#[cfg(feature = "wire-rdkafka")]
mod librdkafka;

#[cfg(feature = "wire-rdkafka")]
pub use self::librdkafka::{RdKafkaHandle, RdKafkaWire};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WireError {
    #[error("Cannot read/write data: {0}")]
    IO(#[from] std::io::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error(
        "Server error {protocol_error} with message \"{}\"",
        error_message.as_deref().unwrap_or_default()
    )]
    Server {
        protocol_error: ProtocolError,
        error_message: Option<String>,
    },

    #[error("Client error: {0}")]
    Client(Box<dyn std::error::Error + Send + Sync>),
}

impl WireError {
    /// Wraps an arbitrary error of the underlying client library.
    pub fn client(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Client(e.into())
    }
}

/// Broker answer for one topic of a create or delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicOutcome {
    pub name: String,
    pub error: Option<ProtocolError>,
    pub error_message: Option<String>,
}

impl TopicOutcome {
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: None,
            error_message: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: ProtocolError) -> Self {
        Self {
            name: name.into(),
            error: Some(error),
            error_message: None,
        }
    }
}

/// Committed offset of a consumer group for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOffset {
    pub partition: i32,

    /// `None` if the group never committed on this partition.
    pub committed_offset: Option<i64>,

    /// Metadata string stored alongside the commit.
    pub metadata: String,

    pub error: Option<ProtocolError>,
}

/// Low-level connection primitives.
///
/// A [`Handle`](Self::Handle) is one established connection to one broker. Handles are never
/// shared between [`ClusterConnection`](crate::cluster::ClusterConnection)s.
#[async_trait]
pub trait BrokerWire: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    /// Connect to the broker at `address` (`host:port`).
    async fn dial(&self, address: &str) -> Result<Self::Handle, WireError>;

    /// Address (`host:port`) of the cluster controller, as known by the broker behind `handle`.
    async fn controller_address(&self, handle: &Self::Handle) -> Result<String, WireError>;

    /// Metadata for all topics visible to the cluster.
    async fn fetch_metadata(&self, handle: &Self::Handle) -> Result<Metadata, WireError>;

    /// Returns one [`TopicOutcome`] per requested topic.
    async fn create_topics(
        &self,
        handle: &Self::Handle,
        topics: &[TopicConfig],
        timeout: Duration,
    ) -> Result<Vec<TopicOutcome>, WireError>;

    /// Returns one [`TopicOutcome`] per requested topic.
    async fn delete_topics(
        &self,
        handle: &Self::Handle,
        names: &[String],
        timeout: Duration,
    ) -> Result<Vec<TopicOutcome>, WireError>;

    /// IDs of all consumer groups known to the cluster.
    async fn list_consumer_groups(&self, handle: &Self::Handle) -> Result<Vec<String>, WireError>;

    /// Committed offsets of `group_id` for the given partitions of `topic`.
    async fn fetch_group_offsets(
        &self,
        handle: &Self::Handle,
        group_id: &str,
        topic: &str,
        partitions: &[i32],
    ) -> Result<Vec<PartitionOffset>, WireError>;

    /// Cheap liveness check, e.g. an API versions request.
    async fn probe(&self, handle: &Self::Handle) -> Result<(), WireError>;

    /// Release a handle that is no longer used.
    async fn close(&self, handle: Self::Handle) {
        drop(handle);
    }
}
