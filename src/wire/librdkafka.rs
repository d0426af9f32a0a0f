//! [`BrokerWire`] on top of `librdkafka`.
//!
//! librdkafka manages broker sockets itself and routes admin requests to the controller on its own,
//! so a handle is a client bootstrapped from exactly one address.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    ClientConfig, Offset, TopicPartitionList,
    admin::{AdminClient, AdminOptions, NewTopic, TopicReplication},
    client::DefaultClientContext,
    consumer::{BaseConsumer, Consumer},
    error::{KafkaError, RDKafkaErrorCode},
    types::RDKafkaRespErr,
};
use tracing::debug;

use crate::{
    build_info::DEFAULT_CLIENT_ID,
    metadata::{Metadata, MetadataBroker, MetadataPartition, MetadataTopic},
    protocol::error::Error as ProtocolError,
    topic::TopicConfig,
    wire::{BrokerWire, PartitionOffset, TopicOutcome, WireError},
};

/// Connection to one bootstrap address.
pub struct RdKafkaHandle {
    address: String,
    admin: AdminClient<DefaultClientContext>,
}

impl std::fmt::Debug for RdKafkaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdKafkaHandle")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct RdKafkaWire {
    client_id: String,

    /// Upper bound for the blocking librdkafka calls.
    timeout: Duration,

    /// Additional librdkafka properties, applied to every client.
    properties: Vec<(String, String)>,
}

impl Default for RdKafkaWire {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            timeout: Duration::from_secs(10),
            properties: vec![],
        }
    }
}

impl RdKafkaWire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set an arbitrary librdkafka property, see
    /// <https://github.com/confluentinc/librdkafka/blob/master/CONFIGURATION.md>.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    fn client_config(&self, address: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", address)
            .set("client.id", &self.client_id);
        for (k, v) in &self.properties {
            config.set(k, v);
        }
        config
    }

    fn admin_options(&self, timeout: Duration) -> AdminOptions {
        AdminOptions::new()
            .request_timeout(Some(self.timeout))
            .operation_timeout(Some(timeout))
    }
}

fn kafka_error(e: KafkaError) -> WireError {
    match e.rdkafka_error_code().and_then(broker_error) {
        Some(protocol_error) => WireError::Server {
            protocol_error,
            error_message: Some(e.to_string()),
        },
        None => WireError::client(e.to_string()),
    }
}

/// Broker-side codes that admin and group requests report. Errors raised locally by librdkafka
/// have no Kafka counterpart.
fn broker_error(code: RDKafkaErrorCode) -> Option<ProtocolError> {
    let e = match code {
        RDKafkaErrorCode::UnknownTopicOrPartition => ProtocolError::UnknownTopicOrPartition,
        RDKafkaErrorCode::RequestTimedOut => ProtocolError::RequestTimedOut,
        RDKafkaErrorCode::InvalidTopic => ProtocolError::InvalidTopicException,
        RDKafkaErrorCode::UnknownMemberId => ProtocolError::UnknownMemberId,
        RDKafkaErrorCode::TopicAuthorizationFailed => ProtocolError::TopicAuthorizationFailed,
        RDKafkaErrorCode::GroupAuthorizationFailed => ProtocolError::GroupAuthorizationFailed,
        RDKafkaErrorCode::ClusterAuthorizationFailed => ProtocolError::ClusterAuthorizationFailed,
        RDKafkaErrorCode::TopicAlreadyExists => ProtocolError::TopicAlreadyExists,
        RDKafkaErrorCode::InvalidPartitions => ProtocolError::InvalidPartitions,
        RDKafkaErrorCode::InvalidReplicationFactor => ProtocolError::InvalidReplicationFactor,
        RDKafkaErrorCode::InvalidReplicaAssignment => ProtocolError::InvalidReplicaAssignment,
        RDKafkaErrorCode::InvalidConfig => ProtocolError::InvalidConfig,
        RDKafkaErrorCode::NotController => ProtocolError::NotController,
        RDKafkaErrorCode::PolicyViolation => ProtocolError::PolicyViolation,
        RDKafkaErrorCode::TopicDeletionDisabled => ProtocolError::TopicDeletionDisabled,
        RDKafkaErrorCode::GroupIdNotFound => ProtocolError::GroupIdNotFound,
        _ => return None,
    };
    Some(e)
}

/// librdkafka does not expose the internal flag of a topic, only the broker's own topics are known.
fn is_internal_topic(name: &str) -> bool {
    matches!(name, "__consumer_offsets" | "__transaction_state")
}

fn resp_error(err: Option<RDKafkaRespErr>) -> Option<ProtocolError> {
    err.and_then(|e| ProtocolError::new(e as i32 as i16))
}

async fn blocking<T, F>(f: F) -> Result<T, WireError>
where
    F: FnOnce() -> Result<T, WireError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WireError::client(e.to_string()))?
}

#[async_trait]
impl BrokerWire for RdKafkaWire {
    type Handle = Arc<RdKafkaHandle>;

    async fn dial(&self, address: &str) -> Result<Self::Handle, WireError> {
        let config = self.client_config(address);
        let address = address.to_owned();
        let timeout = self.timeout;

        blocking(move || {
            let admin: AdminClient<DefaultClientContext> = config.create().map_err(kafka_error)?;

            // Client creation is lazy, only a request proves the broker is reachable.
            admin
                .inner()
                .fetch_metadata(None, timeout)
                .map_err(kafka_error)?;

            debug!(%address, "librdkafka client ready");
            Ok(Arc::new(RdKafkaHandle { address, admin }))
        })
        .await
    }

    /// librdkafka sends admin requests to the controller on its own, so the dialed client already
    /// is a controller connection.
    async fn controller_address(&self, handle: &Self::Handle) -> Result<String, WireError> {
        Ok(handle.address.clone())
    }

    async fn fetch_metadata(&self, handle: &Self::Handle) -> Result<Metadata, WireError> {
        let handle = Arc::clone(handle);
        let timeout = self.timeout;

        blocking(move || {
            let metadata = handle
                .admin
                .inner()
                .fetch_metadata(None, timeout)
                .map_err(kafka_error)?;

            Ok(Metadata {
                brokers: metadata
                    .brokers()
                    .iter()
                    .map(|b| MetadataBroker {
                        node_id: b.id(),
                        host: b.host().to_owned(),
                        port: b.port(),
                        rack: None,
                    })
                    .collect(),
                controller_id: None,
                topics: metadata
                    .topics()
                    .iter()
                    .map(|t| MetadataTopic {
                        name: t.name().to_owned(),
                        error: resp_error(t.error()),
                        is_internal: Some(is_internal_topic(t.name())),
                        partitions: t
                            .partitions()
                            .iter()
                            .map(|p| MetadataPartition {
                                partition_index: p.id(),
                                error: resp_error(p.error()),
                                leader_id: p.leader(),
                                replica_nodes: p.replicas().to_vec(),
                                isr_nodes: p.isr().to_vec(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
        })
        .await
    }

    async fn create_topics(
        &self,
        handle: &Self::Handle,
        topics: &[TopicConfig],
        timeout: Duration,
    ) -> Result<Vec<TopicOutcome>, WireError> {
        let assignments: Vec<Vec<&[i32]>> = topics
            .iter()
            .map(|t| {
                let mut sorted: Vec<_> = t.assignments.iter().collect();
                sorted.sort_by_key(|a| a.partition);
                sorted.into_iter().map(|a| a.broker_ids.as_slice()).collect()
            })
            .collect();

        let new_topics: Vec<NewTopic<'_>> = topics
            .iter()
            .zip(&assignments)
            .map(|(t, assignment)| {
                let replication = if assignment.is_empty() {
                    TopicReplication::Fixed(i32::from(t.replication_factor))
                } else {
                    TopicReplication::Variable(assignment.as_slice())
                };

                t.configs.iter().fold(
                    NewTopic::new(&t.name, t.num_partitions, replication),
                    |new_topic, (k, v)| new_topic.set(k, v),
                )
            })
            .collect();

        let results = handle
            .admin
            .create_topics(&new_topics, &self.admin_options(timeout))
            .await
            .map_err(kafka_error)?;

        Ok(results.into_iter().map(topic_outcome).collect())
    }

    async fn delete_topics(
        &self,
        handle: &Self::Handle,
        names: &[String],
        timeout: Duration,
    ) -> Result<Vec<TopicOutcome>, WireError> {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();

        let results = handle
            .admin
            .delete_topics(&names, &self.admin_options(timeout))
            .await
            .map_err(kafka_error)?;

        Ok(results.into_iter().map(topic_outcome).collect())
    }

    async fn list_consumer_groups(&self, handle: &Self::Handle) -> Result<Vec<String>, WireError> {
        let handle = Arc::clone(handle);
        let timeout = self.timeout;

        blocking(move || {
            let groups = handle
                .admin
                .inner()
                .fetch_group_list(None, timeout)
                .map_err(kafka_error)?;

            Ok(groups
                .groups()
                .iter()
                .map(|g| g.name().to_owned())
                .collect())
        })
        .await
    }

    async fn fetch_group_offsets(
        &self,
        handle: &Self::Handle,
        group_id: &str,
        topic: &str,
        partitions: &[i32],
    ) -> Result<Vec<PartitionOffset>, WireError> {
        let mut config = self.client_config(&handle.address);
        config
            .set("group.id", group_id)
            .set("enable.auto.commit", "false");

        let topic = topic.to_owned();
        let partitions = partitions.to_vec();
        let timeout = self.timeout;

        blocking(move || {
            // Committed offsets can only be read through a consumer of that very group.
            let consumer: BaseConsumer = config.create().map_err(kafka_error)?;

            let mut tpl = TopicPartitionList::new();
            for partition in &partitions {
                tpl.add_partition(&topic, *partition);
            }

            let committed = consumer
                .committed_offsets(tpl, timeout)
                .map_err(kafka_error)?;

            Ok(committed
                .elements_for_topic(&topic)
                .iter()
                .map(|e| PartitionOffset {
                    partition: e.partition(),
                    committed_offset: match e.offset() {
                        Offset::Offset(o) if o >= 0 => Some(o),
                        _ => None,
                    },
                    metadata: e.metadata().to_owned(),
                    error: e
                        .error()
                        .err()
                        .and_then(|e| e.rdkafka_error_code())
                        .map(|code| broker_error(code).unwrap_or(ProtocolError::UnknownServerError)),
                })
                .collect())
        })
        .await
    }

    async fn probe(&self, handle: &Self::Handle) -> Result<(), WireError> {
        // librdkafka has no public API versions call, a metadata request is the cheapest
        // round trip available.
        let handle = Arc::clone(handle);
        let timeout = self.timeout;

        blocking(move || {
            handle
                .admin
                .inner()
                .fetch_metadata(None, timeout)
                .map(|_| ())
                .map_err(kafka_error)
        })
        .await
    }
}

fn topic_outcome(result: Result<String, (String, RDKafkaErrorCode)>) -> TopicOutcome {
    match result {
        Ok(name) => TopicOutcome::ok(name),
        Err((name, code)) => TopicOutcome {
            name,
            error: Some(broker_error(code).unwrap_or(ProtocolError::UnknownServerError)),
            error_message: Some(code.to_string()),
        },
    }
}
