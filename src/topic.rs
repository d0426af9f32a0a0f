//! Topics, partitions and the brokers hosting them.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use crate::protocol::error::Error as ProtocolError;

/// A member of the cluster.
///
/// Replaced wholesale on every metadata refresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerEndpoint {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
    pub rack: Option<String>,
}

impl BrokerEndpoint {
    /// `host:port`, suitable for [`BrokerWire::dial`](crate::wire::BrokerWire::dial).
    pub fn address(&self) -> String {
        self.to_string()
    }
}

impl Display for BrokerEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A single partition of a [`Topic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub topic: String,
    pub partition: i32,

    /// Current leader, `None` if the partition has no leader or the leader is not part of the
    /// broker list.
    pub leader: Option<BrokerEndpoint>,

    /// All replicas, in the order reported by the broker.
    pub replicas: Vec<BrokerEndpoint>,

    /// In-sync replicas, in the order reported by the broker.
    pub isr: Vec<BrokerEndpoint>,

    /// Replica IDs that do not resolve to a broker of the snapshot.
    pub offline_replicas: Vec<i32>,

    pub error: Option<ProtocolError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub is_internal: bool,

    /// Partitions, ordered by partition ID.
    pub partitions: Vec<PartitionDescriptor>,

    pub error: Option<ProtocolError>,
}

impl Topic {
    pub fn partition_ids(&self) -> Vec<i32> {
        self.partitions.iter().map(|p| p.partition).collect()
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }
}

/// Explicit placement of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaAssignment {
    pub partition: i32,

    /// Broker IDs; the first one is the preferred leader.
    pub broker_ids: Vec<i32>,
}

/// Request to create a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub name: String,
    pub num_partitions: i32,
    pub replication_factor: i16,

    /// Explicit replica placement. Empty means the controller decides.
    pub assignments: Vec<ReplicaAssignment>,

    /// Per-topic config entries, e.g. `cleanup.policy`.
    pub configs: BTreeMap<String, String>,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>, num_partitions: i32, replication_factor: i16) -> Self {
        Self {
            name: name.into(),
            num_partitions,
            replication_factor,
            assignments: vec![],
            configs: BTreeMap::new(),
        }
    }

    pub fn with_assignment(mut self, partition: i32, broker_ids: Vec<i32>) -> Self {
        self.assignments.push(ReplicaAssignment {
            partition,
            broker_ids,
        });
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configs.insert(key.into(), value.into());
        self
    }

    /// Checks what can be checked without asking the cluster.
    ///
    /// Whether the replication factor can be satisfied by the live brokers is left to the
    /// controller.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("topic name must not be empty".to_owned());
        }
        if self.num_partitions < 1 {
            return Err(format!(
                "number of partitions must be at least 1, got {}",
                self.num_partitions
            ));
        }
        if self.replication_factor < 1 {
            return Err(format!(
                "replication factor must be at least 1, got {}",
                self.replication_factor
            ));
        }

        if !self.assignments.is_empty() {
            if self.assignments.len() != self.num_partitions as usize {
                return Err(format!(
                    "{} replica assignments given for {} partitions",
                    self.assignments.len(),
                    self.num_partitions
                ));
            }

            let mut seen = BTreeSet::new();
            for assignment in &self.assignments {
                if !seen.insert(assignment.partition) {
                    return Err(format!(
                        "partition {} assigned more than once",
                        assignment.partition
                    ));
                }
                if assignment.broker_ids.is_empty() {
                    return Err(format!(
                        "partition {} assigned to no broker",
                        assignment.partition
                    ));
                }
            }
        }

        Ok(())
    }
}
