//! Live cluster connections, by profile name.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    cluster::{
        self, ClusterConnection, ClusterConnectionBuilder, ConnectionConfig, ConsumerOffsetRecord,
    },
    profile::ProfileStore,
    topic::{Topic, TopicConfig},
    wire::BrokerWire,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Profile \"{0}\" not found")]
    ProfileNotFound(String),

    #[error("Profile \"{profile}\": {source}")]
    Cluster {
        profile: String,
        #[source]
        source: cluster::Error,
    },
}

impl Error {
    /// The error of the cluster connection, if this is one.
    pub fn cluster_error(&self) -> Option<&cluster::Error> {
        match self {
            Self::Cluster { source, .. } => Some(source),
            Self::ProfileNotFound(_) => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

type Slot<W> = Arc<OnceCell<Arc<ClusterConnection<W>>>>;

/// Maps profile names to their [`ClusterConnection`].
///
/// Connections are created on first use and then kept until [`remove`](Self::remove)d. Concurrent
/// first uses of one profile share a single connection attempt; different profiles never wait for
/// each other.
pub struct ConnectionRegistry<W, P>
where
    W: BrokerWire,
{
    wire: Arc<W>,
    profiles: P,
    config: ConnectionConfig,
    connections: Mutex<HashMap<String, Slot<W>>>,
}

impl<W, P> ConnectionRegistry<W, P>
where
    W: BrokerWire,
    P: ProfileStore,
{
    pub fn new(wire: Arc<W>, profiles: P) -> Self {
        Self::with_config(wire, profiles, ConnectionConfig::default())
    }

    /// All connections created by this registry use `config`.
    pub fn with_config(wire: Arc<W>, profiles: P, config: ConnectionConfig) -> Self {
        Self {
            wire,
            profiles,
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn profiles(&self) -> &P {
        &self.profiles
    }

    /// The connection of `profile`, connecting first if there is none yet.
    ///
    /// An existing connection is returned as is, its health is checked by its next operation. A
    /// failed connect leaves nothing behind, so the next call tries again.
    ///
    /// Only a successful connect is shared. Callers that waited on a failed attempt each make
    /// their own attempt afterwards, one after another.
    pub async fn resolve(&self, profile: &str) -> Result<Arc<ClusterConnection<W>>> {
        let slot = {
            let mut connections = self.connections.lock();
            Arc::clone(connections.entry(profile.to_owned()).or_default())
        };

        let result = slot
            .get_or_try_init(|| async {
                debug!(profile, "lookup for profile");
                let found = self
                    .profiles
                    .get(profile)
                    .ok_or_else(|| Error::ProfileNotFound(profile.to_owned()))?;

                info!(profile, brokers = ?found.bootstrap_brokers(), "Connecting profile");
                let connection = ClusterConnectionBuilder::new(found.bootstrap_brokers().to_vec())
                    .config(self.config)
                    .build(Arc::clone(&self.wire))
                    .await
                    .map_err(|source| Error::Cluster {
                        profile: profile.to_owned(),
                        source,
                    })?;

                Ok::<_, Error>(Arc::new(connection))
            })
            .await
            .map(Arc::clone);

        if result.is_err() {
            self.release_failed(profile, slot);
        }
        result
    }

    /// Drop the empty slot of a failed attempt unless another caller still waits on it.
    fn release_failed(&self, profile: &str, slot: Slot<W>) {
        let failed = Arc::as_ptr(&slot);
        drop(slot);

        let mut connections = self.connections.lock();
        let unused = connections.get(profile).is_some_and(|s| {
            Arc::as_ptr(s) == failed && Arc::strong_count(s) == 1 && !s.initialized()
        });
        if unused {
            connections.remove(profile);
        }
    }

    /// Drop the connection of `profile`, e.g. because the profile was deleted.
    ///
    /// Returns `true` if there was an established connection. Callers still holding the connection
    /// can keep using it; the registry will create a new one on next use.
    pub fn remove(&self, profile: &str) -> bool {
        let removed = self
            .connections
            .lock()
            .remove(profile)
            .is_some_and(|slot| slot.initialized());
        if removed {
            info!(profile, "Removed connection");
        }
        removed
    }

    /// Names of the profiles with an established connection, sorted.
    pub fn connected_profiles(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .connections
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Connect `profile` if it is not connected yet.
    pub async fn connect(&self, profile: &str) -> Result<()> {
        self.resolve(profile).await.map(|_| ())
    }

    pub async fn get_topics(&self, profile: &str, refresh: bool) -> Result<Vec<Topic>> {
        let connection = self.resolve(profile).await?;
        connection
            .get_topics(refresh)
            .await
            .map_err(cluster_error(profile))
    }

    pub async fn create_topic(&self, profile: &str, config: TopicConfig) -> Result<Topic> {
        let connection = self.resolve(profile).await?;
        connection
            .create_topic(config)
            .await
            .map_err(cluster_error(profile))
    }

    pub async fn delete_topic(&self, profile: &str, name: &str) -> Result<()> {
        let connection = self.resolve(profile).await?;
        connection
            .delete_topic(name)
            .await
            .map_err(cluster_error(profile))
    }

    pub async fn consumer_offsets(
        &self,
        profile: &str,
        topic: &str,
    ) -> Result<Vec<ConsumerOffsetRecord>> {
        let connection = self.resolve(profile).await?;
        connection
            .consumer_offsets(topic)
            .await
            .map_err(cluster_error(profile))
    }
}

fn cluster_error(profile: &str) -> impl FnOnce(cluster::Error) -> Error + '_ {
    move |source| Error::Cluster {
        profile: profile.to_owned(),
        source,
    }
}

impl<W, P> std::fmt::Debug for ConnectionRegistry<W, P>
where
    W: BrokerWire,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut connected: Vec<_> = self
            .connections
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        connected.sort();

        f.debug_struct("ConnectionRegistry")
            .field("config", &self.config)
            .field("connected", &connected)
            .finish_non_exhaustive()
    }
}
