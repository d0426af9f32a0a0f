//! A managed connection to one Kafka cluster.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tracing::info;

use crate::wire::{BrokerWire, WireError};

mod controller;
pub mod error;
mod health;
mod metadata_cache;
mod offsets;
mod snapshot;
mod topics;

pub use self::error::{Error, RequestContext, Result};
pub use self::offsets::ConsumerOffsetRecord;
pub use self::snapshot::MetadataSnapshot;

use self::metadata_cache::MetadataCache;

/// Timeouts and limits of a [`ClusterConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Bound for finding a reachable bootstrap broker, and again for dialing the controller.
    pub dial_timeout: Duration,

    /// Bound for every other wire call.
    pub request_timeout: Duration,

    /// Time the controller is given to complete a topic creation or deletion.
    pub admin_timeout: Duration,

    /// Number of consumer groups whose offsets are fetched at the same time.
    pub offset_fetch_concurrency: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            admin_timeout: Duration::from_secs(5),
            offset_fetch_concurrency: 8,
        }
    }
}

/// Externally observable state of a [`ClusterConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Builder for [`ClusterConnection`].
pub struct ClusterConnectionBuilder {
    bootstrap_brokers: Vec<String>,
    config: ConnectionConfig,
}

impl ClusterConnectionBuilder {
    /// Create a new [`ClusterConnectionBuilder`] with the list of bootstrap brokers
    pub fn new(bootstrap_brokers: Vec<String>) -> Self {
        Self {
            bootstrap_brokers,
            config: ConnectionConfig::default(),
        }
    }

    /// Replace all timeouts and limits at once.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bound for reaching a bootstrap broker and the controller.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    /// Set the bound for every other wire call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the time the controller gets to create or delete a topic.
    pub fn admin_timeout(mut self, timeout: Duration) -> Self {
        self.config.admin_timeout = timeout;
        self
    }

    /// Set how many consumer groups are fetched at once, at least one.
    pub fn offset_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.config.offset_fetch_concurrency = concurrency.max(1);
        self
    }

    /// Connect to the controller and load the first metadata snapshot.
    ///
    /// A connection is never handed out without a snapshot.
    pub async fn build<W>(self, wire: Arc<W>) -> Result<ClusterConnection<W>>
    where
        W: BrokerWire,
    {
        let handle =
            controller::dial_controller(wire.as_ref(), &self.bootstrap_brokers, self.config.dial_timeout)
                .await?;

        let connection = ClusterConnection {
            wire,
            bootstrap_brokers: self.bootstrap_brokers,
            config: self.config,
            handle: Mutex::new(None),
            status: SyncMutex::new(ConnectionStatus::Connected),
            cache: MetadataCache::default(),
        };

        if let Err(e) = connection.load_topics(&handle).await {
            connection.wire.close(handle).await;
            return Err(e);
        }
        *connection.handle.lock().await = Some(handle);

        info!(
            brokers = ?connection.bootstrap_brokers,
            "Connected to cluster",
        );
        Ok(connection)
    }
}

impl std::fmt::Debug for ClusterConnectionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnectionBuilder")
            .field("bootstrap_brokers", &self.bootstrap_brokers)
            .field("config", &self.config)
            .finish()
    }
}

/// One logical connection to the controller of a cluster, plus a cache of the cluster's metadata.
///
/// Health is checked lazily: every operation first probes the connection and transparently
/// reconnects through the bootstrap brokers if the probe fails. Operations on one connection are
/// serialized.
pub struct ClusterConnection<W>
where
    W: BrokerWire,
{
    wire: Arc<W>,

    /// Broker URLs used to bootstrap this connection, reused unchanged on reconnect
    bootstrap_brokers: Vec<String>,

    config: ConnectionConfig,

    /// Current controller connection, `None` while disconnected.
    ///
    /// Held for the whole duration of an operation.
    handle: Mutex<Option<W::Handle>>,

    status: SyncMutex<ConnectionStatus>,

    cache: MetadataCache,
}

impl<W> ClusterConnection<W>
where
    W: BrokerWire,
{
    /// Connect with the default [`ConnectionConfig`].
    pub async fn connect(wire: Arc<W>, bootstrap_brokers: Vec<String>) -> Result<Self> {
        ClusterConnectionBuilder::new(bootstrap_brokers)
            .build(wire)
            .await
    }

    pub fn bootstrap_brokers(&self) -> &[String] {
        &self.bootstrap_brokers
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    /// The cached snapshot, without checking the connection or refreshing.
    pub fn snapshot(&self) -> Option<Arc<MetadataSnapshot>> {
        self.cache.get()
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock() = status;
    }

    /// Bounds a wire call by the request timeout.
    async fn call<T, F>(&self, f: F) -> Result<T, WireError>
    where
        F: Future<Output = Result<T, WireError>> + Send,
    {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, f)
            .await
            .unwrap_or(Err(WireError::Timeout(timeout)))
    }
}

impl<W> std::fmt::Debug for ClusterConnection<W>
where
    W: BrokerWire,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("bootstrap_brokers", &self.bootstrap_brokers)
            .field("config", &self.config)
            .field("status", &self.status())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
