use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    cluster::{
        ClusterConnection, MetadataSnapshot,
        error::{Error, RequestContext, Result},
    },
    topic::{Topic, TopicConfig},
    validation::ExactlyOne,
    wire::{BrokerWire, TopicOutcome},
};

impl<W> ClusterConnection<W>
where
    W: BrokerWire,
{
    /// Returns the topics of the cluster, ordered by name.
    ///
    /// With `refresh` the metadata is fetched again first, otherwise the cached snapshot is used.
    pub async fn get_topics(&self, refresh: bool) -> Result<Vec<Topic>> {
        let mut slot = self.handle.lock().await;
        let handle = self.ensure_healthy(&mut slot).await?;

        let snapshot = match (refresh, self.cache.get()) {
            (false, Some(snapshot)) => snapshot,
            _ => self.load_topics(handle).await?,
        };

        Ok(snapshot.topics.clone())
    }

    /// Create a topic and return it as seen by the cluster afterwards.
    pub async fn create_topic(&self, config: TopicConfig) -> Result<Topic> {
        config.validate().map_err(Error::InvalidTopicConfig)?;

        let mut slot = self.handle.lock().await;
        let handle = self.ensure_healthy(&mut slot).await?;

        info!(
            topic = config.name.as_str(),
            num_partitions = config.num_partitions,
            replication_factor = config.replication_factor,
            "Creating topic",
        );
        let outcome = self
            .call(self.wire.create_topics(
                handle,
                std::slice::from_ref(&config),
                self.config.admin_timeout,
            ))
            .await
            .map_err(|e| Error::request(RequestContext::Topic(config.name.clone()), e))?;
        check_outcome(outcome)?;

        // The acknowledgement carries no partition layout, only fresh metadata does.
        let snapshot = self.load_topics(handle).await?;
        snapshot
            .topic(&config.name)
            .cloned()
            .ok_or(Error::TopicNotFoundAfterCreate(config.name))
    }

    /// Delete a topic.
    ///
    /// The metadata is reloaded afterwards even if the broker rejected the deletion.
    pub async fn delete_topic(&self, name: &str) -> Result<()> {
        let mut slot = self.handle.lock().await;
        let handle = self.ensure_healthy(&mut slot).await?;

        info!(topic = name, "Deleting topic");
        let names = [name.to_owned()];
        let outcome = self
            .call(
                self.wire
                    .delete_topics(handle, &names, self.config.admin_timeout),
            )
            .await
            .map_err(|e| Error::request(RequestContext::Topic(name.to_owned()), e))?;
        let deleted = check_outcome(outcome);

        match (self.load_topics(handle).await, deleted) {
            (_, Err(e)) => Err(e),
            (Ok(_), Ok(())) => Ok(()),
            (Err(e), Ok(())) => {
                // The topic is gone, the cache must not claim otherwise.
                if let Some(snapshot) = self.cache.get() {
                    self.cache.update(Arc::new(snapshot.without_topic(name)));
                }
                Err(e)
            }
        }
    }

    /// Fetch a full metadata snapshot and replace the cached one.
    ///
    /// On failure the cached snapshot is kept.
    pub(super) async fn load_topics(&self, handle: &W::Handle) -> Result<Arc<MetadataSnapshot>> {
        let metadata = self
            .call(self.wire.fetch_metadata(handle))
            .await
            .map_err(|e| {
                error!(%e, "metadata request encountered fatal error");
                Error::request(RequestContext::Cluster, e)
            })?;

        let snapshot = Arc::new(MetadataSnapshot::new(metadata, Utc::now()));
        self.cache.update(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

fn check_outcome(outcome: Vec<TopicOutcome>) -> Result<()> {
    let topic = outcome.exactly_one().map_err(Error::exactly_one_topic)?;

    match topic.error {
        None => Ok(()),
        Some(protocol_error) => {
            warn!(
                topic = topic.name.as_str(),
                %protocol_error,
                "Broker rejected topic request",
            );
            Err(Error::ServerError {
                protocol_error,
                error_message: topic.error_message,
                request: RequestContext::Topic(topic.name),
            })
        }
    }
}
