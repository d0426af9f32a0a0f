use std::sync::{Arc, atomic::Ordering};

use assert_matches::assert_matches;
use kafman::{
    ProtocolError,
    cluster::{ClusterConnection, ClusterConnectionBuilder, ConnectionStatus, Error, RequestContext},
    topic::TopicConfig,
    wire::WireError,
};

use test_helpers::{FakeCluster, broker_address, maybe_start_logging, random_topic_name};

async fn connect(cluster: &Arc<FakeCluster>) -> ClusterConnection<FakeCluster> {
    ClusterConnection::connect(Arc::clone(cluster), vec![broker_address(1)])
        .await
        .unwrap()
}

#[tokio::test]
async fn test_connect_loads_snapshot() {
    maybe_start_logging();

    let cluster = Arc::new(
        FakeCluster::new(3)
            .with_topic("orders", 3)
            .with_topic("__consumer_offsets", 1),
    );
    let connection = connect(&cluster).await;

    assert_eq!(connection.status(), ConnectionStatus::Connected);
    assert_eq!(connection.bootstrap_brokers(), [broker_address(1)]);

    let snapshot = connection.snapshot().unwrap();
    let broker_ids: Vec<_> = snapshot.brokers.iter().map(|b| b.node_id).collect();
    assert_eq!(broker_ids, vec![1, 2, 3]);
    assert_eq!(snapshot.controller().unwrap().address(), broker_address(1));

    let names: Vec<_> = snapshot.topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["__consumer_offsets", "orders"]);
    assert!(snapshot.topic("__consumer_offsets").unwrap().is_internal);

    let orders = snapshot.topic("orders").unwrap();
    assert_eq!(orders.partition_ids(), vec![0, 1, 2]);
    for partition in &orders.partitions {
        assert_eq!(partition.topic, "orders");
        assert_eq!(partition.replicas.len(), 2);
        assert_eq!(partition.leader.as_ref(), partition.replicas.first());
        assert!(partition.offline_replicas.is_empty());
    }
}

#[tokio::test]
async fn test_connect_without_brokers() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1));
    let err = ClusterConnection::connect(Arc::clone(&cluster), vec![])
        .await
        .unwrap_err();

    assert_matches!(err, Error::NoBrokers);
    assert_eq!(cluster.dials.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connect_via_non_controller() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(3));
    cluster.set_controller(3);

    let connection = ClusterConnection::connect(Arc::clone(&cluster), vec![broker_address(2)])
        .await
        .unwrap();

    assert_eq!(connection.snapshot().unwrap().controller_id, Some(3));
    // bootstrap broker + controller, bootstrap handle released
    assert_eq!(cluster.dials.load(Ordering::SeqCst), 2);
    assert_eq!(cluster.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connect_fails_if_no_broker_reachable() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(2));
    cluster.set_down(1, true);
    cluster.set_down(2, true);

    let err = ClusterConnection::connect(
        Arc::clone(&cluster),
        vec![broker_address(1), broker_address(2)],
    )
    .await
    .unwrap_err();

    assert_matches!(err, Error::Dial { brokers, .. } if brokers.len() == 2);
    assert_eq!(cluster.dials.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_connect_fails_if_metadata_fails() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1));
    cluster.fail_next_metadata_requests(1);

    let err = ClusterConnection::connect(Arc::clone(&cluster), vec![broker_address(1)])
        .await
        .unwrap_err();

    assert_matches!(
        err,
        Error::Request {
            request: RequestContext::Cluster,
            source: WireError::IO(_),
        }
    );
    assert_eq!(cluster.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_topics_cached_and_refreshed() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_topic("a", 1));
    let connection = connect(&cluster).await;
    let fetched_at = connection.snapshot().unwrap().fetched_at;

    // created behind our back
    let other = connect(&cluster).await;
    other
        .create_topic(TopicConfig::new("b", 1, 1))
        .await
        .unwrap();

    let requests = cluster.metadata_requests.load(Ordering::SeqCst);
    let topics = connection.get_topics(false).await.unwrap();
    let names: Vec<_> = topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a"]);
    assert_eq!(cluster.metadata_requests.load(Ordering::SeqCst), requests);

    let topics = connection.get_topics(true).await.unwrap();
    let names: Vec<_> = topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(cluster.metadata_requests.load(Ordering::SeqCst), requests + 1);
    assert!(connection.snapshot().unwrap().fetched_at >= fetched_at);
}

#[tokio::test]
async fn test_failed_refresh_keeps_snapshot() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_topic("a", 1));
    let connection = connect(&cluster).await;
    let before = connection.snapshot().unwrap();

    cluster.fail_next_metadata_requests(1);
    let err = connection.get_topics(true).await.unwrap_err();
    assert_matches!(
        err,
        Error::Request {
            request: RequestContext::Cluster,
            ..
        }
    );
    assert!(Arc::ptr_eq(&before, &connection.snapshot().unwrap()));

    // the connection itself is fine, the next refresh goes through
    let topics = connection.get_topics(true).await.unwrap();
    assert_eq!(topics.len(), 1);
    assert!(!Arc::ptr_eq(&before, &connection.snapshot().unwrap()));
}

#[tokio::test]
async fn test_get_topics_checks_health() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1));
    let connection = connect(&cluster).await;

    let probes = cluster.probes.load(Ordering::SeqCst);
    connection.get_topics(false).await.unwrap();
    assert_eq!(cluster.probes.load(Ordering::SeqCst), probes + 1);
}

#[tokio::test]
async fn test_create_topic() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(3));
    let connection = connect(&cluster).await;
    let name = random_topic_name();

    let topic = connection
        .create_topic(TopicConfig::new(&name, 4, 2).with_config("cleanup.policy", "compact"))
        .await
        .unwrap();
    assert_eq!(topic.name, name);
    assert_eq!(topic.num_partitions(), 4);
    assert!(!topic.is_internal);

    // visible without a refresh
    let requests = cluster.metadata_requests.load(Ordering::SeqCst);
    let topics = connection.get_topics(false).await.unwrap();
    let cached: Vec<_> = topics.iter().filter(|t| t.name == name).collect();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].num_partitions(), 4);
    assert_eq!(cluster.metadata_requests.load(Ordering::SeqCst), requests);
}

#[tokio::test]
async fn test_create_topic_rejected() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_topic("existing", 1));
    let connection = connect(&cluster).await;
    let before = connection.snapshot().unwrap();
    let requests = cluster.metadata_requests.load(Ordering::SeqCst);

    let err = connection
        .create_topic(TopicConfig::new("wide", 1, 3))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        Error::ServerError {
            protocol_error: ProtocolError::InvalidReplicationFactor,
            error_message: Some(_),
            request: RequestContext::Topic(ref topic),
        } if topic == "wide"
    );

    let err = connection
        .create_topic(TopicConfig::new("existing", 1, 1))
        .await
        .unwrap_err();
    assert_eq!(err.protocol_error(), Some(ProtocolError::TopicAlreadyExists));

    // cache untouched
    assert_eq!(cluster.metadata_requests.load(Ordering::SeqCst), requests);
    assert_eq!(connection.snapshot().unwrap(), before);
    assert_eq!(cluster.topic_names(), vec!["existing"]);
}

#[tokio::test]
async fn test_create_topic_invalid_config() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1));
    let connection = connect(&cluster).await;
    let probes = cluster.probes.load(Ordering::SeqCst);

    let err = connection
        .create_topic(TopicConfig::new("t", 2, 1).with_assignment(0, vec![1]))
        .await
        .unwrap_err();
    assert_matches!(err, Error::InvalidTopicConfig(_));

    let err = connection
        .create_topic(TopicConfig::new("", 1, 1))
        .await
        .unwrap_err();
    assert_matches!(err, Error::InvalidTopicConfig(_));

    // never sent
    assert_eq!(cluster.probes.load(Ordering::SeqCst), probes);
    assert!(cluster.topic_names().is_empty());
}

#[tokio::test]
async fn test_create_topic_missing_after_create() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1));
    let connection = connect(&cluster).await;
    cluster.hide_topic("ghost");

    let err = connection
        .create_topic(TopicConfig::new("ghost", 1, 1))
        .await
        .unwrap_err();
    assert_matches!(err, Error::TopicNotFoundAfterCreate(ref name) if name == "ghost");
}

#[tokio::test]
async fn test_delete_topic() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_topic("a", 1).with_topic("b", 1));
    let connection = connect(&cluster).await;

    connection.delete_topic("a").await.unwrap();

    let topics = connection.get_topics(false).await.unwrap();
    let names: Vec<_> = topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["b"]);
    assert_eq!(cluster.topic_names(), vec!["b"]);
}

#[tokio::test]
async fn test_delete_unknown_topic_refreshes() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_topic("a", 1));
    let connection = connect(&cluster).await;
    cluster.remove_topic("a");

    let err = connection.delete_topic("a").await.unwrap_err();
    assert_eq!(
        err.protocol_error(),
        Some(ProtocolError::UnknownTopicOrPartition)
    );

    // the rejected delete still brought the cache up to date
    assert!(connection.snapshot().unwrap().topic("a").is_none());
}

#[tokio::test]
async fn test_delete_topic_reload_fails() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_topic("a", 1).with_topic("b", 1));
    let connection = connect(&cluster).await;
    cluster.fail_next_metadata_requests(1);

    let err = connection.delete_topic("a").await.unwrap_err();
    assert_matches!(
        err,
        Error::Request {
            request: RequestContext::Cluster,
            ..
        }
    );

    let snapshot = connection.snapshot().unwrap();
    assert!(snapshot.topic("a").is_none());
    assert!(snapshot.topic("b").is_some());
}

#[tokio::test]
async fn test_reconnect_after_probe_failure() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_topic("a", 1));
    let connection = connect(&cluster).await;
    let dials = cluster.dials.load(Ordering::SeqCst);

    cluster.kill_connections();

    let topics = connection.get_topics(false).await.unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(connection.status(), ConnectionStatus::Connected);
    assert_eq!(cluster.dials.load(Ordering::SeqCst), dials + 1);
    assert_eq!(cluster.closed.load(Ordering::SeqCst), 1);

    // the new handle is kept
    connection.get_topics(false).await.unwrap();
    assert_eq!(cluster.dials.load(Ordering::SeqCst), dials + 1);
}

#[tokio::test]
async fn test_reconnect_failure() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_topic("a", 1));
    let connection = connect(&cluster).await;

    cluster.set_down(1, true);

    let err = connection.get_topics(false).await.unwrap_err();
    assert_matches!(err, Error::ConnectionLost(ref inner) if matches!(**inner, Error::Dial { .. }));
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);

    // the snapshot survives
    assert!(connection.snapshot().unwrap().topic("a").is_some());

    // without a handle, the next operation reconnects straight away
    cluster.set_down(1, false);
    let probes = cluster.probes.load(Ordering::SeqCst);
    connection.get_topics(false).await.unwrap();
    assert_eq!(connection.status(), ConnectionStatus::Connected);
    assert_eq!(cluster.probes.load(Ordering::SeqCst), probes);
}

#[tokio::test]
async fn test_consumer_offsets() {
    maybe_start_logging();

    let cluster = Arc::new(
        FakeCluster::new(1)
            .with_topic("orders", 3)
            .with_topic("other", 1)
            .with_commit("billing", "orders", 0, 42)
            .with_commit("billing", "orders", 2, 7)
            .with_commit("audit", "other", 0, 1)
            .with_partition_error("shipping", 1, ProtocolError::GroupAuthorizationFailed),
    );
    let connection = connect(&cluster).await;

    let records = connection.consumer_offsets("orders").await.unwrap();

    let groups: Vec<_> = records.iter().map(|r| r.group_id.as_str()).collect();
    assert_eq!(groups, vec!["audit", "billing", "shipping"]);

    for record in &records {
        let partitions: Vec<_> = record.partitions.iter().map(|p| p.partition).collect();
        assert_eq!(partitions, vec![0, 1, 2]);
    }

    // group without commits on this topic
    assert!(
        records[0]
            .partitions
            .iter()
            .all(|p| p.committed_offset.is_none() && p.error.is_none())
    );

    let billing = &records[1].partitions;
    assert_eq!(billing[0].committed_offset, Some(42));
    assert_eq!(billing[0].metadata, "m42");
    assert_eq!(billing[1].committed_offset, None);
    assert_eq!(billing[2].committed_offset, Some(7));

    let shipping = &records[2].partitions;
    assert_eq!(shipping[0].error, None);
    assert_eq!(
        shipping[1].error,
        Some(ProtocolError::GroupAuthorizationFailed)
    );
}

#[tokio::test]
async fn test_consumer_offsets_unknown_topic() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_commit("g", "orders", 0, 1));
    let connection = connect(&cluster).await;
    let probes = cluster.probes.load(Ordering::SeqCst);

    let err = connection.consumer_offsets("orders").await.unwrap_err();
    assert_matches!(err, Error::TopicNotFound(ref name) if name == "orders");

    assert_eq!(cluster.group_requests.load(Ordering::SeqCst), 0);
    assert_eq!(cluster.probes.load(Ordering::SeqCst), probes);
}

#[tokio::test]
async fn test_consumer_offsets_group_failure() {
    maybe_start_logging();

    let cluster = Arc::new(
        FakeCluster::new(1)
            .with_topic("orders", 1)
            .with_commit("a", "orders", 0, 1)
            .with_commit("b", "orders", 0, 2)
            .with_commit("c", "orders", 0, 3),
    );
    cluster.fail_group("b");
    let connection = ClusterConnectionBuilder::new(vec![broker_address(1)])
        .offset_fetch_concurrency(1)
        .build(Arc::clone(&cluster))
        .await
        .unwrap();

    let err = connection.consumer_offsets("orders").await.unwrap_err();
    assert_matches!(
        err,
        Error::Request {
            request: RequestContext::Group { ref group, ref topic },
            ..
        } if group == "b" && topic == "orders"
    );
}

#[tokio::test]
async fn test_consumer_offsets_no_groups() {
    maybe_start_logging();

    let cluster = Arc::new(FakeCluster::new(1).with_topic("orders", 2));
    let connection = connect(&cluster).await;

    let records = connection.consumer_offsets("orders").await.unwrap();
    assert!(records.is_empty());
    assert_eq!(cluster.group_requests.load(Ordering::SeqCst), 1);
}
