//! Listener filter revalidation tests
//!
//! Tests for:
//! - Idle -> listening -> idle -> listening transitions driven by filters
//! - Set-equality short circuit
//! - Per-client revalidation on filter diffs, skipping inactive clients
//! - Channel and mapping-channel matching
//! - Behaviour outside the running window and across restarts

mod common;

use std::sync::Arc;

use common::{agent, filter, settings, MockFactory};
use courier_comms::CommsError;
use courier_common::{AgentSettings, Capabilities};

#[tokio::test]
async fn test_filters_drive_listener_partitions() {
    let factory = MockFactory::new();
    let agent = agent(settings("orders", Capabilities::Listener, &[0, 1], &[]), &factory);
    agent.start().await.unwrap();
    assert_eq!(factory.count("listener_start"), 0);

    // First non-empty list starts each partition exactly once
    agent
        .listener_commands_active_change(&[filter("orders", "order")])
        .await
        .unwrap();
    assert_eq!(factory.count("listener_start:0"), 1);
    assert_eq!(factory.count("listener_start:1"), 1);
    assert_eq!(agent.listener_start_count(), 2);

    // Same list again: nothing to do
    agent
        .listener_commands_active_change(&[filter("orders", "order")])
        .await
        .unwrap();
    assert_eq!(factory.count("listener_start"), 2);
    assert_eq!(factory.count("listener_validate"), 0);

    // Empty list stops every partition
    agent.listener_commands_active_change(&[]).await.unwrap();
    assert_eq!(factory.count("listener_stop"), 2);
    assert!(agent.listener_clients().is_empty());

    // And a non-empty list brings them back
    agent
        .listener_commands_active_change(&[filter("orders", "invoice")])
        .await
        .unwrap();
    assert_eq!(factory.count("listener_start:0"), 2);
    assert_eq!(factory.count("listener_start:1"), 2);
    assert_eq!(agent.listener_clients().len(), 2);
}

#[tokio::test]
async fn test_filter_diff_revalidates_every_client() {
    let factory = MockFactory::new();
    let agent = agent(settings("orders", Capabilities::Listener, &[0, 1], &[]), &factory);
    agent.start().await.unwrap();

    agent
        .listener_commands_active_change(&[filter("orders", "order")])
        .await
        .unwrap();
    agent
        .listener_commands_active_change(&[filter("orders", "order"), filter("orders", "invoice")])
        .await
        .unwrap();

    assert_eq!(factory.count("listener_validate:0:2"), 1);
    assert_eq!(factory.count("listener_validate:1:2"), 1);
    // No restarts on a diff
    assert_eq!(factory.count("listener_start"), 2);
    assert_eq!(factory.count("listener_stop"), 0);

    // Reordering and duplicates are the same set
    agent
        .listener_commands_active_change(&[
            filter("orders", "invoice"),
            filter("orders", "order"),
            filter("orders", "order"),
        ])
        .await
        .unwrap();
    assert_eq!(factory.count("listener_validate"), 2);

    // Removal is a diff too
    agent
        .listener_commands_active_change(&[filter("orders", "invoice")])
        .await
        .unwrap();
    assert_eq!(factory.count("listener_validate:0:1"), 1);
    assert_eq!(factory.count("listener_validate:1:1"), 1);
}

#[tokio::test]
async fn test_validation_failure_continues_to_siblings() {
    let factory = MockFactory::new();
    factory.fail_validate.lock().insert(1);
    let agent = agent(settings("orders", Capabilities::Listener, &[1, 0], &[]), &factory);
    agent.start().await.unwrap();

    agent
        .listener_commands_active_change(&[filter("orders", "order")])
        .await
        .unwrap();
    let err = agent
        .listener_commands_active_change(&[filter("orders", "order"), filter("orders", "invoice")])
        .await
        .unwrap_err();
    assert!(matches!(err, CommsError::Transport { .. }));

    assert_eq!(factory.count("listener_validate:0"), 1);
    assert_eq!(agent.listener_client(1).unwrap().error_count(), 1);
    assert_eq!(agent.listener_client(0).unwrap().error_count(), 0);
    // The new list is stored regardless
    assert_eq!(agent.supported_message_types().len(), 2);
}

#[tokio::test]
async fn test_revalidation_skips_inactive_clients() {
    let factory = MockFactory::new();
    factory.fail_listener_start.lock().insert(1);
    let agent = agent(settings("orders", Capabilities::Listener, &[0, 1], &[]), &factory);
    agent.start().await.unwrap();

    assert!(agent
        .listener_commands_active_change(&[filter("orders", "order")])
        .await
        .is_err());
    assert!(agent.listener_client(0).unwrap().is_active());
    assert!(!agent.listener_client(1).unwrap().is_active());

    agent
        .listener_commands_active_change(&[filter("orders", "order"), filter("orders", "invoice")])
        .await
        .unwrap();
    assert_eq!(factory.count("listener_validate:0"), 1);
    assert_eq!(factory.count("listener_validate:1"), 0);
}

#[tokio::test]
async fn test_filters_for_other_channels_are_ignored() {
    let factory = MockFactory::new();
    let agent = agent(settings("orders", Capabilities::Listener, &[0], &[]), &factory);
    agent.start().await.unwrap();

    agent
        .listener_commands_active_change(&[filter("invoices", "invoice")])
        .await
        .unwrap();
    assert!(agent.supported_message_types().is_empty());
    assert!(agent.listener_clients().is_empty());

    // Channel matching ignores case
    agent
        .listener_commands_active_change(&[filter("invoices", "invoice"), filter("ORDERS", "order")])
        .await
        .unwrap();
    assert_eq!(agent.supported_message_types(), vec![filter("ORDERS", "order")]);
    assert_eq!(agent.listener_clients().len(), 1);
}

#[tokio::test]
async fn test_mapping_channel_redirects_filter_matching() {
    let factory = MockFactory::new();
    let settings = AgentSettings {
        mapping_channel_id: Some("Orders-Mapped".to_string()),
        ..settings("orders", Capabilities::Listener, &[0], &[])
    };
    let agent = agent(settings, &factory);
    agent.start().await.unwrap();

    agent
        .listener_commands_active_change(&[filter("orders", "order")])
        .await
        .unwrap();
    assert!(agent.listener_clients().is_empty());

    agent
        .listener_commands_active_change(&[filter("orders-mapped", "order")])
        .await
        .unwrap();
    let clients = agent.listener_clients();
    assert_eq!(clients.len(), 1);
    // Names keep the channel id, not the mapping
    assert_eq!(clients[0].name(), "Listener|orders|0");
    assert_eq!(clients[0].mapping_channel_id(), Some("Orders-Mapped"));
}

#[tokio::test]
async fn test_filter_changes_ignored_when_not_running() {
    let factory = MockFactory::new();
    let agent = agent(settings("orders", Capabilities::Listener, &[0], &[]), &factory);

    agent
        .listener_commands_active_change(&[filter("orders", "order")])
        .await
        .unwrap();
    assert!(agent.supported_message_types().is_empty());

    agent.start().await.unwrap();
    assert!(agent.listener_clients().is_empty());
    assert_eq!(factory.count("listener_create"), 0);
}

#[tokio::test]
async fn test_restart_rehydrates_listeners_from_stored_filters() {
    let factory = MockFactory::new();
    let agent = agent(settings("orders", Capabilities::Listener, &[1, 0], &[]), &factory);
    agent.start().await.unwrap();
    agent
        .listener_commands_active_change(&[filter("orders", "order")])
        .await
        .unwrap();
    agent.stop().await.unwrap();
    assert_eq!(factory.count("listener_stop"), 2);

    agent.start().await.unwrap();
    assert_eq!(factory.count("listener_start"), 4);
    assert_eq!(agent.listener_clients().len(), 2);
    // Factories see the current filters when building transports
    assert_eq!(factory.count("listener_create:1:1"), 2);
    assert_eq!(factory.count("listener_create:0:1"), 2);
}

#[tokio::test]
async fn test_concurrent_filter_changes_start_each_partition_once() {
    let factory = MockFactory::new();
    let agent = Arc::new(agent(settings("orders", Capabilities::Listener, &[2, 1, 0], &[]), &factory));
    agent.start().await.unwrap();

    let filters = vec![filter("orders", "order")];
    let changes = (0..8).map(|_| {
        let agent = agent.clone();
        let filters = filters.clone();
        tokio::spawn(async move { agent.listener_commands_active_change(&filters).await })
    });

    for result in futures::future::join_all(changes).await {
        result.unwrap().unwrap();
    }

    assert_eq!(factory.count("listener_start"), 3);
    assert_eq!(factory.count("listener_validate"), 0);
    assert_eq!(agent.listener_start_count(), 3);
}

#[tokio::test]
async fn test_poll_not_supported_by_default() {
    let factory = MockFactory::new();
    let agent = agent(settings("orders", Capabilities::Listener, &[0], &[]), &factory);
    agent.start().await.unwrap();

    assert!(matches!(
        agent.listener_poll().await,
        Err(CommsError::NotImplemented("listener_poll"))
    ));
}
