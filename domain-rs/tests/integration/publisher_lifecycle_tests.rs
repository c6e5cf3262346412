//! Integration tests for the publisher runtime lifecycle
//!
//! Start/stop handshakes, status publications and heartbeat-driven
//! publication of registered entities, all over the loopback messenger.

use iotdomain::{
    DummyMessenger, MessengerConfig, Publisher, PublisherConfig, PublisherRunState,
    PublisherStatusMessage,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> PublisherConfig {
    PublisherConfig {
        publisher_id: "pub1".to_string(),
        config_folder: dir.path().join("config").to_string_lossy().to_string(),
        cache_folder: dir.path().join("cache").to_string_lossy().to_string(),
        ..PublisherConfig::default()
    }
}

fn last_status(messenger: &DummyMessenger) -> PublisherRunState {
    let publication = messenger.last_publication("local/pub1/$status").unwrap();
    let envelope: iotdomain::SignedEnvelope = serde_json::from_str(&publication.message).unwrap();
    let status: PublisherStatusMessage = serde_json::from_str(&envelope.payload).unwrap();
    status.status
}

/// Test: Start publishes the connected status and identity, stop the
/// disconnected status
#[test]
fn test_start_stop_publishes_status() {
    let dir = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
    let publisher = Publisher::new(&test_config(&dir), messenger.clone()).unwrap();

    publisher.start();
    assert!(publisher.is_running());
    assert!(messenger.is_connected());
    assert_eq!(last_status(&messenger), PublisherRunState::Connected);
    assert!(messenger.last_publication("local/pub1/$identity").is_some());

    publisher.stop();
    assert!(!publisher.is_running());
    assert!(!messenger.is_connected());
    assert_eq!(last_status(&messenger), PublisherRunState::Disconnected);
}

/// Test: Start and stop are idempotent
#[test]
fn test_start_stop_idempotent() {
    let dir = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
    let publisher = Publisher::new(&test_config(&dir), messenger.clone()).unwrap();

    publisher.start();
    let after_first_start = messenger.publication_count();
    publisher.start();
    assert_eq!(messenger.publication_count(), after_first_start);
    assert!(publisher.is_running());

    publisher.stop();
    assert!(!publisher.is_running());
    // a second stop republishes the graceful status but must not hang
    publisher.stop();
    assert!(!publisher.is_running());
}

/// Test: The heartbeat loop publishes a registered node
///
/// A node created after start is picked up by a later tick and published
/// on its discovery address.
#[test]
fn test_heartbeat_publishes_registered_node() {
    let dir = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
    let publisher = Publisher::new(&test_config(&dir), messenger.clone()).unwrap();

    publisher.start();
    let node = publisher.registered_nodes().create_node("hw-1", "sensor");

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut published = messenger.last_publication(&node.address);
    while published.is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
        published = messenger.last_publication(&node.address);
    }
    publisher.stop();

    assert!(published.is_some(), "node discovery was not published");
}

/// Test: An empty publisher ID is a construction error
#[test]
fn test_empty_publisher_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
    let mut config = test_config(&dir);
    config.publisher_id = String::new();
    assert!(Publisher::new(&config, messenger).is_err());
}

/// Test: The poll handler fires on the first tick after start
#[test]
fn test_poll_handler_fires() {
    let dir = TempDir::new().unwrap();
    let messenger = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
    let publisher = Publisher::new(&test_config(&dir), messenger.clone()).unwrap();

    let polled = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = polled.clone();
    publisher.set_poll_interval(600, Arc::new(move |_publisher| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }));

    publisher.start();
    let deadline = Instant::now() + Duration::from_secs(5);
    while polled.load(std::sync::atomic::Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
    publisher.stop();

    assert!(polled.load(std::sync::atomic::Ordering::SeqCst) >= 1);
}
