//! Integration tests for the signed discovery pipeline
//!
//! Runs the full path a domain consumer sees: a publisher announces its
//! identity, publishes signed node discovery messages over the loopback
//! messenger, and the subscribed directory verifies and admits them.

use chrono::Utc;
use iotdomain::messaging::SignedEnvelope;
use iotdomain::{
    DomainNodes, DomainPublisherIdentities, DummyMessenger, MessageSigner, Messenger,
    MessengerConfig, NodeDiscoveryMessage, ReceivePublisherIdentities, RegisteredIdentity,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn make_identity(publisher_id: &str, dir: &TempDir) -> RegisteredIdentity {
    let file = dir.path().join(format!("{}-identity.json", publisher_id));
    RegisteredIdentity::load_or_create("local", publisher_id, &file).unwrap()
}

fn node_message(publisher_id: &str, node_id: &str) -> NodeDiscoveryMessage {
    NodeDiscoveryMessage {
        address: format!("local/{}/{}/$node", publisher_id, node_id),
        hw_id: node_id.to_string(),
        node_id: node_id.to_string(),
        publisher_id: publisher_id.to_string(),
        node_type: "sensor".to_string(),
        attr: HashMap::new(),
        config: HashMap::new(),
        status: HashMap::new(),
        timestamp: Utc::now(),
    }
}

/// Test: A signed node discovery from a known publisher is admitted
#[test]
fn test_signed_discovery_is_admitted() {
    let dir = TempDir::new().unwrap();
    let sender = make_identity("pub1", &dir);

    let messenger: Arc<DummyMessenger> = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
    let identities = DomainPublisherIdentities::new();
    identities.add_identity(&sender.public_identity());

    let signer = Arc::new(MessageSigner::new(
        messenger.clone(),
        Some(sender.signing_key()),
        identities.resolver(),
    ));
    let domain_nodes = DomainNodes::new("local", signer.clone());
    domain_nodes.subscribe();

    let node = node_message("pub1", "node1");
    signer.publish_object(&node.address, true, &node).unwrap();

    let admitted = domain_nodes.get_node_by_address("local/pub1/node1").unwrap();
    assert_eq!(admitted.node_id, "node1");
    assert_eq!(domain_nodes.update_count(), 1);
}

/// Test: A message from an unknown signer is dropped, not retried
///
/// The sender never announced an identity; its discovery is rejected and
/// a later re-publication after the identity arrives is what admits it.
#[test]
fn test_unknown_signer_is_dropped() {
    let dir = TempDir::new().unwrap();
    let sender = make_identity("pub2", &dir);

    let messenger: Arc<DummyMessenger> = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
    let identities = DomainPublisherIdentities::new();

    let signer = Arc::new(MessageSigner::new(
        messenger.clone(),
        Some(sender.signing_key()),
        identities.resolver(),
    ));
    let domain_nodes = DomainNodes::new("local", signer.clone());
    domain_nodes.subscribe();

    let node = node_message("pub2", "node1");
    signer.publish_object(&node.address, true, &node).unwrap();
    assert!(domain_nodes.is_empty());

    // after the identity is known, a fresh publication is admitted
    identities.add_identity(&sender.public_identity());
    signer.publish_object(&node.address, true, &node).unwrap();
    assert_eq!(domain_nodes.len(), 1);
}

/// Test: A tampered payload leaves the previous entry visible
#[test]
fn test_tampered_payload_is_rejected() {
    let dir = TempDir::new().unwrap();
    let sender = make_identity("pub1", &dir);

    let messenger: Arc<DummyMessenger> = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
    let identities = DomainPublisherIdentities::new();
    identities.add_identity(&sender.public_identity());

    let signer = Arc::new(MessageSigner::new(
        messenger.clone(),
        Some(sender.signing_key()),
        identities.resolver(),
    ));
    let domain_nodes = DomainNodes::new("local", signer.clone());
    domain_nodes.subscribe();

    let mut node = node_message("pub1", "node1");
    node.node_type = "original".to_string();
    signer.publish_object(&node.address, true, &node).unwrap();

    // re-sign the original payload but swap in a tampered one
    let signed = messenger.last_publication(&node.address).unwrap();
    let envelope: SignedEnvelope = serde_json::from_str(&signed.message).unwrap();
    node.node_type = "tampered".to_string();
    let forged = SignedEnvelope {
        payload: serde_json::to_string(&node).unwrap(),
        signature: envelope.signature,
    };
    messenger
        .publish(&node.address, true, &serde_json::to_string(&forged).unwrap())
        .unwrap();

    let stored = domain_nodes.get_node_by_address("local/pub1/node1").unwrap();
    assert_eq!(stored.node_type, "original");
    assert_eq!(domain_nodes.update_count(), 1);
}

/// Test: Identity announcements bootstrap discovery end to end
///
/// A consumer that only knows the domain learns pub1's key from its
/// `$identity` announcement and can then verify pub1's node discoveries.
#[test]
fn test_identity_announcement_bootstraps_verification() {
    let dir = TempDir::new().unwrap();
    let sender = make_identity("pub1", &dir);

    let messenger: Arc<DummyMessenger> = Arc::new(DummyMessenger::new(&MessengerConfig::default()));

    // consumer side: empty identity directory, listening for announcements
    let identities = DomainPublisherIdentities::new();
    let consumer_signer = Arc::new(MessageSigner::new(
        messenger.clone(),
        None,
        identities.resolver(),
    ));
    let identity_listener =
        ReceivePublisherIdentities::new("local", identities.clone(), consumer_signer.clone());
    identity_listener.start();
    let domain_nodes = DomainNodes::new("local", consumer_signer.clone());
    domain_nodes.subscribe();

    // sender side: announce identity, then publish a node
    let sender_signer = Arc::new(MessageSigner::new(
        messenger.clone(),
        Some(sender.signing_key()),
        identities.resolver(),
    ));
    let announced = sender.public_identity();
    sender_signer
        .publish_object(&announced.address, true, &announced)
        .unwrap();
    let node = node_message("pub1", "node1");
    sender_signer.publish_object(&node.address, true, &node).unwrap();

    assert!(identities.get_publisher_key("pub1").is_some());
    assert!(domain_nodes.get_node_by_address("local/pub1/node1").is_some());
}
