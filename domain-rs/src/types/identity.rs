//! Publisher identity and status messages

use super::Addressed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public identity of a publisher, published on `{zone}/{publisherId}/$identity`.
/// Carries the hex encoded ed25519 public key used to verify the publisher's
/// signed messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherIdentityMessage {
    /// Full identity address including the `$identity` qualifier
    pub address: String,
    pub domain: String,
    pub publisher_id: String,
    /// Hex encoded ed25519 public key (32 bytes)
    pub public_key: String,
    /// ID of the issuer: the publisher itself when self-signed, or the
    /// domain security service in secured domains
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issuer_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl Addressed for PublisherIdentityMessage {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Full identity of this publisher including its private key.
/// Saved to the config folder, never published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherFullIdentity {
    #[serde(flatten)]
    pub public: PublisherIdentityMessage,
    /// Hex encoded ed25519 secret seed (32 bytes)
    pub private_key: String,
}

/// Run state of a publisher as published on its status address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherRunState {
    /// Connected to the bus and publishing
    Connected,
    /// Gracefully disconnected
    Disconnected,
    /// Connection lost, published by the bus as last-will
    Lost,
}

impl PublisherRunState {
    /// Bare state word, used as the last-will value on connect
    pub fn as_str(&self) -> &'static str {
        match self {
            PublisherRunState::Connected => "connected",
            PublisherRunState::Disconnected => "disconnected",
            PublisherRunState::Lost => "lost",
        }
    }
}

/// Publisher status message, published retained on `{zone}/{publisherId}/$status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherStatusMessage {
    pub address: String,
    pub status: PublisherRunState,
    pub timestamp: DateTime<Utc>,
}

impl Addressed for PublisherStatusMessage {
    fn address(&self) -> &str {
        &self.address
    }
}
