//! Messenger trait and configuration for message bus transports

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Callback invoked for every message received on a subscribed pattern.
/// Arguments are the publication address and the raw serialized message.
/// A returned error means the message was not admitted; the transport must
/// keep the subscription alive regardless.
pub type OnMessage = Arc<dyn Fn(&str, &str) -> Result<()> + Send + Sync>;

/// Configuration of a messenger connection, loaded from yaml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessengerConfig {
    /// Unique connect ID. Generated when empty.
    #[serde(rename = "clientid", default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    /// Broker hostname or IP address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,
    /// Broker port, 0 for the transport default
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub login: String,
    #[serde(rename = "credentials", default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Publish QoS 0-2
    #[serde(rename = "pubqos", default)]
    pub pub_qos: u8,
    /// Subscription QoS 0-2
    #[serde(rename = "subqos", default)]
    pub sub_qos: u8,
    /// Default domain for publishers using this messenger
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
}

impl MessengerConfig {
    /// The configured client ID, or a generated one when not configured
    pub fn client_id_or_generated(&self) -> String {
        if self.client_id.is_empty() {
            format!("iotdomain-{}", Uuid::new_v4())
        } else {
            self.client_id.clone()
        }
    }
}

/// Interface of message bus transports for publishers and subscribers.
///
/// Address patterns in [`Messenger::subscribe`] support two wildcards:
/// `+` matches a single segment, `#` matches all remaining segments.
pub trait Messenger: Send + Sync {
    /// Connect to the bus. The last-will address/value pair is published by
    /// the bus itself on unintentional disconnect; transports without a
    /// last-will concept ignore it. Subscriber-only clients pass "".
    fn connect(&self, last_will_address: &str, last_will_value: &str) -> Result<()>;

    /// Gracefully disconnect and drop all subscriptions. This prevents the
    /// last-will publication, so publishers publish a graceful disconnect
    /// status themselves before calling this.
    fn disconnect(&self);

    /// Publish a serialized message. Retained messages are redelivered to
    /// late subscribers by transports that support it.
    fn publish(&self, address: &str, retained: bool, message: &str) -> Result<()>;

    /// Subscribe to an address pattern. The handler runs on the transport's
    /// delivery thread, concurrently with other handlers.
    fn subscribe(&self, pattern: &str, handler: OnMessage);

    /// Remove the subscription for the given pattern. Unknown patterns are
    /// a no-op.
    fn unsubscribe(&self, pattern: &str);
}
