//! In-process loopback messenger for tests and demos
//!
//! Publications are recorded and delivered synchronously to every matching
//! subscription, on the publishing thread. No broker involved.

use super::messenger::{Messenger, MessengerConfig, OnMessage};
use crate::address::matches_pattern;
use crate::errors::Result;
use std::sync::Mutex;
use tracing::debug;

/// A single recorded publication
#[derive(Debug, Clone)]
pub struct Publication {
    pub address: String,
    pub retained: bool,
    pub message: String,
}

/// Loopback messenger: publish delivers to local subscriptions only
pub struct DummyMessenger {
    config: MessengerConfig,
    subscriptions: Mutex<Vec<(String, OnMessage)>>,
    publications: Mutex<Vec<Publication>>,
    connected: Mutex<bool>,
}

impl DummyMessenger {
    pub fn new(config: &MessengerConfig) -> Self {
        DummyMessenger {
            config: config.clone(),
            subscriptions: Mutex::new(Vec::new()),
            publications: Mutex::new(Vec::new()),
            connected: Mutex::new(false),
        }
    }

    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    /// Number of publications recorded so far
    pub fn publication_count(&self) -> usize {
        self.publications.lock().unwrap().len()
    }

    /// The most recent publication on the given address, if any
    pub fn last_publication(&self, address: &str) -> Option<Publication> {
        self.publications
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.address == address)
            .cloned()
    }
}

impl Messenger for DummyMessenger {
    fn connect(&self, _last_will_address: &str, _last_will_value: &str) -> Result<()> {
        *self.connected.lock().unwrap() = true;
        Ok(())
    }

    fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
        self.subscriptions.lock().unwrap().clear();
    }

    fn publish(&self, address: &str, retained: bool, message: &str) -> Result<()> {
        self.publications.lock().unwrap().push(Publication {
            address: address.to_string(),
            retained,
            message: message.to_string(),
        });

        // Clone matching handlers out of the lock; a handler may publish
        // again and re-enter this messenger.
        let handlers: Vec<OnMessage> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(pattern, _)| matches_pattern(address, pattern))
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in handlers {
            if let Err(err) = handler(address, message) {
                // Not admitted; the subscription stays alive
                debug!(address, %err, "dummy messenger: handler rejected message");
            }
        }
        Ok(())
    }

    fn subscribe(&self, pattern: &str, handler: OnMessage) {
        self.subscriptions
            .lock()
            .unwrap()
            .push((pattern.to_string(), handler));
    }

    fn unsubscribe(&self, pattern: &str) {
        self.subscriptions
            .lock()
            .unwrap()
            .retain(|(p, _)| p != pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_publish_delivers_to_matching_subscription() {
        let messenger = DummyMessenger::new(&MessengerConfig::default());
        let received = Arc::new(AtomicUsize::new(0));

        let counter = received.clone();
        messenger.subscribe(
            "local/+/+/$node",
            Arc::new(move |_addr, _msg| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        messenger.publish("local/pub1/node1/$node", false, "{}").unwrap();
        messenger.publish("local/pub1/$identity", false, "{}").unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(messenger.publication_count(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let messenger = DummyMessenger::new(&MessengerConfig::default());
        let received = Arc::new(AtomicUsize::new(0));

        let counter = received.clone();
        messenger.subscribe(
            "local/#",
            Arc::new(move |_addr, _msg| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        messenger.unsubscribe("local/#");

        messenger.publish("local/pub1/node1/$node", false, "{}").unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }
}
