//! Address-indexed directory of domain entities
//!
//! A [`DomainDirectory`] holds one kind of discovered entity (nodes, inputs,
//! outputs, output values or publisher identities), keyed by the
//! entity-identity portion of its address. The trailing `$` qualifier never
//! participates in identity, so an update received on `.../node1/$set` and a
//! lookup of `.../node1` land on the same entry.
//!
//! Discovery ingestion is the trust boundary: [`DomainDirectory::handle_discovery`]
//! verifies the sender's signature through the directory's key resolver
//! before anything is decoded or admitted. Signature verification and decode
//! run before the storage lock is taken, so readers are never stalled behind
//! cryptographic work.

use crate::address::{has_address_prefix, Address};
use crate::errors::{DomainError, Result};
use crate::messaging::{verify_sender_signature, PublicKeyResolver};
use crate::types::Addressed;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tracing::warn;

/// Concurrency-safe directory of entities of a single type, indexed by
/// the node-identity portion of their address.
pub struct DomainDirectory<T> {
    entries: RwLock<HashMap<String, T>>,
    /// Number of updates since the last [`DomainDirectory::reset_update_count`];
    /// callers use it to batch-persist or batch-publish.
    update_count: AtomicUsize,
    key_resolver: PublicKeyResolver,
}

impl<T: Clone + DeserializeOwned> DomainDirectory<T> {
    /// Create a directory. The resolver is used by discovery ingestion only,
    /// never by direct local updates.
    pub fn new(key_resolver: PublicKeyResolver) -> Self {
        DomainDirectory {
            entries: RwLock::new(HashMap::new()),
            update_count: AtomicUsize::new(0),
            key_resolver,
        }
    }

    /// Store or replace the entity for the given address. Qualifier variants
    /// of the same address overwrite one slot. Malformed addresses are
    /// dropped with a warning; only discovery ingestion reports errors.
    pub fn update(&self, address: &str, entity: T) {
        let key = match Address::parse(address) {
            Ok(parsed) => parsed.node_key(),
            Err(err) => {
                warn!(address, %err, "directory update dropped");
                return;
            }
        };
        self.entries.write().unwrap().insert(key, entity);
        self.update_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Exact-or-node-equivalent lookup; qualifiers are ignored. Returns a
    /// value snapshot: mutations must go back through [`DomainDirectory::update`].
    pub fn get_by_address(&self, address: &str) -> Option<T> {
        let key = Address::parse(address).ok()?.node_key();
        self.entries.read().unwrap().get(&key).cloned()
    }

    /// Lookup by explicit node-identity components. A strict match on the
    /// full node key: supplying a nodeType/instance that is not part of the
    /// stored key, or omitting one that is, returns None.
    pub fn get(&self, base: &str, node_type: &str, instance_id: &str) -> Option<T> {
        let address = if node_type.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}/{}", base, node_type, instance_id)
        };
        self.get_by_address(&address)
    }

    /// Every stored entity whose address has `prefix` as a segment-wise
    /// prefix, in unspecified order.
    pub fn get_by_address_prefix(&self, prefix: &str) -> Vec<T> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|(key, _)| has_address_prefix(key, prefix))
            .map(|(_, entity)| entity.clone())
            .collect()
    }

    /// Every stored entity, typed
    pub fn get_all(&self) -> Vec<T> {
        self.entries.read().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Delete the entry for the given address. Idempotent: removing an
    /// unknown or malformed address is a no-op.
    pub fn remove(&self, address: &str) {
        let key = match Address::parse(address) {
            Ok(parsed) => parsed.node_key(),
            Err(_) => return,
        };
        if self.entries.write().unwrap().remove(&key).is_some() {
            self.update_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Updates since the last reset; nonzero means there is something to
    /// persist or publish.
    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::Relaxed)
    }

    pub fn reset_update_count(&self) {
        self.update_count.store(0, Ordering::Relaxed);
    }

    /// Ingest a discovery message received from the bus.
    ///
    /// Verify-then-admit, terminal in one step:
    /// 1. parse the address ([`DomainError::Address`])
    /// 2. resolve the claimed sender's key ([`DomainError::UnknownSigner`];
    ///    the message is dropped, not queued for retry)
    /// 3. verify the payload signature ([`DomainError::Signature`])
    /// 4. decode the payload into the directory's entity type
    ///    ([`DomainError::Decode`])
    /// 5. admit via [`DomainDirectory::update`]
    ///
    /// Any failure leaves the directory unchanged; the previous entry for the
    /// address, if any, stays visible.
    pub fn handle_discovery(&self, address: &str, message: &str) -> Result<()> {
        let payload = verify_sender_signature(address, message, &self.key_resolver)?;
        let entity: T = serde_json::from_str(&payload).map_err(|e| {
            DomainError::Decode(format!(
                "payload on '{}' does not match the entity type: {}",
                address, e
            ))
        })?;
        self.update(address, entity);
        Ok(())
    }

    /// Bulk import of previously exported entities, for the persistence
    /// boundary. Does not touch the update counter: restoring a cache is not
    /// a change worth persisting again.
    pub fn import(&self, entities: Vec<T>)
    where
        T: Addressed,
    {
        let mut map = self.entries.write().unwrap();
        for entity in entities {
            let key = match Address::parse(entity.address()) {
                Ok(parsed) => parsed.node_key(),
                Err(err) => {
                    warn!(address = entity.address(), %err, "directory import dropped entry");
                    continue;
                }
            };
            map.insert(key, entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
    }

    fn item(name: &str) -> Item {
        Item {
            name: name.to_string(),
        }
    }

    fn new_directory() -> DomainDirectory<Item> {
        DomainDirectory::new(Arc::new(|_| None))
    }

    #[test]
    fn test_update_and_get_with_qualifier_variants() {
        let directory = new_directory();
        directory.update("domain/pub/node", item("Hello"));

        assert!(directory.get_by_address("domain/pub/node").is_some());
        assert!(directory.get_by_address("domain/pub/node/$set").is_some());
        assert!(directory.get_by_address("domain/pub/node/$node").is_some());

        // a qualified update overwrites the same slot
        directory.update("domain/pub/node/$node", item("Hello2"));
        assert_eq!(directory.len(), 1);
        assert_eq!(
            directory.get_by_address("domain/pub/node").unwrap().name,
            "Hello2"
        );
    }

    #[test]
    fn test_get_strict_component_match() {
        let directory = new_directory();
        directory.update("domain/pub/node", item("Hello"));
        directory.update("domain/pub/node2/type/instance/$input", item("World"));

        assert!(directory.get("domain/pub/node", "", "").is_some());
        assert!(directory.get("domain", "", "").is_none());
        assert!(directory
            .get("domain/pub/node2", "type", "instance")
            .is_some());
        assert!(directory
            .get("domain/pub/node2/type/instance", "not", "found")
            .is_none());
        // base alone does not resolve an entity stored with type/instance
        assert!(directory.get("domain/pub/node2", "", "").is_none());
    }

    #[test]
    fn test_get_by_address_prefix_is_segment_wise() {
        let directory = new_directory();
        directory.update("domain/pub/node", item("Hello"));
        directory.update("domain/pub/node2/type/instance/$input", item("World"));

        assert_eq!(directory.get_all().len(), 2);
        assert_eq!(directory.get_by_address_prefix("domain/pub/node2").len(), 1);
        // 'node' must not match 'node2'
        assert_eq!(directory.get_by_address_prefix("domain/pub/node").len(), 1);
        assert_eq!(directory.get_by_address_prefix("domain/pub").len(), 2);
        assert_eq!(directory.get_by_address_prefix("other").len(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let directory = new_directory();
        directory.update("domain/pub/node", item("Hello"));
        directory.remove("domain/pub/node");
        assert!(directory.get_by_address("domain/pub/node").is_none());
        // removing again is a no-op, not an error
        directory.remove("domain/pub/node");
        assert!(directory.is_empty());
    }

    #[test]
    fn test_update_count_tracks_changes() {
        let directory = new_directory();
        assert_eq!(directory.update_count(), 0);
        directory.update("domain/pub/node", item("Hello"));
        directory.update("domain/pub/node", item("Hello2"));
        assert_eq!(directory.update_count(), 2);
        directory.reset_update_count();
        assert_eq!(directory.update_count(), 0);
        // removing an unknown address does not count
        directory.remove("domain/pub/other");
        assert_eq!(directory.update_count(), 0);
        directory.remove("domain/pub/node");
        assert_eq!(directory.update_count(), 1);
    }

    #[test]
    fn test_malformed_addresses_are_best_effort() {
        let directory = new_directory();
        directory.update("tooshort", item("Hello"));
        assert!(directory.is_empty());
        assert!(directory.get_by_address("tooshort").is_none());
        assert_eq!(directory.get_by_address_prefix("tooshort").len(), 0);
    }

    #[test]
    fn test_concurrent_update_and_get() {
        let directory = Arc::new(new_directory());
        let mut handles = Vec::new();
        for t in 0..4 {
            let dir = directory.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let address = format!("domain/pub/node{}", t);
                    dir.update(&address, Item { name: format!("{}", i) });
                    assert!(dir.get_by_address(&address).is_some());
                    let _ = dir.get_all();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(directory.len(), 4);
        // updates from the same thread are observed in issue order
        assert_eq!(directory.get_by_address("domain/pub/node0").unwrap().name, "99");
    }
}
