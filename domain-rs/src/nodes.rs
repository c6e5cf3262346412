//! Node stores: discovered domain nodes and this publisher's registered nodes
//!
//! Registered nodes are keyed by their immutable hardware ID; the node ID
//! used in addresses starts out equal to the hardware ID and can be changed
//! with a `$setNodeId` command without losing the node's configuration.

use crate::address::{
    make_node_discovery_address, Address, MSG_TYPE_CONFIGURE, MSG_TYPE_NODE_DISCOVERY,
    MSG_TYPE_SET_NODE_ID,
};
use crate::directory::DomainDirectory;
use crate::errors::Result;
use crate::messaging::MessageSigner;
use crate::persist;
use crate::types::{ConfigAttr, NodeConfigureMessage, NodeDiscoveryMessage, SetNodeIDMessage};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Invoked before a received `$configure` command is applied to a registered
/// node. Returns the attributes that should actually be applied; an empty
/// map applies nothing.
pub type NodeConfigureHandler =
    Arc<dyn Fn(&NodeDiscoveryMessage, HashMap<String, String>) -> HashMap<String, String> + Send + Sync>;

/// Invoked when a `$setNodeId` command was received and verified
pub type SetNodeIDHandler = Arc<dyn Fn(&str, &SetNodeIDMessage) + Send + Sync>;

/// Directory of nodes discovered from the domain
pub struct DomainNodes {
    directory: Arc<DomainDirectory<NodeDiscoveryMessage>>,
    signer: Arc<MessageSigner>,
    domain: String,
}

impl DomainNodes {
    pub fn new(domain: &str, signer: Arc<MessageSigner>) -> Self {
        DomainNodes {
            directory: Arc::new(DomainDirectory::new(signer.resolver())),
            signer,
            domain: domain.to_string(),
        }
    }

    fn address_pattern(&self) -> String {
        format!("{}/+/+/{}", self.domain, MSG_TYPE_NODE_DISCOVERY)
    }

    /// Subscribe to node discovery publications of all domain publishers
    pub fn subscribe(&self) {
        let directory = Arc::downgrade(&self.directory);
        self.signer.subscribe(
            &self.address_pattern(),
            Arc::new(move |address, message| match directory.upgrade() {
                Some(directory) => directory.handle_discovery(address, message),
                None => Ok(()),
            }),
        );
    }

    pub fn unsubscribe(&self) {
        self.signer.unsubscribe(&self.address_pattern());
    }

    pub fn get_node_by_address(&self, address: &str) -> Option<NodeDiscoveryMessage> {
        self.directory.get_by_address(address)
    }

    /// All discovered nodes of one publisher
    pub fn get_publisher_nodes(&self, publisher_id: &str) -> Vec<NodeDiscoveryMessage> {
        self.directory
            .get_by_address_prefix(&format!("{}/{}", self.domain, publisher_id))
    }

    pub fn get_all(&self) -> Vec<NodeDiscoveryMessage> {
        self.directory.get_all()
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    pub fn update_count(&self) -> usize {
        self.directory.update_count()
    }

    pub fn load_nodes(&self, path: &Path) -> Result<()> {
        let nodes: Vec<NodeDiscoveryMessage> = persist::load_entities(path)?;
        self.directory.import(nodes);
        Ok(())
    }

    pub fn save_nodes(&self, path: &Path) -> Result<()> {
        persist::save_entities(path, &self.directory.get_all())?;
        self.directory.reset_update_count();
        Ok(())
    }
}

/// Nodes registered and published by this publisher, keyed by hardware ID
pub struct RegisteredNodes {
    domain: String,
    publisher_id: String,
    nodes: RwLock<HashMap<String, NodeDiscoveryMessage>>,
    /// Hardware IDs with changes pending publication
    updated: Mutex<HashSet<String>>,
}

impl RegisteredNodes {
    pub fn new(domain: &str, publisher_id: &str) -> Self {
        RegisteredNodes {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            nodes: RwLock::new(HashMap::new()),
            updated: Mutex::new(HashSet::new()),
        }
    }

    /// Register a node. Returns the existing node unchanged when the
    /// hardware ID is already known.
    pub fn create_node(&self, hw_id: &str, node_type: &str) -> NodeDiscoveryMessage {
        if let Some(existing) = self.get_node_by_hw_id(hw_id) {
            return existing;
        }
        let node = NodeDiscoveryMessage {
            address: make_node_discovery_address(&self.domain, &self.publisher_id, hw_id),
            hw_id: hw_id.to_string(),
            node_id: hw_id.to_string(),
            publisher_id: self.publisher_id.clone(),
            node_type: node_type.to_string(),
            attr: HashMap::new(),
            config: HashMap::new(),
            status: HashMap::new(),
            timestamp: Utc::now(),
        };
        self.nodes
            .write()
            .unwrap()
            .insert(hw_id.to_string(), node.clone());
        self.mark_updated(hw_id);
        node
    }

    /// Replace a node snapshot. The update path for callers that mutated a
    /// copy obtained from a getter.
    pub fn update_node(&self, node: &NodeDiscoveryMessage) {
        self.nodes
            .write()
            .unwrap()
            .insert(node.hw_id.clone(), node.clone());
        self.mark_updated(&node.hw_id);
    }

    /// Update attribute values of a registered node
    pub fn set_node_attr(&self, hw_id: &str, attr: HashMap<String, String>) -> bool {
        let mut nodes = self.nodes.write().unwrap();
        let Some(node) = nodes.get_mut(hw_id) else {
            return false;
        };
        node.attr.extend(attr);
        node.timestamp = Utc::now();
        drop(nodes);
        self.mark_updated(hw_id);
        true
    }

    /// Update status values of a registered node
    pub fn set_node_status(&self, hw_id: &str, status: HashMap<String, String>) -> bool {
        let mut nodes = self.nodes.write().unwrap();
        let Some(node) = nodes.get_mut(hw_id) else {
            return false;
        };
        node.status.extend(status);
        node.timestamp = Utc::now();
        drop(nodes);
        self.mark_updated(hw_id);
        true
    }

    /// Register a configurable attribute of a node
    pub fn set_node_config(&self, hw_id: &str, name: &str, config: ConfigAttr) -> bool {
        let mut nodes = self.nodes.write().unwrap();
        let Some(node) = nodes.get_mut(hw_id) else {
            return false;
        };
        node.config.insert(name.to_string(), config);
        node.timestamp = Utc::now();
        drop(nodes);
        self.mark_updated(hw_id);
        true
    }

    /// Change the addressing ID of a node; its address is rebuilt from the
    /// new ID. The hardware ID key stays the same.
    pub fn set_node_id(&self, hw_id: &str, new_node_id: &str) -> bool {
        let mut nodes = self.nodes.write().unwrap();
        let Some(node) = nodes.get_mut(hw_id) else {
            return false;
        };
        info!(hw_id, new_node_id, "renaming registered node");
        node.node_id = new_node_id.to_string();
        node.address =
            make_node_discovery_address(&self.domain, &self.publisher_id, new_node_id);
        node.timestamp = Utc::now();
        drop(nodes);
        self.mark_updated(hw_id);
        true
    }

    pub fn get_node_by_hw_id(&self, hw_id: &str) -> Option<NodeDiscoveryMessage> {
        self.nodes.read().unwrap().get(hw_id).cloned()
    }

    /// Find a registered node by any qualifier variant of its address
    pub fn get_node_by_address(&self, address: &str) -> Option<NodeDiscoveryMessage> {
        let key = Address::parse(address).ok()?.node_key();
        self.nodes
            .read()
            .unwrap()
            .values()
            .find(|node| {
                Address::parse(&node.address)
                    .map(|a| a.node_key() == key)
                    .unwrap_or(false)
            })
            .cloned()
    }

    pub fn get_all(&self) -> Vec<NodeDiscoveryMessage> {
        self.nodes.read().unwrap().values().cloned().collect()
    }

    /// Nodes with changes pending publication; clears the pending set
    pub fn take_updated_nodes(&self) -> Vec<NodeDiscoveryMessage> {
        let hw_ids: Vec<String> = self.updated.lock().unwrap().drain().collect();
        let nodes = self.nodes.read().unwrap();
        hw_ids
            .iter()
            .filter_map(|hw_id| nodes.get(hw_id).cloned())
            .collect()
    }

    pub fn load_nodes(&self, path: &Path) -> Result<()> {
        let loaded: Vec<NodeDiscoveryMessage> = persist::load_entities(path)?;
        let mut nodes = self.nodes.write().unwrap();
        for node in loaded {
            nodes.insert(node.hw_id.clone(), node);
        }
        Ok(())
    }

    pub fn save_nodes(&self, path: &Path) -> Result<()> {
        persist::save_entities(path, &self.get_all())
    }

    fn mark_updated(&self, hw_id: &str) {
        self.updated.lock().unwrap().insert(hw_id.to_string());
    }
}

/// Listener for `$configure` commands addressed to this publisher's nodes
pub struct ReceiveNodeConfigure {
    domain: String,
    publisher_id: String,
    registered_nodes: Arc<RegisteredNodes>,
    signer: Arc<MessageSigner>,
    handler: Mutex<Option<NodeConfigureHandler>>,
}

impl ReceiveNodeConfigure {
    pub fn new(
        domain: &str,
        publisher_id: &str,
        registered_nodes: Arc<RegisteredNodes>,
        signer: Arc<MessageSigner>,
    ) -> Arc<Self> {
        Arc::new(ReceiveNodeConfigure {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            registered_nodes,
            signer,
            handler: Mutex::new(None),
        })
    }

    /// Set the handler invoked before configuration is applied
    pub fn set_configure_node_handler(&self, handler: NodeConfigureHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn address_pattern(&self) -> String {
        format!("{}/{}/+/{}", self.domain, self.publisher_id, MSG_TYPE_CONFIGURE)
    }

    pub fn start(self: &Arc<Self>) {
        let receiver = Arc::downgrade(self);
        self.signer.subscribe(
            &self.address_pattern(),
            Arc::new(move |address, message| match receiver.upgrade() {
                Some(receiver) => receiver.receive_configure(address, message),
                None => Ok(()),
            }),
        );
    }

    pub fn stop(&self) {
        self.signer.unsubscribe(&self.address_pattern());
    }

    fn receive_configure(&self, address: &str, message: &str) -> Result<()> {
        // signed by the sender named in the payload, not by this publisher
        let payload = self.signer.verify_signed_command(address, message)?;
        let configure: NodeConfigureMessage = serde_json::from_str(&payload)
            .map_err(|e| crate::errors::DomainError::Decode(e.to_string()))?;

        let Some(node) = self.registered_nodes.get_node_by_address(address) else {
            debug!(address, "configure for unknown node ignored");
            return Ok(());
        };

        let attr = match self.handler.lock().unwrap().clone() {
            Some(handler) => handler(&node, configure.attr),
            None => configure.attr,
        };
        if !attr.is_empty() {
            self.registered_nodes.set_node_attr(&node.hw_id, attr);
        }
        Ok(())
    }
}

/// Listener for `$setNodeId` commands addressed to this publisher's nodes
pub struct ReceiveSetNodeID {
    domain: String,
    publisher_id: String,
    signer: Arc<MessageSigner>,
    handler: Mutex<Option<SetNodeIDHandler>>,
}

impl ReceiveSetNodeID {
    pub fn new(domain: &str, publisher_id: &str, signer: Arc<MessageSigner>) -> Arc<Self> {
        Arc::new(ReceiveSetNodeID {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            signer,
            handler: Mutex::new(None),
        })
    }

    pub fn set_node_id_handler(&self, handler: SetNodeIDHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn address_pattern(&self) -> String {
        format!("{}/{}/+/{}", self.domain, self.publisher_id, MSG_TYPE_SET_NODE_ID)
    }

    pub fn start(self: &Arc<Self>) {
        let receiver = Arc::downgrade(self);
        self.signer.subscribe(
            &self.address_pattern(),
            Arc::new(move |address, message| match receiver.upgrade() {
                Some(receiver) => receiver.receive_set_node_id(address, message),
                None => Ok(()),
            }),
        );
    }

    pub fn stop(&self) {
        self.signer.unsubscribe(&self.address_pattern());
    }

    fn receive_set_node_id(&self, address: &str, message: &str) -> Result<()> {
        let payload = self.signer.verify_signed_command(address, message)?;
        let command: SetNodeIDMessage = serde_json::from_str(&payload)
            .map_err(|e| crate::errors::DomainError::Decode(e.to_string()))?;
        if let Some(handler) = self.handler.lock().unwrap().clone() {
            handler(address, &command);
        }
        Ok(())
    }
}
