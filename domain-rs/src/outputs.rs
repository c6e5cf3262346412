//! Output stores: discovered domain outputs and values, and this
//! publisher's registered outputs and their latest values

use crate::address::{
    make_io_address, Address, MSG_TYPE_LATEST, MSG_TYPE_OUTPUT_DISCOVERY,
};
use crate::directory::DomainDirectory;
use crate::messaging::MessageSigner;
use crate::types::{OutputDiscoveryMessage, OutputLatestMessage};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// Directory of outputs discovered from the domain
pub struct DomainOutputs {
    directory: Arc<DomainDirectory<OutputDiscoveryMessage>>,
    signer: Arc<MessageSigner>,
    domain: String,
}

impl DomainOutputs {
    pub fn new(domain: &str, signer: Arc<MessageSigner>) -> Self {
        DomainOutputs {
            directory: Arc::new(DomainDirectory::new(signer.resolver())),
            signer,
            domain: domain.to_string(),
        }
    }

    fn address_pattern(&self) -> String {
        format!("{}/+/+/+/+/{}", self.domain, MSG_TYPE_OUTPUT_DISCOVERY)
    }

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

    pub fn get_output_by_address(&self, address: &str) -> Option<OutputDiscoveryMessage> {
        self.directory.get_by_address(address)
    }

    /// All discovered outputs of a node, by node address prefix
    pub fn get_node_outputs(&self, node_address: &str) -> Vec<OutputDiscoveryMessage> {
        match Address::parse(node_address) {
            Ok(parsed) => self.directory.get_by_address_prefix(&parsed.node_key()),
            Err(_) => Vec::new(),
        }
    }

    pub fn get_all(&self) -> Vec<OutputDiscoveryMessage> {
        self.directory.get_all()
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

/// Directory of latest output values discovered from the domain
pub struct DomainOutputValues {
    directory: Arc<DomainDirectory<OutputLatestMessage>>,
    signer: Arc<MessageSigner>,
    domain: String,
}

impl DomainOutputValues {
    pub fn new(domain: &str, signer: Arc<MessageSigner>) -> Self {
        DomainOutputValues {
            directory: Arc::new(DomainDirectory::new(signer.resolver())),
            signer,
            domain: domain.to_string(),
        }
    }

    fn address_pattern(&self) -> String {
        format!("{}/+/+/+/+/{}", self.domain, MSG_TYPE_LATEST)
    }

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

    pub fn get_value_by_address(&self, address: &str) -> Option<OutputLatestMessage> {
        self.directory.get_by_address(address)
    }

    pub fn get_all(&self) -> Vec<OutputLatestMessage> {
        self.directory.get_all()
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

/// Outputs registered and published by this publisher
pub struct RegisteredOutputs {
    domain: String,
    publisher_id: String,
    outputs: RwLock<HashMap<String, OutputDiscoveryMessage>>,
    updated: Mutex<HashSet<String>>,
}

impl RegisteredOutputs {
    pub fn new(domain: &str, publisher_id: &str) -> Self {
        RegisteredOutputs {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            outputs: RwLock::new(HashMap::new()),
            updated: Mutex::new(HashSet::new()),
        }
    }

    fn output_key(node_hw_id: &str, output_type: &str, instance: &str) -> String {
        format!("{}/{}/{}", node_hw_id, output_type, instance)
    }

    /// Register an output of a node
    pub fn create_output(
        &self,
        node_id: &str,
        node_hw_id: &str,
        output_type: &str,
        instance: &str,
        unit: &str,
    ) -> OutputDiscoveryMessage {
        let key = Self::output_key(node_hw_id, output_type, instance);
        let output = OutputDiscoveryMessage {
            address: make_io_address(
                &self.domain,
                &self.publisher_id,
                node_id,
                output_type,
                instance,
                MSG_TYPE_OUTPUT_DISCOVERY,
            ),
            datatype: String::new(),
            output_type: output_type.to_string(),
            instance: instance.to_string(),
            node_hw_id: node_hw_id.to_string(),
            publisher_id: self.publisher_id.clone(),
            unit: unit.to_string(),
            timestamp: Utc::now(),
        };
        self.outputs
            .write()
            .unwrap()
            .insert(key.clone(), output.clone());
        self.updated.lock().unwrap().insert(key);
        output
    }

    pub fn get_output(
        &self,
        node_hw_id: &str,
        output_type: &str,
        instance: &str,
    ) -> Option<OutputDiscoveryMessage> {
        let key = Self::output_key(node_hw_id, output_type, instance);
        self.outputs.read().unwrap().get(&key).cloned()
    }

    pub fn get_all(&self) -> Vec<OutputDiscoveryMessage> {
        self.outputs.read().unwrap().values().cloned().collect()
    }

    /// Outputs pending publication; clears the pending set
    pub fn take_updated_outputs(&self) -> Vec<OutputDiscoveryMessage> {
        let keys: Vec<String> = self.updated.lock().unwrap().drain().collect();
        let outputs = self.outputs.read().unwrap();
        keys.iter().filter_map(|key| outputs.get(key).cloned()).collect()
    }

    /// Re-address all outputs of a node after its node ID changed
    pub fn set_node_id(&self, node_hw_id: &str, new_node_id: &str) {
        let mut outputs = self.outputs.write().unwrap();
        let mut renamed = Vec::new();
        for (key, output) in outputs.iter_mut() {
            if output.node_hw_id == node_hw_id {
                output.address = make_io_address(
                    &self.domain,
                    &self.publisher_id,
                    new_node_id,
                    &output.output_type,
                    &output.instance,
                    MSG_TYPE_OUTPUT_DISCOVERY,
                );
                output.timestamp = Utc::now();
                renamed.push(key.clone());
            }
        }
        drop(outputs);
        self.updated.lock().unwrap().extend(renamed);
    }
}

/// Latest values of this publisher's registered outputs, published on the
/// output's `$latest` address
pub struct RegisteredOutputValues {
    domain: String,
    publisher_id: String,
    values: RwLock<HashMap<String, OutputLatestMessage>>,
    updated: Mutex<HashSet<String>>,
}

impl RegisteredOutputValues {
    pub fn new(domain: &str, publisher_id: &str) -> Self {
        RegisteredOutputValues {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            values: RwLock::new(HashMap::new()),
            updated: Mutex::new(HashSet::new()),
        }
    }

    /// Record a new value for an output. Marks the value pending publication
    /// only when it differs from the previous one.
    pub fn update_output_value(
        &self,
        node_id: &str,
        output_type: &str,
        instance: &str,
        value: &str,
    ) {
        let address = make_io_address(
            &self.domain,
            &self.publisher_id,
            node_id,
            output_type,
            instance,
            MSG_TYPE_LATEST,
        );
        let key = match Address::parse(&address) {
            Ok(parsed) => parsed.node_key(),
            Err(_) => return,
        };

        let mut values = self.values.write().unwrap();
        let changed = values
            .get(&key)
            .map(|previous| previous.value != value)
            .unwrap_or(true);
        values.insert(
            key.clone(),
            OutputLatestMessage {
                address,
                unit: String::new(),
                value: value.to_string(),
                timestamp: Utc::now(),
            },
        );
        drop(values);
        if changed {
            self.updated.lock().unwrap().insert(key);
        }
    }

    pub fn get_value_by_address(&self, address: &str) -> Option<OutputLatestMessage> {
        let key = Address::parse(address).ok()?.node_key();
        self.values.read().unwrap().get(&key).cloned()
    }

    pub fn get_all(&self) -> Vec<OutputLatestMessage> {
        self.values.read().unwrap().values().cloned().collect()
    }

    /// Values pending publication; clears the pending set
    pub fn take_updated_values(&self) -> Vec<OutputLatestMessage> {
        let keys: Vec<String> = self.updated.lock().unwrap().drain().collect();
        let values = self.values.read().unwrap();
        keys.iter().filter_map(|key| values.get(key).cloned()).collect()
    }
}
