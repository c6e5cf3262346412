//! Input stores and input value receivers
//!
//! Registered inputs carry a set handler that fires when a value arrives,
//! whether from a verified `$set` command on the bus, an HTTP poll, or a
//! watched file. Discovered domain inputs live in their own directory.

use crate::address::{
    make_io_address, Address, MSG_TYPE_INPUT_DISCOVERY, MSG_TYPE_LATEST, MSG_TYPE_SET_INPUT,
};
use crate::directory::DomainDirectory;
use crate::errors::{DomainError, Result};
use crate::messaging::MessageSigner;
use crate::types::{InputDiscoveryMessage, OutputLatestMessage, SetInputMessage};
use chrono::Utc;
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Invoked with the input and the received raw value when a new value
/// arrives for a registered input
pub type InputSetHandler = Arc<dyn Fn(&InputDiscoveryMessage, &str) + Send + Sync>;

/// Directory of inputs discovered from the domain
pub struct DomainInputs {
    directory: Arc<DomainDirectory<InputDiscoveryMessage>>,
    signer: Arc<MessageSigner>,
    domain: String,
}

impl DomainInputs {
    pub fn new(domain: &str, signer: Arc<MessageSigner>) -> Self {
        DomainInputs {
            directory: Arc::new(DomainDirectory::new(signer.resolver())),
            signer,
            domain: domain.to_string(),
        }
    }

    fn address_pattern(&self) -> String {
        format!("{}/+/+/+/+/{}", self.domain, MSG_TYPE_INPUT_DISCOVERY)
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

    pub fn get_input_by_address(&self, address: &str) -> Option<InputDiscoveryMessage> {
        self.directory.get_by_address(address)
    }

    /// All discovered inputs of a node, by node address prefix
    pub fn get_node_inputs(&self, node_address: &str) -> Vec<InputDiscoveryMessage> {
        match Address::parse(node_address) {
            Ok(parsed) => self.directory.get_by_address_prefix(&parsed.node_key()),
            Err(_) => Vec::new(),
        }
    }

    pub fn get_all(&self) -> Vec<InputDiscoveryMessage> {
        self.directory.get_all()
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

/// Inputs registered and published by this publisher
pub struct RegisteredInputs {
    domain: String,
    publisher_id: String,
    inputs: RwLock<HashMap<String, InputDiscoveryMessage>>,
    handlers: RwLock<HashMap<String, InputSetHandler>>,
    updated: Mutex<HashSet<String>>,
}

impl RegisteredInputs {
    pub fn new(domain: &str, publisher_id: &str) -> Self {
        RegisteredInputs {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            inputs: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            updated: Mutex::new(HashSet::new()),
        }
    }

    fn input_key(node_hw_id: &str, input_type: &str, instance: &str) -> String {
        format!("{}/{}/{}", node_hw_id, input_type, instance)
    }

    /// Register an input of a node. `source` is empty for command-only
    /// inputs, an http(s) URL for polled inputs, or a file path for watched
    /// inputs. The handler fires on every received value.
    pub fn create_input(
        &self,
        node_id: &str,
        node_hw_id: &str,
        input_type: &str,
        instance: &str,
        source: &str,
        handler: InputSetHandler,
    ) -> InputDiscoveryMessage {
        let key = Self::input_key(node_hw_id, input_type, instance);
        let input = InputDiscoveryMessage {
            address: make_io_address(
                &self.domain,
                &self.publisher_id,
                node_id,
                input_type,
                instance,
                MSG_TYPE_INPUT_DISCOVERY,
            ),
            datatype: String::new(),
            input_type: input_type.to_string(),
            instance: instance.to_string(),
            node_hw_id: node_hw_id.to_string(),
            publisher_id: self.publisher_id.clone(),
            source: source.to_string(),
            unit: String::new(),
            timestamp: Utc::now(),
        };
        self.inputs
            .write()
            .unwrap()
            .insert(key.clone(), input.clone());
        self.handlers.write().unwrap().insert(key.clone(), handler);
        self.updated.lock().unwrap().insert(key);
        input
    }

    pub fn get_input(
        &self,
        node_hw_id: &str,
        input_type: &str,
        instance: &str,
    ) -> Option<InputDiscoveryMessage> {
        let key = Self::input_key(node_hw_id, input_type, instance);
        self.inputs.read().unwrap().get(&key).cloned()
    }

    /// Find a registered input by any qualifier variant of its address
    pub fn get_input_by_address(&self, address: &str) -> Option<InputDiscoveryMessage> {
        let key = Address::parse(address).ok()?.node_key();
        self.inputs
            .read()
            .unwrap()
            .values()
            .find(|input| {
                Address::parse(&input.address)
                    .map(|a| a.node_key() == key)
                    .unwrap_or(false)
            })
            .cloned()
    }

    pub fn get_all(&self) -> Vec<InputDiscoveryMessage> {
        self.inputs.read().unwrap().values().cloned().collect()
    }

    /// Inputs pending publication; clears the pending set
    pub fn take_updated_inputs(&self) -> Vec<InputDiscoveryMessage> {
        let keys: Vec<String> = self.updated.lock().unwrap().drain().collect();
        let inputs = self.inputs.read().unwrap();
        keys.iter().filter_map(|key| inputs.get(key).cloned()).collect()
    }

    /// Re-address all inputs of a node after its node ID changed
    pub fn set_node_id(&self, node_hw_id: &str, new_node_id: &str) {
        let mut inputs = self.inputs.write().unwrap();
        let mut renamed = Vec::new();
        for (key, input) in inputs.iter_mut() {
            if input.node_hw_id == node_hw_id {
                input.address = make_io_address(
                    &self.domain,
                    &self.publisher_id,
                    new_node_id,
                    &input.input_type,
                    &input.instance,
                    MSG_TYPE_INPUT_DISCOVERY,
                );
                input.timestamp = Utc::now();
                renamed.push(key.clone());
            }
        }
        drop(inputs);
        self.updated.lock().unwrap().extend(renamed);
    }

    /// Deliver a value to the input registered under the given address.
    /// Returns false when no such input exists.
    pub fn notify_input_value(&self, address: &str, value: &str) -> bool {
        let Some(input) = self.get_input_by_address(address) else {
            return false;
        };
        let key = Self::input_key(&input.node_hw_id, &input.input_type, &input.instance);
        let handler = self.handlers.read().unwrap().get(&key).cloned();
        if let Some(handler) = handler {
            handler(&input, value);
        }
        true
    }
}

/// Listener for verified `$set` commands addressed to this publisher's inputs
pub struct ReceiveFromSetCommands {
    domain: String,
    publisher_id: String,
    signer: Arc<MessageSigner>,
    registered_inputs: Arc<RegisteredInputs>,
}

impl ReceiveFromSetCommands {
    pub fn new(
        domain: &str,
        publisher_id: &str,
        signer: Arc<MessageSigner>,
        registered_inputs: Arc<RegisteredInputs>,
    ) -> Arc<Self> {
        Arc::new(ReceiveFromSetCommands {
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            signer,
            registered_inputs,
        })
    }

    fn address_pattern(&self) -> String {
        format!(
            "{}/{}/+/+/+/{}",
            self.domain, self.publisher_id, MSG_TYPE_SET_INPUT
        )
    }

    pub fn start(self: &Arc<Self>) {
        let receiver = Arc::downgrade(self);
        self.signer.subscribe(
            &self.address_pattern(),
            Arc::new(move |address, message| match receiver.upgrade() {
                Some(receiver) => receiver.receive_set_command(address, message),
                None => Ok(()),
            }),
        );
    }

    pub fn stop(&self) {
        self.signer.unsubscribe(&self.address_pattern());
    }

    fn receive_set_command(&self, address: &str, message: &str) -> Result<()> {
        // commands arrive on this publisher's address but are signed by the
        // sender named in the payload
        let payload = self.signer.verify_signed_command(address, message)?;
        let command: SetInputMessage =
            serde_json::from_str(&payload).map_err(|e| DomainError::Decode(e.to_string()))?;
        if !self.registered_inputs.notify_input_value(address, &command.value) {
            debug!(address, "set command for unknown input ignored");
        }
        Ok(())
    }
}

/// Subscribes registered inputs to `$latest` output publications of other
/// domain publishers. An input whose source is an output address receives
/// that output's value on every publication.
pub struct ReceiveFromOutputs {
    domain: String,
    signer: Arc<MessageSigner>,
    registered_inputs: Arc<RegisteredInputs>,
}

impl ReceiveFromOutputs {
    pub fn new(
        domain: &str,
        signer: Arc<MessageSigner>,
        registered_inputs: Arc<RegisteredInputs>,
    ) -> Arc<Self> {
        Arc::new(ReceiveFromOutputs {
            domain: domain.to_string(),
            signer,
            registered_inputs,
        })
    }

    fn address_pattern(&self) -> String {
        format!("{}/+/+/+/+/{}", self.domain, MSG_TYPE_LATEST)
    }

    pub fn start(self: &Arc<Self>) {
        let receiver = Arc::downgrade(self);
        self.signer.subscribe(
            &self.address_pattern(),
            Arc::new(move |address, message| match receiver.upgrade() {
                Some(receiver) => receiver.receive_output_value(address, message),
                None => Ok(()),
            }),
        );
    }

    pub fn stop(&self) {
        self.signer.unsubscribe(&self.address_pattern());
    }

    fn receive_output_value(&self, address: &str, message: &str) -> Result<()> {
        // $latest is published by the output's own publisher on its own
        // address, so the address names the signer
        let payload = self.signer.verify_signed_message(address, message)?;
        let latest: OutputLatestMessage =
            serde_json::from_str(&payload).map_err(|e| DomainError::Decode(e.to_string()))?;
        let output_key = Address::parse(address)?.node_key();

        for input in self.registered_inputs.get_all() {
            let matches = Address::parse(&input.source)
                .map(|source| source.node_key() == output_key)
                .unwrap_or(false);
            if matches {
                self.registered_inputs
                    .notify_input_value(&input.address, &latest.value);
            }
        }
        Ok(())
    }
}

/// Polls registered inputs with an http(s) source. Intended to be driven
/// from the publisher's poll handler.
pub struct ReceiveFromHTTP {
    registered_inputs: Arc<RegisteredInputs>,
    client: reqwest::blocking::Client,
}

impl ReceiveFromHTTP {
    pub fn new(registered_inputs: Arc<RegisteredInputs>) -> Self {
        ReceiveFromHTTP {
            registered_inputs,
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Fetch every http(s)-sourced input once and deliver the response body
    /// as its value. Failures are logged and skipped; one bad endpoint must
    /// not starve the others.
    pub fn poll_once(&self) {
        for input in self.registered_inputs.get_all() {
            if !input.source.starts_with("http://") && !input.source.starts_with("https://") {
                continue;
            }
            match self.fetch(&input.source) {
                Ok(body) => {
                    self.registered_inputs.notify_input_value(&input.address, &body);
                }
                Err(err) => {
                    warn!(address = %input.address, source = %input.source, %err, "http input poll failed");
                }
            }
        }
    }

    fn fetch(&self, source: &str) -> std::result::Result<String, reqwest::Error> {
        self.client
            .get(source)
            .send()?
            .error_for_status()?
            .text()
    }
}

/// Watches registered inputs with a file source and delivers the file
/// contents as the input value on every change.
pub struct ReceiveFromFiles {
    registered_inputs: Arc<RegisteredInputs>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReceiveFromFiles {
    pub fn new(registered_inputs: Arc<RegisteredInputs>) -> Self {
        ReceiveFromFiles {
            registered_inputs,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Start watching the file sources of currently registered inputs
    pub fn start(&self) -> Result<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher = RecommendedWatcher::new(tx, NotifyConfig::default())
            .map_err(|e| DomainError::Config(format!("file watcher: {}", e)))?;

        let mut watched = 0;
        for input in self.registered_inputs.get_all() {
            let source = &input.source;
            if source.is_empty() || source.starts_with("http://") || source.starts_with("https://")
            {
                continue;
            }
            if let Err(err) = watcher.watch(Path::new(source), RecursiveMode::NonRecursive) {
                warn!(source = %source, %err, "cannot watch input file");
                continue;
            }
            watched += 1;
        }
        if watched == 0 {
            return Ok(());
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let shutdown = self.shutdown.clone();
        let registered_inputs = self.registered_inputs.clone();
        let handle = std::thread::spawn(move || {
            // watcher must live on this thread for the channel to stay open
            let _watcher = watcher;
            loop {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                match rx.recv_timeout(Duration::from_millis(1000)) {
                    Ok(Ok(event)) => {
                        for path in &event.paths {
                            let source = path.to_string_lossy();
                            let Some(input) = registered_inputs
                                .get_all()
                                .into_iter()
                                .find(|i| i.source == source)
                            else {
                                continue;
                            };
                            match fs::read_to_string(path) {
                                Ok(content) => {
                                    registered_inputs
                                        .notify_input_value(&input.address, content.trim_end());
                                }
                                Err(err) => {
                                    warn!(source = %source, %err, "cannot read input file");
                                }
                            }
                        }
                    }
                    Ok(Err(err)) => warn!(%err, "input file watcher error"),
                    Err(_) => {} // timeout, check shutdown again
                }
            }
        });
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Stop watching; blocks until the watcher thread has exited
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}
