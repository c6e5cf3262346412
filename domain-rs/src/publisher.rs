//! Publisher runtime
//!
//! Owns one directory per discovered entity kind, the registered entity
//! stores, and the heartbeat loop that publishes pending updates, persists
//! dirty directories and drives value polling. All public functions are
//! safe to call from multiple threads; the running flag and the loop
//! lifecycle signals live behind one mutex, each directory behind its own.

use crate::address::make_status_address;
use crate::errors::{DomainError, Result};
use crate::identities::{
    DomainPublisherIdentities, ReceivePublisherIdentities, RegisteredIdentity,
};
use crate::inputs::{
    DomainInputs, ReceiveFromFiles, ReceiveFromHTTP, ReceiveFromOutputs, ReceiveFromSetCommands,
    RegisteredInputs,
};
use crate::messaging::{MessageSigner, Messenger};
use crate::nodes::{
    DomainNodes, NodeConfigureHandler, ReceiveNodeConfigure, ReceiveSetNodeID, RegisteredNodes,
};
use crate::outputs::{
    DomainOutputValues, DomainOutputs, RegisteredOutputValues, RegisteredOutputs,
};
use crate::persist::{
    DOMAIN_NODES_FILE_SUFFIX, DOMAIN_PUBLISHERS_FILE_SUFFIX, REGISTERED_IDENTITY_FILE_SUFFIX,
    REGISTERED_NODES_FILE_SUFFIX,
};
use crate::types::{Addressed, PublisherRunState, PublisherStatusMessage, LOCAL_ZONE_ID};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default interval in heartbeat ticks between poll handler invocations
pub const DEFAULT_POLL_INTERVAL: usize = 600;
/// Default folder for the saved identity and registered node configuration
pub const DEFAULT_CONFIG_FOLDER: &str = "config";
/// Default folder for cached discovered publishers and nodes
pub const DEFAULT_CACHE_FOLDER: &str = "cache";

/// Handler performing value polling, invoked from the heartbeat loop once
/// per poll interval
pub type PollHandler = Arc<dyn Fn(&Publisher) + Send + Sync>;

/// Publisher behavior, read from the application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PublisherConfig {
    /// Load/save discovered publisher identities to the cache folder
    #[serde(rename = "cachePublishers", default)]
    pub save_discovered_publishers: bool,
    /// Load/save discovered nodes to the cache folder
    #[serde(rename = "cacheNodes", default)]
    pub save_discovered_nodes: bool,
    #[serde(rename = "cacheFolder", default)]
    pub cache_folder: String,
    /// Location of the saved identity and registered node configuration
    #[serde(rename = "configFolder", default)]
    pub config_folder: String,
    /// Domain this publisher belongs to. Default is "local".
    #[serde(default)]
    pub domain: String,
    #[serde(rename = "publisherId", default)]
    pub publisher_id: String,
    /// Log level for the application to pass to the logging setup:
    /// error, warn, info, debug
    #[serde(rename = "loglevel", default)]
    pub log_level: String,
    #[serde(rename = "logfile", default)]
    pub log_file: String,
    /// Disable node configuration over the bus
    #[serde(rename = "disableConfig", default)]
    pub disable_config: bool,
    /// Disable input commands over the bus
    #[serde(rename = "disableInput", default)]
    pub disable_input: bool,
    /// Disable listening for domain publisher identities
    #[serde(rename = "disablePublishers", default)]
    pub disable_publishers: bool,
}

impl PublisherConfig {
    /// Load the configuration from a yaml file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

struct RunState {
    is_running: bool,
    poll_countdown: usize,
    poll_interval: usize,
    poll_handler: Option<PollHandler>,
    /// Completion signal of the currently running loop, consumed by stop()
    stopped_rx: Option<mpsc::Receiver<()>>,
}

/// Operating state of this publisher. Cheap to clone: all state is shared.
#[derive(Clone)]
pub struct Publisher {
    config: Arc<PublisherConfig>,
    messenger: Arc<dyn Messenger>,
    signer: Arc<MessageSigner>,

    registered_identity: Arc<RegisteredIdentity>,
    domain_identities: Arc<DomainPublisherIdentities>,
    domain_nodes: Arc<DomainNodes>,
    domain_inputs: Arc<DomainInputs>,
    domain_outputs: Arc<DomainOutputs>,
    domain_output_values: Arc<DomainOutputValues>,

    registered_nodes: Arc<RegisteredNodes>,
    registered_inputs: Arc<RegisteredInputs>,
    registered_outputs: Arc<RegisteredOutputs>,
    registered_output_values: Arc<RegisteredOutputValues>,

    receive_domain_identities: Arc<ReceivePublisherIdentities>,
    receive_node_configure: Arc<ReceiveNodeConfigure>,
    receive_set_node_id: Arc<ReceiveSetNodeID>,
    receive_set_commands: Arc<ReceiveFromSetCommands>,
    input_from_outputs: Arc<ReceiveFromOutputs>,
    input_from_http: Arc<ReceiveFromHTTP>,
    input_from_files: Arc<ReceiveFromFiles>,

    state: Arc<Mutex<RunState>>,
}

impl Publisher {
    /// Create a publisher for the given configuration and message bus.
    ///
    /// Loads or creates the publisher identity from the config folder and
    /// the previously registered nodes, builds the signer and the domain
    /// directories. Does not touch process-wide logging; call
    /// [`crate::logging::init_logging`] from the application if wanted.
    pub fn new(config: &PublisherConfig, messenger: Arc<dyn Messenger>) -> Result<Publisher> {
        if config.publisher_id.is_empty() {
            return Err(DomainError::Config("publisher ID is required".to_string()));
        }
        let mut config = config.clone();
        if config.domain.is_empty() {
            config.domain = LOCAL_ZONE_ID.to_string();
        }
        if config.config_folder.is_empty() {
            config.config_folder = DEFAULT_CONFIG_FOLDER.to_string();
        }
        if config.cache_folder.is_empty() {
            config.cache_folder = DEFAULT_CACHE_FOLDER.to_string();
        }
        let domain = config.domain.as_str();
        let publisher_id = config.publisher_id.as_str();

        let identity_file = Path::new(&config.config_folder)
            .join(format!("{}{}", publisher_id, REGISTERED_IDENTITY_FILE_SUFFIX));
        let registered_identity = Arc::new(RegisteredIdentity::load_or_create(
            domain,
            publisher_id,
            &identity_file,
        )?);

        let domain_identities = DomainPublisherIdentities::new();
        let signer = Arc::new(MessageSigner::new(
            messenger.clone(),
            Some(registered_identity.signing_key()),
            domain_identities.resolver(),
        ));

        let registered_nodes = Arc::new(RegisteredNodes::new(domain, publisher_id));
        let registered_inputs = Arc::new(RegisteredInputs::new(domain, publisher_id));
        let registered_outputs = Arc::new(RegisteredOutputs::new(domain, publisher_id));
        let registered_output_values =
            Arc::new(RegisteredOutputValues::new(domain, publisher_id));

        let receive_set_node_id = ReceiveSetNodeID::new(domain, publisher_id, signer.clone());
        {
            let nodes = registered_nodes.clone();
            let inputs = registered_inputs.clone();
            let outputs = registered_outputs.clone();
            receive_set_node_id.set_node_id_handler(Arc::new(move |address, command| {
                let Some(node) = nodes.get_node_by_address(address) else {
                    return;
                };
                nodes.set_node_id(&node.hw_id, &command.node_id);
                inputs.set_node_id(&node.hw_id, &command.node_id);
                outputs.set_node_id(&node.hw_id, &command.node_id);
            }));
        }

        let publisher = Publisher {
            domain_nodes: Arc::new(DomainNodes::new(domain, signer.clone())),
            domain_inputs: Arc::new(DomainInputs::new(domain, signer.clone())),
            domain_outputs: Arc::new(DomainOutputs::new(domain, signer.clone())),
            domain_output_values: Arc::new(DomainOutputValues::new(domain, signer.clone())),
            receive_domain_identities: Arc::new(ReceivePublisherIdentities::new(
                domain,
                domain_identities.clone(),
                signer.clone(),
            )),
            receive_node_configure: ReceiveNodeConfigure::new(
                domain,
                publisher_id,
                registered_nodes.clone(),
                signer.clone(),
            ),
            receive_set_commands: ReceiveFromSetCommands::new(
                domain,
                publisher_id,
                signer.clone(),
                registered_inputs.clone(),
            ),
            input_from_outputs: ReceiveFromOutputs::new(
                domain,
                signer.clone(),
                registered_inputs.clone(),
            ),
            input_from_http: Arc::new(ReceiveFromHTTP::new(registered_inputs.clone())),
            input_from_files: Arc::new(ReceiveFromFiles::new(registered_inputs.clone())),
            receive_set_node_id,
            registered_identity,
            domain_identities,
            registered_nodes,
            registered_inputs,
            registered_outputs,
            registered_output_values,
            signer,
            messenger,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(RunState {
                is_running: false,
                poll_countdown: 0,
                poll_interval: DEFAULT_POLL_INTERVAL,
                poll_handler: None,
                stopped_rx: None,
            })),
        };

        // restore configuration of previously registered nodes
        if let Err(err) = publisher.load_registered_nodes() {
            debug!(%err, "no registered nodes restored");
        }
        Ok(publisher)
    }

    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    pub fn publisher_id(&self) -> &str {
        &self.config.publisher_id
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().is_running
    }

    pub fn signer(&self) -> &Arc<MessageSigner> {
        &self.signer
    }

    pub fn identity(&self) -> &Arc<RegisteredIdentity> {
        &self.registered_identity
    }

    pub fn domain_identities(&self) -> &Arc<DomainPublisherIdentities> {
        &self.domain_identities
    }

    pub fn domain_nodes(&self) -> &Arc<DomainNodes> {
        &self.domain_nodes
    }

    pub fn domain_inputs(&self) -> &Arc<DomainInputs> {
        &self.domain_inputs
    }

    pub fn domain_outputs(&self) -> &Arc<DomainOutputs> {
        &self.domain_outputs
    }

    pub fn domain_output_values(&self) -> &Arc<DomainOutputValues> {
        &self.domain_output_values
    }

    pub fn registered_nodes(&self) -> &Arc<RegisteredNodes> {
        &self.registered_nodes
    }

    pub fn registered_inputs(&self) -> &Arc<RegisteredInputs> {
        &self.registered_inputs
    }

    pub fn registered_outputs(&self) -> &Arc<RegisteredOutputs> {
        &self.registered_outputs
    }

    pub fn registered_output_values(&self) -> &Arc<RegisteredOutputValues> {
        &self.registered_output_values
    }

    pub fn receive_from_outputs(&self) -> &Arc<ReceiveFromOutputs> {
        &self.input_from_outputs
    }

    pub fn receive_from_http(&self) -> &Arc<ReceiveFromHTTP> {
        &self.input_from_http
    }

    pub fn receive_from_files(&self) -> &Arc<ReceiveFromFiles> {
        &self.input_from_files
    }

    /// Set the interval for periodic polling of registered entity values.
    /// Zero seconds selects the default interval.
    pub fn set_poll_interval(&self, seconds: usize, handler: PollHandler) {
        info!(seconds, "setting poll interval");
        let mut state = self.state.lock().unwrap();
        state.poll_interval = if seconds > 0 {
            seconds
        } else {
            DEFAULT_POLL_INTERVAL
        };
        state.poll_handler = Some(handler);
    }

    /// Set the handler invoked before a received node configuration is applied
    pub fn set_node_config_handler(&self, handler: NodeConfigureHandler) {
        self.receive_node_configure.set_configure_node_handler(handler);
    }

    /// Start the heartbeat loop and begin publishing and listening.
    /// Returns only after the loop is actually running; a no-op when
    /// already started.
    pub fn start(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.is_running {
                return;
            }
            info!(domain = self.domain(), publisher_id = self.publisher_id(), "starting publisher");
            state.is_running = true;

            let (started_tx, started_rx) = mpsc::channel();
            let (stopped_tx, stopped_rx) = mpsc::channel();
            state.stopped_rx = Some(stopped_rx);
            drop(state);

            let publisher = self.clone();
            thread::spawn(move || publisher.heartbeat_loop(started_tx, stopped_tx));
            // readiness handoff: never return before the loop is scheduled
            let _ = started_rx.recv();
        }

        // One-time startup actions. None of these abort the loop; a failure
        // is logged and recovered on the next start or by redelivery.
        self.domain_identities
            .add_identity(&self.registered_identity.public_identity());

        if self.config.save_discovered_publishers {
            if let Err(err) = self.load_domain_publishers() {
                debug!(%err, "no cached domain publishers restored");
            }
        }
        if self.config.save_discovered_nodes {
            if let Err(err) = self.load_domain_nodes() {
                debug!(%err, "no cached domain nodes restored");
            }
        }

        if !self.config.disable_publishers {
            self.receive_domain_identities.start();
        }
        if !self.config.disable_input {
            self.receive_set_commands.start();
            self.receive_set_node_id.start();
            self.input_from_outputs.start();
        }
        if !self.config.disable_config {
            self.receive_node_configure.start();
        }

        let lwt_address = make_status_address(self.domain(), self.publisher_id());
        if let Err(err) = self
            .messenger
            .connect(&lwt_address, PublisherRunState::Lost.as_str())
        {
            warn!(%err, "messenger connect failed, continuing without transport");
        }

        self.publish_status(PublisherRunState::Connected);
        let identity = self.registered_identity.public_identity();
        if let Err(err) = self.signer.publish_object(&identity.address, true, &identity) {
            warn!(%err, "publishing identity failed");
        }
    }

    /// Stop the heartbeat loop, publish the disconnected status and
    /// disconnect from the bus. Blocks until the loop has fully exited;
    /// a no-op when already stopped.
    pub fn stop(&self) {
        info!(publisher_id = self.publisher_id(), "stopping publisher");
        let mut state = self.state.lock().unwrap();
        if state.is_running {
            state.is_running = false;

            self.receive_domain_identities.stop();
            self.receive_node_configure.stop();
            self.receive_set_node_id.stop();
            self.receive_set_commands.stop();
            self.input_from_outputs.stop();

            let stopped_rx = state.stopped_rx.take();
            drop(state);
            self.input_from_files.stop();
            // completion handoff: wait for the loop to finish its tick
            if let Some(stopped_rx) = stopped_rx {
                let _ = stopped_rx.recv();
            }
        } else {
            drop(state);
        }
        self.publish_status(PublisherRunState::Disconnected);
        self.messenger.disconnect();
    }

    /// Block until SIGINT or SIGTERM is received. Callers invoke stop()
    /// afterwards for a graceful exit.
    pub fn wait_for_signal(&self) {
        let (tx, rx) = mpsc::channel();
        if let Err(err) = ctrlc::set_handler(move || {
            let _ = tx.send(());
        }) {
            warn!(%err, "cannot install signal handler");
            return;
        }
        let _ = rx.recv();
        warn!("received termination signal");
    }

    /// Publish the publisher run status, retained
    pub fn publish_status(&self, status: PublisherRunState) {
        let address = make_status_address(self.domain(), self.publisher_id());
        let message = PublisherStatusMessage {
            address: address.clone(),
            status,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.signer.publish_object(&address, true, &message) {
            warn!(%err, "publishing status failed");
        }
    }

    /// Publish pending updates of all registered entities
    pub fn publish_updates(&self) {
        let nodes = self.registered_nodes.take_updated_nodes();
        for node in &nodes {
            info!(address = %node.address, "publishing node discovery");
            self.publish_entity(node, true);
        }
        if !nodes.is_empty() {
            if let Err(err) = self.save_registered_nodes() {
                warn!(%err, "saving registered nodes failed");
            }
        }
        for input in &self.registered_inputs.take_updated_inputs() {
            self.publish_entity(input, true);
        }
        for output in &self.registered_outputs.take_updated_outputs() {
            self.publish_entity(output, true);
        }
        for value in &self.registered_output_values.take_updated_values() {
            self.publish_entity(value, true);
        }
    }

    fn publish_entity<T: serde::Serialize + Addressed>(&self, entity: &T, retained: bool) {
        if let Err(err) = self.signer.publish_object(entity.address(), retained, entity) {
            warn!(address = entity.address(), %err, "publishing entity failed");
        }
    }

    fn load_registered_nodes(&self) -> Result<()> {
        self.registered_nodes.load_nodes(&self.registered_nodes_file())
    }

    fn save_registered_nodes(&self) -> Result<()> {
        self.registered_nodes.save_nodes(&self.registered_nodes_file())
    }

    fn load_domain_publishers(&self) -> Result<()> {
        self.domain_identities.load_identities(&self.domain_publishers_file())
    }

    fn save_domain_publishers(&self) -> Result<()> {
        self.domain_identities.save_identities(&self.domain_publishers_file())
    }

    fn load_domain_nodes(&self) -> Result<()> {
        self.domain_nodes.load_nodes(&self.domain_nodes_file())
    }

    fn save_domain_nodes(&self) -> Result<()> {
        self.domain_nodes.save_nodes(&self.domain_nodes_file())
    }

    fn registered_nodes_file(&self) -> PathBuf {
        Path::new(&self.config.config_folder)
            .join(format!("{}{}", self.publisher_id(), REGISTERED_NODES_FILE_SUFFIX))
    }

    fn domain_publishers_file(&self) -> PathBuf {
        Path::new(&self.config.cache_folder)
            .join(format!("{}{}", self.publisher_id(), DOMAIN_PUBLISHERS_FILE_SUFFIX))
    }

    fn domain_nodes_file(&self) -> PathBuf {
        Path::new(&self.config.cache_folder)
            .join(format!("{}{}", self.publisher_id(), DOMAIN_NODES_FILE_SUFFIX))
    }

    /// Heartbeat loop. Runs until the running flag is cleared; each tick
    /// publishes pending updates, persists dirty directories and counts
    /// down to the next poll. The flag is read under the runtime lock at
    /// the end of every tick, bounding shutdown latency to one tick.
    fn heartbeat_loop(&self, started_tx: mpsc::Sender<()>, stopped_tx: mpsc::Sender<()>) {
        info!("heartbeat loop started");
        let _ = started_tx.send(());

        loop {
            thread::sleep(Duration::from_secs(1));

            self.publish_updates();

            if self.config.save_discovered_publishers && self.domain_identities.update_count() > 0
            {
                if let Err(err) = self.save_domain_publishers() {
                    warn!(%err, "saving domain publishers failed");
                }
            }
            if self.config.save_discovered_nodes && self.domain_nodes.update_count() > 0 {
                if let Err(err) = self.save_domain_nodes() {
                    warn!(%err, "saving domain nodes failed");
                }
            }

            // fire the poll handler outside the lock
            let poll_handler = Self::poll_tick(&mut self.state.lock().unwrap());
            if let Some(handler) = poll_handler {
                handler(self);
            }

            if !self.state.lock().unwrap().is_running {
                break;
            }
        }
        let _ = stopped_tx.send(());
        info!(publisher_id = self.publisher_id(), "heartbeat loop ended");
    }

    /// Advance the poll countdown by one tick. The countdown decrements on
    /// every tick, including the firing one, so the handler fires on the
    /// first tick and then once every poll_interval ticks.
    fn poll_tick(state: &mut RunState) -> Option<PollHandler> {
        let handler = if state.poll_countdown == 0 {
            state.poll_countdown = state.poll_interval;
            state.poll_handler.clone()
        } else {
            None
        };
        state.poll_countdown = state.poll_countdown.saturating_sub(1);
        handler
    }
}
