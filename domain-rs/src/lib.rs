//! # iotdomain - IoT domain publisher library
//!
//! Library for building publishers in an IoT domain: pieces of software
//! that publish discovery and output messages for the Things they manage
//! onto a shared message bus, and consume the publications of every other
//! publisher in the same domain.
//!
//! ## Core Principle
//!
//! **The Address IS the Identity**: every entity in the domain lives on a
//! segmented bus address `domain/publisherId/nodeId[/type/instance]`, with
//! an optional `$qualifier` selecting the message kind published there. Two
//! addresses that differ only in qualifier refer to the same entity.
//!
//! ## Key Features
//!
//! - Segmented addressing with `+`/`#` subscription wildcards
//! - Generic domain directories keyed by entity address
//! - ed25519-signed publications, verified before admission
//! - Trust-on-first-use admission of publisher identities
//! - Publisher runtime with a 1-second heartbeat loop for publication,
//!   persistence and polling
//! - Input values from bus commands, polled http endpoints or watched files
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           message bus (Messenger)       │
//! │   domain/publisherId/nodeId/$qualifier  │
//! └─────────────────────────────────────────┘
//!        ▲                        │
//!        │ signed publications    │ verified discovery
//!        │                        ▼
//! ┌──────┴──────────┐   ┌──────────────────┐
//! │ Publisher       │   │ DomainDirectory  │
//! │ registered      │   │ identities/nodes │
//! │ nodes/in/out    │   │ inputs/outputs   │
//! └─────────────────┘   └──────────────────┘
//! ```

pub mod address;
pub mod directory;
pub mod errors;
pub mod identities;
pub mod inputs;
pub mod logging;
pub mod messaging;
pub mod nodes;
pub mod outputs;
pub mod persist;
pub mod publisher;
pub mod types;

pub use address::{
    make_identity_address, make_io_address, make_node_discovery_address, make_status_address,
    Address,
};
pub use directory::DomainDirectory;
pub use errors::{DomainError, Result};
pub use identities::{DomainPublisherIdentities, ReceivePublisherIdentities, RegisteredIdentity};
pub use inputs::{
    DomainInputs, InputSetHandler, ReceiveFromFiles, ReceiveFromHTTP, ReceiveFromOutputs,
    ReceiveFromSetCommands, RegisteredInputs,
};
pub use logging::init_logging;
pub use messaging::{
    create_asym_keys, decode_public_key, encode_public_key, verify_command_signature,
    verify_sender_signature, DummyMessenger, MessageSigner, Messenger, MessengerConfig, OnMessage,
    PublicKeyResolver, SignedEnvelope,
};
pub use nodes::{
    DomainNodes, NodeConfigureHandler, ReceiveNodeConfigure, ReceiveSetNodeID, RegisteredNodes,
    SetNodeIDHandler,
};
pub use outputs::{
    DomainOutputValues, DomainOutputs, RegisteredOutputValues, RegisteredOutputs,
};
pub use publisher::{PollHandler, Publisher, PublisherConfig, DEFAULT_POLL_INTERVAL};
pub use types::{
    Addressed, ConfigAttr, InputDiscoveryMessage, NodeConfigureMessage, NodeDiscoveryMessage,
    OutputDiscoveryMessage, OutputLatestMessage, PublisherFullIdentity, PublisherIdentityMessage,
    PublisherRunState, PublisherStatusMessage, SetInputMessage, SetNodeIDMessage, LOCAL_ZONE_ID,
};

/// Version of the iotdomain message format
pub const VERSION: &str = "1.0.0";
