//! Wire message types for domain discovery and commands
//!
//! Every discovery message carries its own full address so that a directory
//! can be bulk-exported and re-imported without losing its keys. All types
//! are plain value snapshots: an update always replaces the whole stored
//! value, never mutates a retrieved one in place.

mod identity;
mod inout;
mod node;

pub use identity::{
    PublisherFullIdentity, PublisherIdentityMessage, PublisherRunState, PublisherStatusMessage,
};
pub use inout::{
    InputDiscoveryMessage, OutputDiscoveryMessage, OutputLatestMessage, SetInputMessage,
};
pub use node::{ConfigAttr, NodeConfigureMessage, NodeDiscoveryMessage, SetNodeIDMessage};

/// The default zone for publishers that have not joined a named domain
pub const LOCAL_ZONE_ID: &str = "local";

/// Implemented by every message type that carries its own address.
/// Used for typed bulk import into a directory and for publishing.
pub trait Addressed {
    fn address(&self) -> &str;
}
