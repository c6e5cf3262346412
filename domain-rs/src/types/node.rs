//! Node discovery and node command messages

use super::Addressed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Describes a single configurable attribute of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigAttr {
    /// Data type of the attribute value: string, number, boolean, enum
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datatype: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Default value when the attribute is not set
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default: String,
    /// Valid values for enum datatypes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Secret values are not included in publications
    #[serde(default)]
    pub secret: bool,
}

/// Node discovery message, published on `{zone}/{publisherId}/{nodeId}/$node`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDiscoveryMessage {
    /// Full node address including the `$node` qualifier
    pub address: String,
    /// Immutable hardware identifier; survives node ID changes
    #[serde(rename = "hwId")]
    pub hw_id: String,
    /// Addressing ID of the node, initially the hardware ID
    pub node_id: String,
    pub publisher_id: String,
    /// Device or service type, for example "gateway" or "sensor"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_type: String,
    /// Current attribute values (make/model, firmware, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attr: HashMap<String, String>,
    /// Configurable attributes and their descriptors
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, ConfigAttr>,
    /// Runtime status values (last seen, error counts, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub status: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Addressed for NodeDiscoveryMessage {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Command to update configuration of a registered node, received on
/// `{zone}/{publisherId}/{nodeId}/$configure`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfigureMessage {
    pub address: String,
    /// Attribute name/value pairs to apply
    pub attr: HashMap<String, String>,
    /// Address of the sending publisher
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

impl Addressed for NodeConfigureMessage {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Command to change the addressing ID of a registered node, received on
/// `{zone}/{publisherId}/{nodeId}/$setNodeId`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetNodeIDMessage {
    pub address: String,
    /// The new node ID to use in addresses
    pub node_id: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

impl Addressed for SetNodeIDMessage {
    fn address(&self) -> &str {
        &self.address
    }
}
