//! Input and output discovery, value and command messages

use super::Addressed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input discovery message, published on
/// `{zone}/{publisherId}/{nodeId}/{inputType}/{instance}/$input`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDiscoveryMessage {
    /// Full input address including the `$input` qualifier
    pub address: String,
    /// Data type of the input value: string, number, boolean, ...
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datatype: String,
    /// Input type segment of the address, for example "switch"
    pub input_type: String,
    /// Instance segment of the address, for example "0"
    pub instance: String,
    /// Hardware ID of the owning node
    #[serde(rename = "nodeHwId")]
    pub node_hw_id: String,
    pub publisher_id: String,
    /// Value source for polled inputs: an http:// URL or a file path
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl Addressed for InputDiscoveryMessage {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Output discovery message, published on
/// `{zone}/{publisherId}/{nodeId}/{outputType}/{instance}/$output`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDiscoveryMessage {
    /// Full output address including the `$output` qualifier
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datatype: String,
    pub output_type: String,
    pub instance: String,
    #[serde(rename = "nodeHwId")]
    pub node_hw_id: String,
    pub publisher_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl Addressed for OutputDiscoveryMessage {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Latest value of an output, published on
/// `{zone}/{publisherId}/{nodeId}/{outputType}/{instance}/$latest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLatestMessage {
    /// Full output address including the `$latest` qualifier
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

impl Addressed for OutputLatestMessage {
    fn address(&self) -> &str {
        &self.address
    }
}

/// Command to set the value of a registered input, received on
/// `{zone}/{publisherId}/{nodeId}/{inputType}/{instance}/$set`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInputMessage {
    pub address: String,
    /// Address of the sending publisher
    pub sender: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

impl Addressed for SetInputMessage {
    fn address(&self) -> &str {
        &self.address
    }
}
