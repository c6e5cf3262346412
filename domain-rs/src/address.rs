//! Address parsing and matching for the iotdomain message bus
//!
//! Addresses are hierarchical, `/`-separated paths:
//!
//! ```text
//! {zone}/{publisherId}/{nodeId}[/{nodeType}/{instanceId}][/{messageType}]
//! ```
//!
//! The first three segments are always present. The nodeType/instanceId pair
//! identifies an input or output of a node and is either fully present or
//! fully absent. The trailing messageType qualifier carries a reserved `$`
//! marker (`$node`, `$input`, `$set`, ...) and never changes entity identity:
//! `local/pub1/node1` and `local/pub1/node1/$set` refer to the same node.

use crate::errors::{DomainError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Message type qualifier for node discovery publications
pub const MSG_TYPE_NODE_DISCOVERY: &str = "$node";
/// Message type qualifier for input discovery publications
pub const MSG_TYPE_INPUT_DISCOVERY: &str = "$input";
/// Message type qualifier for output discovery publications
pub const MSG_TYPE_OUTPUT_DISCOVERY: &str = "$output";
/// Message type qualifier for the latest output value
pub const MSG_TYPE_LATEST: &str = "$latest";
/// Message type qualifier for publisher identity publications
pub const MSG_TYPE_IDENTITY: &str = "$identity";
/// Message type qualifier for publisher run status
pub const MSG_TYPE_STATUS: &str = "$status";
/// Message type qualifier for input set commands
pub const MSG_TYPE_SET_INPUT: &str = "$set";
/// Message type qualifier for node configure commands
pub const MSG_TYPE_CONFIGURE: &str = "$configure";
/// Message type qualifier for the set-node-ID command
pub const MSG_TYPE_SET_NODE_ID: &str = "$setNodeId";

/// Wildcard matching a single address segment in subscriptions
pub const WILDCARD_SINGLE: &str = "+";
/// Wildcard matching any remaining address segments in subscriptions
pub const WILDCARD_MULTI: &str = "#";

// Identity segments: alphanumerics plus a few separators. Wildcards and the
// `$` marker are not valid inside identity segments.
static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_@.:-]*$").expect("segment regex")
});

/// Parsed address components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub zone: String,
    pub publisher_id: String,
    /// Absent only for publisher-level addresses such as
    /// `{zone}/{publisherId}/$identity`
    pub node_id: Option<String>,
    /// Input/output type, paired with instance_id
    pub node_type: Option<String>,
    /// Input/output instance, paired with node_type
    pub instance_id: Option<String>,
    /// Trailing `$` qualifier, ignored for entity identity
    pub message_type: Option<String>,
}

impl Address {
    /// Parse a raw address string into its components.
    ///
    /// Valid identity shapes are 3 segments (node) and 5 segments
    /// (input/output), each optionally followed by a `$` qualifier, plus the
    /// publisher-level shape `{zone}/{publisherId}/{$qualifier}`. Anything
    /// else, including any total below 3 segments, is a
    /// [`DomainError::Address`].
    ///
    /// # Examples
    ///
    /// ```
    /// use iotdomain::Address;
    ///
    /// let addr = Address::parse("local/pub1/node1/temperature/0/$input").unwrap();
    /// assert_eq!(addr.zone, "local");
    /// assert_eq!(addr.publisher_id, "pub1");
    /// assert_eq!(addr.node_id.as_deref(), Some("node1"));
    /// assert_eq!(addr.node_type.as_deref(), Some("temperature"));
    /// assert_eq!(addr.instance_id.as_deref(), Some("0"));
    /// assert_eq!(addr.message_type.as_deref(), Some("$input"));
    /// ```
    pub fn parse(raw: &str) -> Result<Address> {
        let mut segments: Vec<&str> = raw.split('/').collect();
        if segments.len() < 3 {
            return Err(DomainError::Address(format!(
                "address '{}' has fewer than 3 segments",
                raw
            )));
        }

        let message_type = match segments.last() {
            Some(last) if last.starts_with('$') => segments.pop().map(str::to_string),
            _ => None,
        };

        for segment in &segments {
            if !SEGMENT_RE.is_match(segment) {
                return Err(DomainError::Address(format!(
                    "address '{}' has invalid segment '{}'",
                    raw, segment
                )));
            }
        }

        match segments.len() {
            // publisher-level address, only valid with a qualifier
            2 if message_type.is_some() => Ok(Address {
                zone: segments[0].to_string(),
                publisher_id: segments[1].to_string(),
                node_id: None,
                node_type: None,
                instance_id: None,
                message_type,
            }),
            3 => Ok(Address {
                zone: segments[0].to_string(),
                publisher_id: segments[1].to_string(),
                node_id: Some(segments[2].to_string()),
                node_type: None,
                instance_id: None,
                message_type,
            }),
            5 => Ok(Address {
                zone: segments[0].to_string(),
                publisher_id: segments[1].to_string(),
                node_id: Some(segments[2].to_string()),
                node_type: Some(segments[3].to_string()),
                instance_id: Some(segments[4].to_string()),
                message_type,
            }),
            _ => Err(DomainError::Address(format!(
                "address '{}' must have a paired nodeType/instanceId",
                raw
            ))),
        }
    }

    /// The entity-identity portion of the address: everything up to and
    /// including the nodeType/instanceId pair, with any qualifier stripped.
    /// Directory entries are keyed by this.
    pub fn node_key(&self) -> String {
        let mut key = format!("{}/{}", self.zone, self.publisher_id);
        if let Some(ref node_id) = self.node_id {
            key.push('/');
            key.push_str(node_id);
        }
        if let (Some(node_type), Some(instance_id)) = (&self.node_type, &self.instance_id) {
            key.push('/');
            key.push_str(node_type);
            key.push('/');
            key.push_str(instance_id);
        }
        key
    }
}

// Display writes the canonical full address including the qualifier.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_key())?;
        if let Some(ref message_type) = self.message_type {
            write!(f, "/{}", message_type)?;
        }
        Ok(())
    }
}

/// Segment-wise prefix test. Unlike a string prefix, `local/pub/node` is not
/// a prefix of `local/pub/node2`.
pub fn has_address_prefix(address: &str, prefix: &str) -> bool {
    let addr_segments: Vec<&str> = address.split('/').collect();
    let prefix_segments: Vec<&str> = prefix.split('/').collect();
    if prefix_segments.len() > addr_segments.len() {
        return false;
    }
    prefix_segments
        .iter()
        .zip(addr_segments.iter())
        .all(|(p, a)| p == a)
}

/// Match an address against a subscription pattern with `+` (single segment)
/// and `#` (remaining segments) wildcards.
pub fn matches_pattern(address: &str, pattern: &str) -> bool {
    let addr_segments: Vec<&str> = address.split('/').collect();
    let pattern_segments: Vec<&str> = pattern.split('/').collect();

    let mut ai = 0;
    for (pi, pseg) in pattern_segments.iter().enumerate() {
        match *pseg {
            WILDCARD_MULTI => {
                // '#' is only valid as the final pattern segment
                return pi == pattern_segments.len() - 1 && ai < addr_segments.len();
            }
            WILDCARD_SINGLE => {
                if ai >= addr_segments.len() {
                    return false;
                }
                ai += 1;
            }
            _ => {
                if ai >= addr_segments.len() || addr_segments[ai] != *pseg {
                    return false;
                }
                ai += 1;
            }
        }
    }
    ai == addr_segments.len()
}

/// Build a node discovery address: `{zone}/{publisherId}/{nodeId}/$node`
pub fn make_node_discovery_address(zone: &str, publisher_id: &str, node_id: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        zone, publisher_id, node_id, MSG_TYPE_NODE_DISCOVERY
    )
}

/// Build an input/output address with the given qualifier, for example
/// `{zone}/{publisherId}/{nodeId}/{ioType}/{instance}/$input`
pub fn make_io_address(
    zone: &str,
    publisher_id: &str,
    node_id: &str,
    io_type: &str,
    instance: &str,
    message_type: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/{}/{}",
        zone, publisher_id, node_id, io_type, instance, message_type
    )
}

/// Build a publisher identity address: `{zone}/{publisherId}/$identity`
pub fn make_identity_address(zone: &str, publisher_id: &str) -> String {
    format!("{}/{}/{}", zone, publisher_id, MSG_TYPE_IDENTITY)
}

/// Build a publisher status address: `{zone}/{publisherId}/$status`
pub fn make_status_address(zone: &str, publisher_id: &str) -> String {
    format!("{}/{}/{}", zone, publisher_id, MSG_TYPE_STATUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_address() {
        let addr = Address::parse("local/pub1/node1").unwrap();
        assert_eq!(addr.zone, "local");
        assert_eq!(addr.publisher_id, "pub1");
        assert_eq!(addr.node_id.as_deref(), Some("node1"));
        assert!(addr.node_type.is_none());
        assert!(addr.message_type.is_none());
        assert_eq!(addr.node_key(), "local/pub1/node1");
    }

    #[test]
    fn test_parse_publisher_level_address() {
        let addr = Address::parse("local/pub1/$identity").unwrap();
        assert_eq!(addr.publisher_id, "pub1");
        assert!(addr.node_id.is_none());
        assert_eq!(addr.message_type.as_deref(), Some("$identity"));
        assert_eq!(addr.node_key(), "local/pub1");
        assert_eq!(addr.to_string(), "local/pub1/$identity");
    }

    #[test]
    fn test_parse_qualified_addresses() {
        let addr = Address::parse("local/pub1/node1/$set").unwrap();
        assert_eq!(addr.message_type.as_deref(), Some("$set"));
        assert_eq!(addr.node_key(), "local/pub1/node1");

        let addr = Address::parse("local/pub1/node1/switch/0/$input").unwrap();
        assert_eq!(addr.node_type.as_deref(), Some("switch"));
        assert_eq!(addr.instance_id.as_deref(), Some("0"));
        assert_eq!(addr.node_key(), "local/pub1/node1/switch/0");
    }

    #[test]
    fn test_parse_rejects_short_addresses() {
        assert!(Address::parse("local/pub1").is_err());
        assert!(Address::parse("local").is_err());
        assert!(Address::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_unpaired_node_type() {
        // 4 segments without a qualifier: nodeType without instanceId
        assert!(Address::parse("local/pub1/node1/switch").is_err());
        // 7 segments never parse
        assert!(Address::parse("local/pub1/node1/switch/0/extra/more").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(Address::parse("local//node1").is_err());
        assert!(Address::parse("local/pub1/node1//").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for raw in [
            "local/pub1/node1",
            "local/pub1/node1/$node",
            "local/pub1/node1/switch/0",
            "local/pub1/node1/switch/0/$input",
        ] {
            assert_eq!(Address::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_segment_prefix_not_string_prefix() {
        assert!(has_address_prefix("local/pub/node/type/0", "local/pub/node"));
        assert!(has_address_prefix("local/pub/node", "local/pub/node"));
        assert!(!has_address_prefix("local/pub/node2", "local/pub/node"));
        assert!(!has_address_prefix("local/pub", "local/pub/node"));
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("local/pub1/node1/$node", "local/+/+/$node"));
        assert!(matches_pattern("local/pub1/node1/$node", "local/+/#"));
        assert!(matches_pattern("local/pub1/$identity", "local/+/$identity"));
        assert!(matches_pattern("a/b/c/d/e", "a/#"));
        assert!(!matches_pattern("a/b/c", "a/b"));
        assert!(!matches_pattern("a/b", "a/b/+"));
        assert!(!matches_pattern("other/pub1/node1/$node", "local/+/+/$node"));
        // '#' must match at least one remaining segment
        assert!(!matches_pattern("a", "a/#"));
    }
}
