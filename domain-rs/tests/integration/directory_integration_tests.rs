//! Integration tests for the domain directory through the public API
//!
//! Exercises the address-keyed store the way a consumer application would:
//! mixed node and input addresses, qualifier variants, prefix queries and
//! removal.

use iotdomain::DomainDirectory;
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

/// Test: A directory holds node and input entities side by side
///
/// A 3-segment node address and a 5-segment input address coexist; lookups
/// resolve each by its own identity components and removal leaves the
/// other untouched.
#[test]
fn test_mixed_node_and_input_entities() {
    let directory = new_directory();
    directory.update("domain/pub/node", item("Hello"));
    directory.update("domain/pub/node2/type/instance/$input", item("World"));

    assert_eq!(directory.get_all().len(), 2);
    assert_eq!(directory.len(), 2);

    // strict component lookup
    assert!(directory.get("domain/pub/node", "", "").is_some());
    assert!(directory.get("domain/pub/node2", "type", "instance").is_some());
    assert!(directory.get("domain", "", "").is_none());
    assert!(directory
        .get("domain/pub/node2/type/instance", "not", "found")
        .is_none());

    // prefix query is segment-wise: 'node' does not match 'node2'
    assert_eq!(directory.get_by_address_prefix("domain/pub/node2").len(), 1);
    assert_eq!(directory.get_by_address_prefix("domain/pub/node").len(), 1);
    assert_eq!(directory.get_by_address_prefix("domain/pub").len(), 2);

    directory.remove("domain/pub/node");
    assert!(directory.get_by_address("domain/pub/node").is_none());
    assert_eq!(directory.get_all().len(), 1);
}

/// Test: Qualifier variants address one entity
///
/// Updates and lookups through any `$qualifier` variant of an address land
/// on the same stored entry.
#[test]
fn test_qualifier_variants_share_identity() {
    let directory = new_directory();
    directory.update("domain/pub/node/$node", item("first"));
    directory.update("domain/pub/node/$set", item("second"));

    assert_eq!(directory.len(), 1);
    assert_eq!(directory.get_by_address("domain/pub/node").unwrap().name, "second");
    assert_eq!(
        directory.get_by_address("domain/pub/node/$latest").unwrap().name,
        "second"
    );
}

/// Test: Concurrent updates and reads stay consistent
///
/// Writers on distinct addresses and concurrent full scans never lose an
/// update; per-address ordering follows issue order.
#[test]
fn test_concurrent_access() {
    let directory = Arc::new(new_directory());
    let mut handles = Vec::new();
    for t in 0..8 {
        let dir = directory.clone();
        handles.push(std::thread::spawn(move || {
            let address = format!("domain/pub/node{}", t);
            for i in 0..200 {
                dir.update(&address, Item { name: i.to_string() });
                assert!(dir.get_by_address(&address).is_some());
                let _ = dir.get_by_address_prefix("domain/pub");
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(directory.len(), 8);
    for t in 0..8 {
        let entity = directory
            .get_by_address(&format!("domain/pub/node{}", t))
            .unwrap();
        assert_eq!(entity.name, "199");
    }
}
