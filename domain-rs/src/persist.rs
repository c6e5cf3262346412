//! Persistence boundary: typed bulk load/save of entities as JSON files
//!
//! The directories expose typed export/import exactly for this; when and
//! what to persist is the caller's decision.

use crate::errors::{DomainError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// File name suffix for this publisher's registered nodes
pub const REGISTERED_NODES_FILE_SUFFIX: &str = "-nodes.json";
/// File name suffix for this publisher's saved identity
pub const REGISTERED_IDENTITY_FILE_SUFFIX: &str = "-identity.json";
/// File name suffix for cached domain publisher identities
pub const DOMAIN_PUBLISHERS_FILE_SUFFIX: &str = "-domainpublishers.json";
/// File name suffix for cached discovered domain nodes
pub const DOMAIN_NODES_FILE_SUFFIX: &str = "-domainnodes.json";

/// Load a list of entities from a JSON file.
///
/// A missing file is an IO error for the caller to treat as "no cache". A
/// readable file holding valid JSON of the wrong shape is a type mismatch,
/// reported distinctly from unparseable content.
pub fn load_entities<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)?;
    match serde_json::from_str::<Vec<T>>(&content) {
        Ok(entities) => Ok(entities),
        Err(e) => {
            if serde_json::from_str::<serde_json::Value>(&content).is_ok() {
                Err(DomainError::TypeMismatch(format!(
                    "file '{}' holds entities of a different type: {}",
                    path.display(),
                    e
                )))
            } else {
                Err(DomainError::Decode(format!(
                    "file '{}' is not valid JSON: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
}

/// Save a list of entities to a JSON file, creating parent folders as needed
pub fn save_entities<T: Serialize>(path: &Path, entities: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(entities)?;
    fs::write(path, content)?;
    Ok(())
}
