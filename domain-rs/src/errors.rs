//! Error types for the iotdomain library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Address error: {0}")]
    Address(String),

    #[error("Unknown signer: no public key for publisher '{0}'")]
    UnknownSigner(String),

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Messenger error: {0}")]
    Messenger(String),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, DomainError>;
