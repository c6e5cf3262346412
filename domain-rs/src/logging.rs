//! Process-wide logging setup
//!
//! Logging is injected by the application, not by the publisher: call
//! [`init_logging`] once from main with the level and file from
//! [`crate::publisher::PublisherConfig`]. Library code only emits
//! `tracing` events.

use crate::errors::{DomainError, Result};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::Level;

fn parse_level(level: &str) -> Result<Level> {
    match level.to_ascii_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" | "warning" => Ok(Level::WARN),
        "" | "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        other => Err(DomainError::Config(format!("unknown log level '{}'", other))),
    }
}

/// Install the global tracing subscriber at the given level, writing to
/// stderr or appending to the given file. Fails when called twice.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let level = parse_level(level)?;
    let builder = tracing_subscriber::fmt().with_max_level(level);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_writer(file)
                .with_ansi(false)
                .try_init()
                .map_err(|e| DomainError::Config(format!("logging setup: {}", e)))
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| DomainError::Config(format!("logging setup: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        // empty selects the default
        assert_eq!(parse_level("").unwrap(), Level::INFO);
        assert!(parse_level("loud").is_err());
    }
}
