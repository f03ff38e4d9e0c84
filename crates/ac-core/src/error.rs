//! Core error types for autoclipper

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while building demo file info from disk
#[derive(Error, Debug)]
pub enum EventFileError {
    /// The demo file itself does not exist
    #[error("Demo file not found: {0}")]
    DemoNotFound(PathBuf),

    /// Event file JSON parse error
    #[error("Event file parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Unknown event kind string in an event file
    #[error("Unknown demo event kind: {0}")]
    UnknownEventKind(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
