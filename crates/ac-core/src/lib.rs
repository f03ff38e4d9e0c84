//! ac-core: Configuration and data model for autoclipper
//!
//! This crate holds everything the recorder core consumes but does not
//! own: the TOML configuration (RCON/OBS connection settings, game
//! paths, timeout budgets), the demo data model, and demo-file
//! discovery.

pub mod config;
pub mod discover;
pub mod error;
pub mod models;

pub use config::{AppConfig, GameConfig, TimeoutConfig};
pub use error::{ConfigError, EventFileError};
pub use models::{ConnectionSettings, DemoEvent, DemoEventKind, DemoFileInfo};
