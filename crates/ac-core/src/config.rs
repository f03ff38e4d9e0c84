//! Application configuration
//!
//! Loaded from a TOML file. Every section and field has a default so a
//! partial config (or none at all) still produces a usable
//! [`AppConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::ConnectionSettings;

/// Helper modules for Duration serialization in config files
pub mod serde_utils {
    /// Serialize a `Duration` as whole seconds (u64)
    pub mod duration_secs {
        use serde::{self, Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_u64(duration.as_secs())
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
        where
            D: Deserializer<'de>,
        {
            let secs = u64::deserialize(deserializer)?;
            Ok(Duration::from_secs(secs))
        }
    }

    /// Serialize a `Duration` as whole milliseconds (u64)
    pub mod duration_millis {
        use serde::{self, Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_u64(duration.as_millis() as u64)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
        where
            D: Deserializer<'de>,
        {
            let millis = u64::deserialize(deserializer)?;
            Ok(Duration::from_millis(millis))
        }
    }
}

use serde_utils::{duration_millis, duration_secs};

/// Where the game lives and how to start it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Path to the game executable
    pub exe_path: PathBuf,

    /// The game's content directory (the `/tf` folder). Must contain
    /// `cfg`; the launcher swaps `cfg` and `custom` here for the
    /// managed tree while the game runs.
    pub dir_path: PathBuf,

    /// Launch arguments, passed through verbatim
    pub args: String,

    /// The managed configuration tree symlinked in place of the user's
    /// `cfg`/`custom` directories. Must contain `cfg/` and `custom/`.
    pub managed_dir: PathBuf,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            exe_path: PathBuf::new(),
            dir_path: PathBuf::new(),
            args: "-novid -windowed -condebug -usercon".to_string(),
            managed_dir: PathBuf::from("tf-files"),
        }
    }
}

impl GameConfig {
    /// Path of the console log file the game appends to
    pub fn console_log_path(&self) -> PathBuf {
        self.dir_path.join("console.log")
    }
}

/// Timeout budgets for the recorder's setup and load states.
///
/// Defaults match the budgets the recorder was designed around; tests
/// shrink them to keep failure paths fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// OBS connect budget
    #[serde(with = "duration_secs")]
    pub obs_connect: Duration,

    /// Game launch / settle budget
    #[serde(with = "duration_secs")]
    pub game_launch: Duration,

    /// RCON connect-retry budget
    #[serde(with = "duration_secs")]
    pub rcon_connect: Duration,

    /// Budget for the post-connect handshake echo
    #[serde(with = "duration_secs")]
    pub handshake: Duration,

    /// Budget for the `playdemo` command response
    #[serde(with = "duration_secs")]
    pub command: Duration,

    /// Pause between a successful `playdemo` response and the liveness
    /// probe, so the probe lands after loading actually starts
    #[serde(with = "duration_secs")]
    pub load_settle: Duration,

    /// Budget for the liveness probe while the demo loads
    #[serde(with = "duration_secs")]
    pub load_probe: Duration,

    /// Bound on acquiring the RCON connect gate
    #[serde(with = "duration_secs")]
    pub gate_connect: Duration,

    /// Bound on acquiring the RCON disconnect gate
    #[serde(with = "duration_secs")]
    pub gate_disconnect: Duration,

    /// Delay between RCON connect retries
    #[serde(with = "duration_millis")]
    pub retry_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            obs_connect: Duration::from_secs(30),
            game_launch: Duration::from_secs(30),
            rcon_connect: Duration::from_secs(60),
            handshake: Duration::from_secs(2),
            command: Duration::from_secs(60),
            load_settle: Duration::from_secs(5),
            load_probe: Duration::from_secs(120),
            gate_connect: Duration::from_secs(30),
            gate_disconnect: Duration::from_secs(10),
            retry_interval: Duration::from_millis(250),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// RCON connection into the game
    pub rcon: ConnectionSettings,

    /// OBS websocket connection
    pub obs: ConnectionSettings,

    /// Game paths and launch arguments
    pub game: GameConfig,

    /// Timeout budgets
    pub timeouts: TimeoutConfig,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    let config = toml::from_str(&contents)?;
    Ok(config)
}

/// Default config path: `<user config dir>/autoclipper/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autoclipper")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.timeouts.obs_connect, Duration::from_secs(30));
        assert_eq!(config.timeouts.rcon_connect, Duration::from_secs(60));
        assert_eq!(config.timeouts.retry_interval, Duration::from_millis(250));
        assert_eq!(config.rcon.host, "127.0.0.1");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            [rcon]
            host = "127.0.0.1"
            port = 27015
            password = "hunter2"

            [game]
            exe_path = "/games/tf2/hl2.exe"
            dir_path = "/games/tf2/tf"

            [timeouts]
            obs_connect = 5
            retry_interval = 100
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rcon.port, 27015);
        assert_eq!(config.rcon.password, "hunter2");
        // Unset sections fall back to defaults
        assert_eq!(config.obs.host, "127.0.0.1");
        assert_eq!(config.timeouts.obs_connect, Duration::from_secs(5));
        assert_eq!(config.timeouts.retry_interval, Duration::from_millis(100));
        assert_eq!(config.timeouts.game_launch, Duration::from_secs(30));
        assert_eq!(
            config.game.console_log_path(),
            PathBuf::from("/games/tf2/tf/console.log")
        );
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = AppConfig::default();
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.timeouts.command, config.timeouts.command);
        assert_eq!(loaded.game.args, config.game.args);
    }
}
