//! Error types for the recorder core

use std::path::PathBuf;
use thiserror::Error;

/// RCON client and transport errors
#[derive(Error, Debug)]
pub enum RconError {
    /// Another caller is already connecting or disconnecting
    #[error("Could not acquire the RCON connection gate: another caller is connecting or disconnecting")]
    GateBusy,

    /// Connect called while a connection exists
    #[error("The current RCON connection must be disconnected before a new one can be established")]
    AlreadyConnected,

    /// Command or disconnect called without a connection
    #[error("Not connected to RCON")]
    NotConnected,

    /// The transport did not connect within its budget
    #[error("Timed out while establishing the RCON connection")]
    ConnectTimeout,

    /// The server rejected the RCON password
    #[error("RCON authentication rejected")]
    AuthRejected,

    /// Malformed data on the wire
    #[error("RCON protocol error: {0}")]
    Protocol(String),

    /// I/O error on the transport
    #[error("RCON I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while swapping the game's config directories
#[derive(Error, Debug)]
pub enum OverlayError {
    /// The mandatory cfg directory is missing
    #[error("The cfg folder could not be found in {0}; is the game directory set to the '/tf' folder?")]
    MissingCfg(PathBuf),

    /// A directory is in the way of a managed symlink
    #[error("{0} still exists in the game directory, cannot create symlink")]
    Obstructed(PathBuf),

    /// Filesystem error during the swap or restore
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The swap failed and rolling it back failed too
    #[error("Directory swap failed ({swap}); restoring the originals also failed ({restore})")]
    SwapAndRestoreFailed {
        swap: Box<OverlayError>,
        restore: Box<OverlayError>,
    },
}

/// Game launch errors
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Config directory swap failed
    #[error(transparent)]
    Overlay(#[from] OverlayError),

    /// The process could not be started
    #[error("Failed to start the game process: {0}")]
    Spawn(std::io::Error),
}

/// OBS controller and service errors
#[derive(Error, Debug)]
pub enum ObsError {
    /// Settings changed while connected
    #[error("The OBS connection settings cannot be altered while OBS is connected")]
    SettingsLocked,

    /// No settings available to connect with
    #[error("No OBS connection settings have been provided")]
    NoSettings,

    /// Operation requires a connection
    #[error("Not connected to OBS")]
    NotConnected,

    /// Could not reach or identify with the service
    #[error("OBS connect failed: {0}")]
    Connect(String),

    /// OBS rejected the authentication challenge
    #[error("OBS authentication failed: {0}")]
    Auth(String),

    /// A request was rejected or the connection broke mid-request
    #[error("OBS request failed: {0}")]
    Service(String),
}

/// Top-level recorder errors
#[derive(Error, Debug)]
pub enum RecorderError {
    /// A dependency did not become ready within its budget
    #[error("Timed out while waiting for {0}")]
    SetupTimeout(&'static str),

    /// A dependency failed to reach its ready state
    #[error("Setup failed: {0}")]
    SetupFailed(&'static str),

    /// A console command got no response within its budget
    #[error("Timed out waiting for the response to {0}")]
    CommandTimeout(&'static str),

    /// The game did not accept the demo play command
    #[error("Demo play command was not accepted; response was: {0:?}")]
    DemoLoadFailed(String),

    /// The console log monitor broke
    #[error("Console log monitor failed: {0}")]
    Monitor(String),

    /// The run was cancelled from outside
    #[error("Recording run was cancelled")]
    Cancelled,

    /// RCON failure during a command
    #[error(transparent)]
    Rcon(#[from] RconError),

    /// OBS failure
    #[error(transparent)]
    Obs(#[from] ObsError),

    /// Game launch failure
    #[error(transparent)]
    Launch(#[from] LaunchError),
}
