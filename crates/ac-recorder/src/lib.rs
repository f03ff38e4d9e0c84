//! ac-recorder: the autoclipper recorder core
//!
//! Drives a queue of demo files through "load demo → start recording →
//! wait for playback to finish → stop recording" against a live game
//! process. The [`recorder::DemoRecorder`] state machine sequences
//! three lifecycle managers, each with its own failure modes and
//! timeout budget:
//!
//! - [`rcon::RconClient`] — the RCON control connection into the game
//! - [`launcher::GameLauncher`] — game process lifecycle, including the
//!   managed `cfg`/`custom` directory overlay
//! - [`obs::ObsController`] — the connection to OBS
//!
//! plus [`logwatch`], which watches the game's console log for the
//! playback-finished marker.

pub mod error;
pub mod launcher;
pub mod logwatch;
pub mod obs;
pub mod obs_ws;
pub mod overlay;
pub mod rcon;
pub mod recorder;
pub mod srcon;

pub use error::{LaunchError, ObsError, OverlayError, RconError, RecorderError};
pub use launcher::{GameLauncher, LaunchState};
pub use obs::{ObsController, ObsStatus, RecordingHandle, RecordingService};
pub use rcon::{ConsoleConnection, ConsoleTransport, RconClient, RconStatus};
pub use recorder::{DemoRecorder, RecorderState};
