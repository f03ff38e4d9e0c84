//! Game process lifecycle
//!
//! [`GameLauncher`] owns the game child process and the config overlay
//! applied around it: launching acquires the overlay, spawns the
//! process and installs an exit watcher; however the process ends, the
//! watcher releases the overlay so the user's directories come back.
//! Lifecycle state is published on a watch channel.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::LaunchError;
use crate::overlay::ConfigOverlay;

/// Lifecycle of the launched game process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    NotLaunched,
    /// Swapping the game's config directories for the managed tree
    Configuring,
    Launching,
    Launched,
    /// The process exited cleanly and the overlay was released
    Exited,
    /// The process failed to start, or exited with a non-zero code
    Error,
}

/// Launches the game and restores its config directories on exit
pub struct GameLauncher {
    state_tx: Arc<watch::Sender<LaunchState>>,
    kill: std::sync::Mutex<Option<CancellationToken>>,
}

impl Default for GameLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl GameLauncher {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(LaunchState::NotLaunched);
        Self {
            state_tx: Arc::new(state_tx),
            kill: std::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LaunchState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle-state changes
    pub fn subscribe(&self) -> watch::Receiver<LaunchState> {
        self.state_tx.subscribe()
    }

    /// Apply the config overlay and start the game.
    ///
    /// `args` is split on whitespace. The spawned process is watched
    /// until it exits; the overlay is released by the watcher, never by
    /// the caller. Cancelling `cancel` kills the process.
    pub async fn launch(
        &self,
        exe_path: &Path,
        game_dir: &Path,
        managed_dir: &Path,
        args: &str,
        cancel: &CancellationToken,
    ) -> Result<(), LaunchError> {
        self.state_tx.send_replace(LaunchState::Configuring);
        let overlay = match ConfigOverlay::acquire(game_dir, managed_dir) {
            Ok(overlay) => overlay,
            Err(e) => {
                self.state_tx.send_replace(LaunchState::Error);
                return Err(e.into());
            }
        };

        self.state_tx.send_replace(LaunchState::Launching);
        tracing::info!("Launching {} {}", exe_path.display(), args);
        let child = tokio::process::Command::new(exe_path)
            .args(args.split_whitespace())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                // The overlay drops here and restores the directories
                drop(overlay);
                self.state_tx.send_replace(LaunchState::Error);
                return Err(LaunchError::Spawn(e));
            }
        };

        let kill = cancel.child_token();
        *self.kill.lock().unwrap_or_else(|e| e.into_inner()) = Some(kill.clone());
        self.state_tx.send_replace(LaunchState::Launched);

        tokio::spawn(watch_exit(
            child,
            overlay,
            kill,
            Arc::clone(&self.state_tx),
        ));
        Ok(())
    }

    /// Ask the running process to go away.
    ///
    /// Directory restoration happens in the exit watcher, so callers
    /// observing the state channel see `Exited` only after the user's
    /// directories are back.
    pub fn exit(&self) {
        if let Some(kill) = self
            .kill
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            kill.cancel();
        }
    }
}

/// Wait for the child to exit (or be killed), then release the overlay
async fn watch_exit(
    mut child: tokio::process::Child,
    overlay: ConfigOverlay,
    kill: CancellationToken,
    state_tx: Arc<watch::Sender<LaunchState>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            tracing::info!("Stopping the game process");
            if let Err(e) = child.kill().await {
                tracing::warn!("Killing the game process failed: {e}");
            }
            child.wait().await
        }
    };

    if let Err(e) = overlay.release() {
        tracing::error!("Restoring the game's config directories failed: {e}");
    }

    match status {
        Ok(status) if status.success() => {
            tracing::info!("Game process exited cleanly");
            state_tx.send_replace(LaunchState::Exited);
        }
        Ok(status) => {
            // A killed process reports no code on unix; treat that as
            // the expected outcome of exit(), not a failure.
            if status.code().is_none() {
                tracing::info!("Game process was terminated");
                state_tx.send_replace(LaunchState::Exited);
            } else {
                tracing::warn!("Game process exited with {status}");
                state_tx.send_replace(LaunchState::Error);
            }
        }
        Err(e) => {
            tracing::error!("Waiting for the game process failed: {e}");
            state_tx.send_replace(LaunchState::Error);
        }
    }
}
