//! Demo recorder state machine
//!
//! [`DemoRecorder`] drains a FIFO queue of demo files, driving the
//! recording service, the game process and the console connection
//! through an explicit state loop: each call to [`step`] consumes the
//! current state and returns the next one, and every transition is
//! published on a watch channel. The setup states are idempotent, so
//! each queue item passes through the full chain and only pays for
//! whatever is not already up.
//!
//! [`step`]: DemoRecorder::step

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use ac_core::config::AppConfig;
use ac_core::models::DemoFileInfo;

use crate::error::RecorderError;
use crate::launcher::{GameLauncher, LaunchState};
use crate::logwatch;
use crate::obs::ObsController;
use crate::rcon::{RconClient, RconStatus};

/// Line the game writes to its console log when playback ends
pub const DEMO_FINISHED_MARKER: &str = "Demo playback finished";
/// Echo probe that only completes once the demo has loaded
const DEMO_LOADED_PROBE: &str = "Demo Loaded!";
/// Console command that resumes a paused demo
const DEMO_RESUME_COMMAND: &str = "demo_resume";

/// Where the recorder is in the capture cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    /// Connecting to the recording service
    ObsSetup,
    /// Applying the config overlay and launching the game
    GameSetup,
    /// Connecting the console and starting the log monitor
    RconSetup,
    /// Everything is up; picks the next demo or finishes
    AllReady,
    /// `playdemo` sent, waiting for the demo to load
    DemoLoad,
    /// Demo loaded; starting capture and resuming playback
    DemoReady,
    /// Capturing until the playback-finished marker appears
    Recording,
}

/// Per-run working set carried between steps
struct RunContext {
    queue: VecDeque<DemoFileInfo>,
    current: Option<DemoFileInfo>,
}

/// Drives one demo queue through capture
pub struct DemoRecorder {
    config: AppConfig,
    rcon: RconClient,
    obs: ObsController,
    launcher: GameLauncher,
    state_tx: watch::Sender<RecorderState>,
    monitor: std::sync::Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl DemoRecorder {
    pub fn new(
        config: AppConfig,
        rcon: RconClient,
        obs: ObsController,
        launcher: GameLauncher,
    ) -> Self {
        let (state_tx, _) = watch::channel(RecorderState::Idle);
        Self {
            config,
            rcon,
            obs,
            launcher,
            state_tx,
            monitor: std::sync::Mutex::new(None),
        }
    }

    /// Current state
    pub fn state(&self) -> RecorderState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<RecorderState> {
        self.state_tx.subscribe()
    }

    /// Build the FIFO work queue
    pub fn to_queue(demos: Vec<DemoFileInfo>) -> VecDeque<DemoFileInfo> {
        demos.into()
    }

    /// Record every demo in the queue, in order.
    ///
    /// However the run ends, everything is torn down and the recorder
    /// finishes `Idle`; the first error (or cancellation) surfaces
    /// after that.
    pub async fn record_demos(
        &self,
        demos: Vec<DemoFileInfo>,
        cancel: &CancellationToken,
    ) -> Result<(), RecorderError> {
        let run = self.run_queue(Self::to_queue(demos), cancel);
        tokio::pin!(run);
        let result = tokio::select! {
            result = &mut run => result,
            _ = cancel.cancelled() => Err(RecorderError::Cancelled),
        };

        if let Err(ref e) = result {
            tracing::error!("Recording run failed: {e}");
        }
        self.stop_all().await;
        self.set_state(RecorderState::Idle);
        result
    }

    async fn run_queue(
        &self,
        queue: VecDeque<DemoFileInfo>,
        cancel: &CancellationToken,
    ) -> Result<(), RecorderError> {
        let mut ctx = RunContext {
            queue,
            current: None,
        };
        let mut state = RecorderState::ObsSetup;
        loop {
            self.set_state(state);
            match self.step(state, &mut ctx, cancel).await? {
                Some(next) => state = next,
                None => return Ok(()),
            }
        }
    }

    /// Run one state and return the next, or `None` when the queue is
    /// drained.
    async fn step(
        &self,
        state: RecorderState,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<Option<RecorderState>, RecorderError> {
        let timeouts = &self.config.timeouts;
        match state {
            RecorderState::Idle => Ok(None),

            RecorderState::ObsSetup => {
                timeout(timeouts.obs_connect, self.obs.connect(Some(&self.config.obs)))
                    .await
                    .map_err(|_| RecorderError::SetupTimeout("OBS"))??;
                Ok(Some(RecorderState::GameSetup))
            }

            RecorderState::GameSetup => {
                if self.launcher.state() != LaunchState::Launched {
                    timeout(
                        timeouts.game_launch,
                        self.launcher.launch(
                            &self.config.game.exe_path,
                            &self.config.game.dir_path,
                            &self.config.game.managed_dir,
                            &self.config.game.args,
                            cancel,
                        ),
                    )
                    .await
                    .map_err(|_| RecorderError::SetupTimeout("game launch"))??;
                }
                Ok(Some(RecorderState::RconSetup))
            }

            RecorderState::RconSetup => {
                self.connect_rcon_with_retry(timeouts.rcon_connect, timeouts.retry_interval)
                    .await?;
                self.start_monitor()?;
                if ctx.current.is_some() {
                    Ok(Some(RecorderState::DemoLoad))
                } else {
                    Ok(Some(RecorderState::AllReady))
                }
            }

            RecorderState::AllReady => match ctx.queue.pop_front() {
                Some(item) => {
                    tracing::info!("Next demo: {}", item.file_name());
                    ctx.current = Some(item);
                    Ok(Some(RecorderState::ObsSetup))
                }
                None => {
                    tracing::info!("Demo queue drained");
                    Ok(None)
                }
            },

            RecorderState::DemoLoad => {
                let item = ctx
                    .current
                    .as_ref()
                    .ok_or(RecorderError::SetupFailed("no demo selected"))?;
                let path = item.demo_path_str();

                let response = timeout(
                    timeouts.command,
                    self.rcon.send_command(&format!("playdemo \"{path}\"")),
                )
                .await
                .map_err(|_| RecorderError::CommandTimeout("playdemo"))??;
                if !response.contains(&format!("Playing demo from {path}")) {
                    return Err(RecorderError::DemoLoadFailed(response));
                }

                // The console stalls while the map loads, so an echo
                // that comes back proves the demo is in.
                tokio::time::sleep(timeouts.load_settle).await;
                let probe = timeout(
                    timeouts.load_probe,
                    self.rcon.send_command(&format!("echo {DEMO_LOADED_PROBE}")),
                )
                .await
                .map_err(|_| RecorderError::CommandTimeout("demo load probe"))??;
                if !probe.contains(DEMO_LOADED_PROBE) {
                    return Err(RecorderError::DemoLoadFailed(probe));
                }
                Ok(Some(RecorderState::DemoReady))
            }

            RecorderState::DemoReady => {
                self.obs.start_recording().await?;
                timeout(timeouts.command, self.rcon.send_command(DEMO_RESUME_COMMAND))
                    .await
                    .map_err(|_| RecorderError::CommandTimeout(DEMO_RESUME_COMMAND))??;
                Ok(Some(RecorderState::Recording))
            }

            RecorderState::Recording => {
                let monitor = self
                    .monitor
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take()
                    .ok_or(RecorderError::Monitor("log monitor not running".into()))?;
                monitor
                    .await
                    .map_err(|e| RecorderError::Monitor(e.to_string()))?
                    .map_err(|e| RecorderError::Monitor(e.to_string()))?;

                self.obs.stop_recording().await?;
                if let Some(item) = ctx.current.take() {
                    tracing::info!("Finished recording {}", item.file_name());
                }
                Ok(Some(RecorderState::AllReady))
            }
        }
    }

    /// Keep trying to connect the console until it sticks.
    ///
    /// The status is checked before each attempt, so a connection that
    /// is already up (from an earlier queue item) passes straight
    /// through.
    async fn connect_rcon_with_retry(
        &self,
        budget: Duration,
        interval: Duration,
    ) -> Result<(), RecorderError> {
        timeout(budget, async {
            loop {
                if self.rcon.status() == RconStatus::Connected {
                    return;
                }
                if let Err(e) = self.rcon.connect(&self.config.rcon).await {
                    tracing::debug!("RCON connect attempt failed: {e}");
                }
                tokio::time::sleep(interval).await;
            }
        })
        .await
        .map_err(|_| RecorderError::SetupTimeout("RCON"))
    }

    /// Start (or restart) the playback-finished monitor at the log
    /// file's current end.
    fn start_monitor(&self) -> Result<(), RecorderError> {
        let log_path = self.config.game.console_log_path();
        let offset = std::fs::metadata(&log_path).map(|m| m.len()).unwrap_or(0);
        let handle = tokio::spawn(async move {
            logwatch::wait_for_marker(log_path, DEMO_FINISHED_MARKER, offset).await
        });

        let mut guard = self.monitor.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = guard.replace(handle) {
            old.abort();
        }
        Ok(())
    }

    /// Tear everything down. Never raises; failures are logged.
    pub async fn stop_all(&self) {
        self.launcher.exit();

        if self.obs.is_connected() {
            if let Err(e) = self.obs.stop_recording().await {
                tracing::debug!("Stopping the recording during teardown reported: {e}");
            }
        }
        if let Err(e) = self.rcon.disconnect().await {
            tracing::debug!("RCON disconnect during teardown reported: {e}");
        }
        if let Err(e) = self.obs.disconnect().await {
            tracing::debug!("OBS disconnect during teardown reported: {e}");
        }

        if let Some(monitor) = self
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            monitor.abort();
        }
    }

    fn set_state(&self, state: RecorderState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::info!("Recorder state: {previous:?} -> {state:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_core::models::DemoFileInfo;

    #[test]
    fn test_to_queue_preserves_order() {
        let demos = vec![
            DemoFileInfo::new("/demos/a.dem"),
            DemoFileInfo::new("/demos/b.dem"),
            DemoFileInfo::new("/demos/c.dem"),
        ];
        let queue = DemoRecorder::to_queue(demos);
        let names: Vec<_> = queue.iter().map(DemoFileInfo::file_name).collect();
        assert_eq!(names, ["a.dem", "b.dem", "c.dem"]);
    }
}
