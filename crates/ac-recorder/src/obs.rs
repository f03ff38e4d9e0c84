//! OBS controller
//!
//! Owns the connection to the recording service and passes
//! start/stop-record through to it. The wire protocol lives behind the
//! [`RecordingService`] seam ([`crate::obs_ws`] is the bundled
//! obs-websocket implementation). Connection-state changes are
//! published on a watch channel for observers; nothing in the recorder
//! depends on them.

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use ac_core::models::ConnectionSettings;

use crate::error::ObsError;

/// Opens recording-service connections
#[async_trait]
pub trait RecordingService: Send + Sync {
    /// Connect and authenticate
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn RecordingHandle>, ObsError>;
}

/// An open recording-service connection
#[async_trait]
pub trait RecordingHandle: Send {
    async fn start_record(&mut self) -> Result<(), ObsError>;
    async fn stop_record(&mut self) -> Result<(), ObsError>;
    async fn close(&mut self) -> Result<(), ObsError>;
}

/// Connection status of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObsStatus {
    Disconnected,
    Connected,
}

/// Recording-service controller over a pluggable backend
pub struct ObsController {
    service: Box<dyn RecordingService>,
    handle: Mutex<Option<Box<dyn RecordingHandle>>>,
    settings: std::sync::Mutex<Option<ConnectionSettings>>,
    status_tx: watch::Sender<ObsStatus>,
}

impl ObsController {
    /// Create a controller over the given backend
    pub fn new(service: Box<dyn RecordingService>) -> Self {
        let (status_tx, _) = watch::channel(ObsStatus::Disconnected);
        Self {
            service,
            handle: Mutex::new(None),
            settings: std::sync::Mutex::new(None),
            status_tx,
        }
    }

    /// Whether a connection is currently up
    pub fn is_connected(&self) -> bool {
        *self.status_tx.borrow() == ObsStatus::Connected
    }

    /// Watch connection-state changes
    pub fn subscribe(&self) -> watch::Receiver<ObsStatus> {
        self.status_tx.subscribe()
    }

    /// Store settings for a later `connect(None)`.
    ///
    /// Settings cannot be altered while connected.
    pub fn set_connection_settings(&self, settings: ConnectionSettings) -> Result<(), ObsError> {
        if self.is_connected() {
            return Err(ObsError::SettingsLocked);
        }
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = Some(settings);
        Ok(())
    }

    /// Connect using the given settings, or the stored ones.
    ///
    /// A no-op if already connected.
    pub async fn connect(&self, settings: Option<&ConnectionSettings>) -> Result<(), ObsError> {
        if self.is_connected() {
            return Ok(());
        }

        let settings = match settings {
            Some(s) => {
                self.set_connection_settings(s.clone())?;
                s.clone()
            }
            None => self
                .settings
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
                .ok_or(ObsError::NoSettings)?,
        };

        let handle = self.service.connect(&settings).await?;
        *self.handle.lock().await = Some(handle);
        self.status_tx.send_replace(ObsStatus::Connected);
        tracing::info!("Connected to OBS at {}", settings.address());
        Ok(())
    }

    /// Close the connection if one is up
    pub async fn disconnect(&self) -> Result<(), ObsError> {
        if let Some(mut handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.close().await {
                tracing::debug!("OBS close reported: {e}");
            }
            tracing::info!("Disconnected from OBS");
        }
        self.status_tx.send_replace(ObsStatus::Disconnected);
        Ok(())
    }

    /// Tell OBS to start recording
    pub async fn start_recording(&self) -> Result<(), ObsError> {
        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or(ObsError::NotConnected)?;
        handle.start_record().await
    }

    /// Tell OBS to stop recording
    pub async fn stop_recording(&self) -> Result<(), ObsError> {
        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or(ObsError::NotConnected)?;
        handle.stop_record().await
    }
}
