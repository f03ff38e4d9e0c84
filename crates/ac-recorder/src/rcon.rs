//! RCON client
//!
//! Owns the single control connection into the launched game. The
//! connect/disconnect transition is serialized by one async mutex
//! gate; status reads never take the gate. The wire protocol itself
//! lives behind the [`ConsoleTransport`] seam ([`crate::srcon`] is the
//! bundled implementation).

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;

use ac_core::config::TimeoutConfig;
use ac_core::models::ConnectionSettings;

use crate::error::RconError;

/// Token echoed right after connect to prove the console answers us
pub const HANDSHAKE_TOKEN: &str = "autoclipper has connected to RCON.";

/// Opens console connections
#[async_trait]
pub trait ConsoleTransport: Send + Sync {
    /// Open and authenticate a connection
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn ConsoleConnection>, RconError>;
}

/// An open console connection
#[async_trait]
pub trait ConsoleConnection: Send {
    /// Send one command line and return the response text
    async fn command(&mut self, line: &str) -> Result<String, RconError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), RconError>;
}

/// Connection status, readable without taking the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RconStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// RCON client over a pluggable transport
pub struct RconClient {
    transport: Box<dyn ConsoleTransport>,
    timeouts: TimeoutConfig,
    /// Serializes connect/disconnect; held across the whole transition
    gate: Mutex<()>,
    conn: Mutex<Option<Box<dyn ConsoleConnection>>>,
    settings: std::sync::Mutex<Option<ConnectionSettings>>,
    status_tx: watch::Sender<RconStatus>,
}

impl RconClient {
    /// Create a client over the given transport
    pub fn new(transport: Box<dyn ConsoleTransport>, timeouts: TimeoutConfig) -> Self {
        let (status_tx, _) = watch::channel(RconStatus::Disconnected);
        Self {
            transport,
            timeouts,
            gate: Mutex::new(()),
            conn: Mutex::new(None),
            settings: std::sync::Mutex::new(None),
            status_tx,
        }
    }

    /// Current connection status
    pub fn status(&self) -> RconStatus {
        *self.status_tx.borrow()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<RconStatus> {
        self.status_tx.subscribe()
    }

    /// Settings of the current connection, if any
    pub fn settings(&self) -> Option<ConnectionSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_status(&self, status: RconStatus) {
        self.status_tx.send_replace(status);
    }

    fn set_settings(&self, settings: Option<ConnectionSettings>) {
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = settings;
    }

    /// Connect and verify the console answers.
    ///
    /// Fails fast if a connection already exists; its settings cannot
    /// be replaced without disconnecting first. After the transport is
    /// up, a fixed echo token must come back within the handshake
    /// budget. A mismatched (or absent) echo is logged and leaves the
    /// status `Disconnected` without raising; the next connect attempt
    /// replaces the stale transport.
    pub async fn connect(&self, settings: &ConnectionSettings) -> Result<(), RconError> {
        let _gate = timeout(self.timeouts.gate_connect, self.gate.lock())
            .await
            .map_err(|_| RconError::GateBusy)?;

        match self.status() {
            RconStatus::Connected | RconStatus::Connecting => {
                return Err(RconError::AlreadyConnected)
            }
            RconStatus::Disconnected => {}
        }

        self.set_status(RconStatus::Connecting);
        self.set_settings(Some(settings.clone()));

        let mut conn = match timeout(
            self.timeouts.gate_connect,
            self.transport.connect(settings),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                self.set_settings(None);
                self.set_status(RconStatus::Disconnected);
                return Err(e);
            }
            Err(_) => {
                self.set_settings(None);
                self.set_status(RconStatus::Disconnected);
                return Err(RconError::ConnectTimeout);
            }
        };

        tracing::info!("RCON connected to {} on port {}", settings.host, settings.port);

        let handshake = format!("echo {HANDSHAKE_TOKEN}");
        match timeout(self.timeouts.handshake, conn.command(&handshake)).await {
            Ok(Ok(response)) if response.trim() == HANDSHAKE_TOKEN => {
                *self.conn.lock().await = Some(conn);
                self.set_status(RconStatus::Connected);
                Ok(())
            }
            Ok(Ok(response)) => {
                tracing::error!(
                    "RCON echo response did not match the expected token: {response:?}"
                );
                *self.conn.lock().await = Some(conn);
                self.set_status(RconStatus::Disconnected);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_settings(None);
                self.set_status(RconStatus::Disconnected);
                Err(e)
            }
            Err(_) => {
                tracing::error!("RCON echo handshake got no response in time");
                *self.conn.lock().await = Some(conn);
                self.set_status(RconStatus::Disconnected);
                Ok(())
            }
        }
    }

    /// Send a command over the current connection.
    ///
    /// Fails fast if not connected; transport errors propagate.
    pub async fn send_command(&self, line: &str) -> Result<String, RconError> {
        if self.status() != RconStatus::Connected {
            return Err(RconError::NotConnected);
        }
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(RconError::NotConnected)?;
        conn.command(line).await
    }

    /// Close the current connection
    pub async fn disconnect(&self) -> Result<(), RconError> {
        let _gate = timeout(self.timeouts.gate_disconnect, self.gate.lock())
            .await
            .map_err(|_| RconError::GateBusy)?;

        if self.status() == RconStatus::Disconnected {
            return Err(RconError::NotConnected);
        }

        tracing::info!("Disconnecting RCON");
        if let Some(mut conn) = self.conn.lock().await.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!("RCON close reported: {e}");
            }
        }
        self.set_settings(None);
        self.set_status(RconStatus::Disconnected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Transport whose connections echo back `echo` arguments, with
    /// adjustable connect behavior.
    struct MockTransport {
        /// Delay applied to every connect call
        connect_delay: Duration,
        /// Fail every connect attempt
        fail_connect: bool,
        /// Corrupt the handshake echo
        garble_echo: bool,
        /// How many connects are currently inside the transport
        in_connect: Arc<AtomicUsize>,
        /// Highest concurrent connect count observed
        max_in_connect: Arc<AtomicUsize>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                connect_delay: Duration::ZERO,
                fail_connect: false,
                garble_echo: false,
                in_connect: Arc::new(AtomicUsize::new(0)),
                max_in_connect: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    struct MockConnection {
        garble_echo: bool,
    }

    #[async_trait]
    impl ConsoleTransport for MockTransport {
        async fn connect(
            &self,
            _settings: &ConnectionSettings,
        ) -> Result<Box<dyn ConsoleConnection>, RconError> {
            let current = self.in_connect.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_connect.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.connect_delay).await;
            self.in_connect.fetch_sub(1, Ordering::SeqCst);
            if self.fail_connect {
                return Err(RconError::Protocol("connection refused".into()));
            }
            Ok(Box::new(MockConnection {
                garble_echo: self.garble_echo,
            }))
        }
    }

    #[async_trait]
    impl ConsoleConnection for MockConnection {
        async fn command(&mut self, line: &str) -> Result<String, RconError> {
            if let Some(rest) = line.strip_prefix("echo ") {
                if self.garble_echo {
                    return Ok(format!("{rest} (garbled)"));
                }
                return Ok(rest.to_string());
            }
            Ok(String::new())
        }

        async fn close(&mut self) -> Result<(), RconError> {
            Ok(())
        }
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings::new("127.0.0.1", 27015, "hunter2")
    }

    fn client(transport: MockTransport) -> RconClient {
        RconClient::new(Box::new(transport), TimeoutConfig::default())
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let rcon = client(MockTransport::new());
        rcon.connect(&settings()).await.unwrap();
        assert_eq!(rcon.status(), RconStatus::Connected);
        assert_eq!(rcon.settings(), Some(settings()));

        let response = rcon.send_command("echo hi").await.unwrap();
        assert_eq!(response, "hi");
    }

    #[tokio::test]
    async fn test_connect_while_connected_fails_fast() {
        let rcon = client(MockTransport::new());
        rcon.connect(&settings()).await.unwrap();

        let err = rcon.connect(&settings()).await.unwrap_err();
        assert!(matches!(err, RconError::AlreadyConnected));
    }

    #[tokio::test]
    async fn test_send_without_connection_fails_fast() {
        let rcon = client(MockTransport::new());
        let err = rcon.send_command("status").await.unwrap_err();
        assert!(matches!(err, RconError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_raises() {
        let rcon = client(MockTransport::new());
        let err = rcon.disconnect().await.unwrap_err();
        assert!(matches!(err, RconError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_resets_state() {
        let rcon = client(MockTransport::new());
        rcon.connect(&settings()).await.unwrap();
        rcon.disconnect().await.unwrap();

        assert_eq!(rcon.status(), RconStatus::Disconnected);
        assert!(rcon.settings().is_none());
        assert!(matches!(
            rcon.send_command("status").await.unwrap_err(),
            RconError::NotConnected
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_raises_and_resets() {
        let mut transport = MockTransport::new();
        transport.fail_connect = true;
        let rcon = client(transport);

        let err = rcon.connect(&settings()).await.unwrap_err();
        assert!(matches!(err, RconError::Protocol(_)));
        assert_eq!(rcon.status(), RconStatus::Disconnected);
        assert!(rcon.settings().is_none());
    }

    #[tokio::test]
    async fn test_handshake_mismatch_leaves_disconnected_without_raising() {
        let mut transport = MockTransport::new();
        transport.garble_echo = true;
        let rcon = client(transport);

        rcon.connect(&settings()).await.unwrap();
        assert_eq!(rcon.status(), RconStatus::Disconnected);
        // Commands still fail fast; the stale transport is unusable
        assert!(matches!(
            rcon.send_command("status").await.unwrap_err(),
            RconError::NotConnected
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_blocks_disconnect_while_connecting() {
        let mut transport = MockTransport::new();
        transport.connect_delay = Duration::from_secs(3600);
        let rcon = Arc::new(client(transport));

        let connecting = Arc::clone(&rcon);
        let connect_task = tokio::spawn(async move { connecting.connect(&settings()).await });
        // Let the connect task take the gate
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = rcon.disconnect().await.unwrap_err();
        assert!(matches!(err, RconError::GateBusy));

        connect_task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_calls_never_overlap_in_transport() {
        let transport = MockTransport {
            connect_delay: Duration::from_millis(50),
            ..MockTransport::new()
        };
        let max_in_connect = Arc::clone(&transport.max_in_connect);
        let rcon = Arc::new(client(transport));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let rcon = Arc::clone(&rcon);
            tasks.push(tokio::spawn(async move {
                let _ = rcon.connect(&settings()).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_in_connect.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_connect_timeout() {
        let transport = MockTransport {
            connect_delay: Duration::from_secs(3600),
            ..MockTransport::new()
        };
        let rcon = client(transport);

        let err = rcon.connect(&settings()).await.unwrap_err();
        assert!(matches!(err, RconError::ConnectTimeout));
        assert_eq!(rcon.status(), RconStatus::Disconnected);
    }
}
