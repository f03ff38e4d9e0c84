//! obs-websocket backend
//!
//! The bundled [`RecordingService`] implementation, speaking
//! obs-websocket protocol 5: the server opens with a `Hello` (op 0),
//! the client answers with `Identify` (op 1) carrying the challenge
//! response when authentication is enabled, and the server confirms
//! with `Identified` (op 2). After that, requests go out as op 6 and
//! responses come back as op 7, correlated by request id.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use ac_core::models::ConnectionSettings;

use crate::error::ObsError;
use crate::obs::{RecordingHandle, RecordingService};

const RPC_VERSION: u32 = 1;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to an obs-websocket server
#[derive(Debug, Default)]
pub struct ObsWebSocketService;

impl ObsWebSocketService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RecordingService for ObsWebSocketService {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn RecordingHandle>, ObsError> {
        let url = format!("ws://{}", settings.address());
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ObsError::Connect(e.to_string()))?;

        let mut handle = ObsWebSocketHandle { stream };
        handle.identify(&settings.password).await?;
        Ok(Box::new(handle))
    }
}

struct ObsWebSocketHandle {
    stream: WsStream,
}

impl ObsWebSocketHandle {
    async fn identify(&mut self, password: &str) -> Result<(), ObsError> {
        let hello = self.read_message().await?;
        if hello["op"] != 0 {
            return Err(ObsError::Auth(format!(
                "expected Hello, got op {}",
                hello["op"]
            )));
        }

        let mut identify = json!({
            "op": 1,
            "d": { "rpcVersion": RPC_VERSION },
        });
        if let Some(auth) = hello["d"].get("authentication") {
            let challenge = auth["challenge"]
                .as_str()
                .ok_or_else(|| ObsError::Auth("Hello without challenge".into()))?;
            let salt = auth["salt"]
                .as_str()
                .ok_or_else(|| ObsError::Auth("Hello without salt".into()))?;
            identify["d"]["authentication"] = json!(auth_token(password, salt, challenge));
        }

        self.send_json(&identify).await?;

        let identified = self.read_message().await?;
        if identified["op"] != 2 {
            return Err(ObsError::Auth(format!(
                "identify rejected: op {}",
                identified["op"]
            )));
        }
        Ok(())
    }

    /// Issue a request (op 6) and wait for its response (op 7)
    async fn request(&mut self, request_type: &str) -> Result<(), ObsError> {
        let request_id = Uuid::new_v4().to_string();
        self.send_json(&json!({
            "op": 6,
            "d": {
                "requestType": request_type,
                "requestId": request_id,
            },
        }))
        .await?;

        // Events (op 5) may interleave with the response
        loop {
            let msg = self.read_message().await?;
            if msg["op"] != 7 || msg["d"]["requestId"] != request_id.as_str() {
                continue;
            }
            let status = &msg["d"]["requestStatus"];
            if status["result"] == true {
                return Ok(());
            }
            return Err(ObsError::Service(format!(
                "{request_type} failed: {}",
                status["comment"].as_str().unwrap_or("unknown reason")
            )));
        }
    }

    async fn send_json(&mut self, value: &Value) -> Result<(), ObsError> {
        self.stream
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| ObsError::Connect(e.to_string()))
    }

    async fn read_message(&mut self) -> Result<Value, ObsError> {
        while let Some(msg) = self.stream.next().await {
            match msg.map_err(|e| ObsError::Connect(e.to_string()))? {
                Message::Text(text) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| ObsError::Service(format!("malformed message: {e}")))
                }
                Message::Close(_) => break,
                _ => continue,
            }
        }
        Err(ObsError::Connect("connection closed".into()))
    }
}

#[async_trait]
impl RecordingHandle for ObsWebSocketHandle {
    async fn start_record(&mut self) -> Result<(), ObsError> {
        self.request("StartRecord").await
    }

    async fn stop_record(&mut self) -> Result<(), ObsError> {
        self.request("StopRecord").await
    }

    async fn close(&mut self) -> Result<(), ObsError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ObsError::Connect(e.to_string()))
    }
}

/// Challenge response: `b64(sha256(b64(sha256(password + salt)) + challenge))`
fn auth_token(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}")));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_token_matches_known_vector() {
        // Derived by hand from the documented scheme
        let token = auth_token("supersecretpassword", "PZVbYpvAnZut2SS6JNJytDm9", "ztTBnnuqrqaKDzRM3xcVdbYm");
        assert_eq!(token, "zZgWipvwSGrw748kHN4gNpBC1IaeiiWX3Hjkrm849Sc=");
    }

    #[test]
    fn test_auth_token_depends_on_every_input() {
        let base = auth_token("pw", "salt", "challenge");
        assert_ne!(base, auth_token("pw2", "salt", "challenge"));
        assert_ne!(base, auth_token("pw", "salt2", "challenge"));
        assert_ne!(base, auth_token("pw", "salt", "challenge2"));
    }
}
