//! Source RCON transport
//!
//! The bundled [`ConsoleTransport`] implementation. Speaks the Source
//! engine's RCON protocol: little-endian `size`/`id`/`type` header,
//! null-terminated body, one TCP connection. Multi-packet responses
//! are collected with the usual trailing-marker trick: an empty
//! follow-up packet is sent after each command and everything up to
//! its response belongs to the command.

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use ac_core::models::ConnectionSettings;

use crate::error::RconError;
use crate::rcon::{ConsoleConnection, ConsoleTransport};

const SERVERDATA_AUTH: i32 = 3;
const SERVERDATA_AUTH_RESPONSE: i32 = 2;
const SERVERDATA_EXECCOMMAND: i32 = 2;
const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Header (id + type) plus the two trailing null bytes
const PACKET_OVERHEAD: usize = 10;
/// Largest packet the Source engine will send
const MAX_PACKET_SIZE: usize = 4096;

/// One decoded RCON packet
#[derive(Debug, PartialEq)]
struct Packet {
    id: i32,
    ptype: i32,
    body: String,
}

fn encode_packet(id: i32, ptype: i32, body: &str, dst: &mut BytesMut) {
    let size = PACKET_OVERHEAD + body.len();
    dst.reserve(4 + size);
    dst.put_i32_le(size as i32);
    dst.put_i32_le(id);
    dst.put_i32_le(ptype);
    dst.put_slice(body.as_bytes());
    dst.put_u8(0);
    dst.put_u8(0);
}

/// Decode a packet body (everything after the size field)
fn decode_packet(mut buf: &[u8]) -> Result<Packet, RconError> {
    if buf.len() < PACKET_OVERHEAD {
        return Err(RconError::Protocol(format!(
            "packet too short: {} bytes",
            buf.len()
        )));
    }
    let id = buf.get_i32_le();
    let ptype = buf.get_i32_le();
    // Strip the body terminator and the packet terminator
    let body = &buf[..buf.len().saturating_sub(2)];
    Ok(Packet {
        id,
        ptype,
        body: String::from_utf8_lossy(body).into_owned(),
    })
}

/// Connects to a Source engine RCON server
#[derive(Debug, Default)]
pub struct SourceRconTransport;

impl SourceRconTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConsoleTransport for SourceRconTransport {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn ConsoleConnection>, RconError> {
        let stream = TcpStream::connect((settings.host.as_str(), settings.port)).await?;
        let mut conn = SourceRconConnection {
            stream,
            next_id: 1,
        };
        conn.authenticate(&settings.password).await?;
        Ok(Box::new(conn))
    }
}

struct SourceRconConnection {
    stream: TcpStream,
    next_id: i32,
}

impl SourceRconConnection {
    fn take_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    async fn send_packet(&mut self, id: i32, ptype: i32, body: &str) -> Result<(), RconError> {
        let mut buf = BytesMut::new();
        encode_packet(id, ptype, body, &mut buf);
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<Packet, RconError> {
        let size = self.stream.read_i32_le().await?;
        if !(PACKET_OVERHEAD as i32..=MAX_PACKET_SIZE as i32).contains(&size) {
            return Err(RconError::Protocol(format!("invalid packet size {size}")));
        }
        let mut buf = vec![0u8; size as usize];
        self.stream.read_exact(&mut buf).await?;
        decode_packet(&buf)
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        let id = self.take_id();
        self.send_packet(id, SERVERDATA_AUTH, password).await?;

        // The server may send an empty RESPONSE_VALUE before the auth
        // response; skip anything that is not the answer.
        loop {
            let packet = self.read_packet().await?;
            if packet.ptype == SERVERDATA_AUTH_RESPONSE {
                if packet.id == -1 {
                    return Err(RconError::AuthRejected);
                }
                if packet.id != id {
                    return Err(RconError::Protocol(format!(
                        "auth response for unknown id {}",
                        packet.id
                    )));
                }
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl ConsoleConnection for SourceRconConnection {
    async fn command(&mut self, line: &str) -> Result<String, RconError> {
        let id = self.take_id();
        let marker_id = self.take_id();
        self.send_packet(id, SERVERDATA_EXECCOMMAND, line).await?;
        // Empty follow-up; its response marks the end of the reply
        self.send_packet(marker_id, SERVERDATA_RESPONSE_VALUE, "")
            .await?;

        let mut response = String::new();
        loop {
            let packet = self.read_packet().await?;
            if packet.ptype != SERVERDATA_RESPONSE_VALUE {
                continue;
            }
            if packet.id == marker_id {
                return Ok(response);
            }
            if packet.id == id {
                response.push_str(&packet.body);
            }
        }
    }

    async fn close(&mut self) -> Result<(), RconError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_roundtrip() {
        let mut buf = BytesMut::new();
        encode_packet(7, SERVERDATA_EXECCOMMAND, "echo hi", &mut buf);

        let mut head = &buf[..4];
        let size = head.get_i32_le() as usize;
        assert_eq!(size, buf.len() - 4);

        let packet = decode_packet(&buf[4..]).unwrap();
        assert_eq!(
            packet,
            Packet {
                id: 7,
                ptype: SERVERDATA_EXECCOMMAND,
                body: "echo hi".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_body_roundtrip() {
        let mut buf = BytesMut::new();
        encode_packet(1, SERVERDATA_RESPONSE_VALUE, "", &mut buf);
        assert_eq!(buf.len(), 4 + PACKET_OVERHEAD);

        let packet = decode_packet(&buf[4..]).unwrap();
        assert_eq!(packet.id, 1);
        assert!(packet.body.is_empty());
    }

    #[test]
    fn test_short_packet_is_a_protocol_error() {
        let err = decode_packet(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, RconError::Protocol(_)));
    }

    /// Minimal in-process RCON server for exercising the transport
    async fn fake_server(listener: tokio::net::TcpListener, password: String) {
        let (mut stream, _) = listener.accept().await.unwrap();
        loop {
            let size = match stream.read_i32_le().await {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut buf = vec![0u8; size as usize];
            stream.read_exact(&mut buf).await.unwrap();
            let packet = decode_packet(&buf).unwrap();

            let mut out = BytesMut::new();
            match packet.ptype {
                SERVERDATA_AUTH => {
                    let id = if packet.body == password { packet.id } else { -1 };
                    encode_packet(packet.id, SERVERDATA_RESPONSE_VALUE, "", &mut out);
                    encode_packet(id, SERVERDATA_AUTH_RESPONSE, "", &mut out);
                }
                SERVERDATA_EXECCOMMAND => {
                    let body = packet
                        .body
                        .strip_prefix("echo ")
                        .map(str::to_string)
                        .unwrap_or_default();
                    encode_packet(packet.id, SERVERDATA_RESPONSE_VALUE, &body, &mut out);
                }
                SERVERDATA_RESPONSE_VALUE => {
                    encode_packet(packet.id, SERVERDATA_RESPONSE_VALUE, "", &mut out);
                }
                _ => unreachable!(),
            }
            stream.write_all(&out).await.unwrap();
        }
    }

    async fn start_server(password: &str) -> ConnectionSettings {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(fake_server(listener, password.to_string()));
        ConnectionSettings::new("127.0.0.1", port, password)
    }

    #[tokio::test]
    async fn test_connect_auth_and_command() {
        let settings = start_server("hunter2").await;

        let transport = SourceRconTransport::new();
        let mut conn = transport.connect(&settings).await.unwrap();

        let response = conn.command("echo hello").await.unwrap();
        assert_eq!(response, "hello");
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_password_is_rejected() {
        let mut settings = start_server("hunter2").await;
        settings.password = "wrong".to_string();

        let transport = SourceRconTransport::new();
        let err = transport
            .connect(&settings)
            .await
            .err()
            .expect("connect should fail");
        assert!(matches!(err, RconError::AuthRejected));
    }
}
