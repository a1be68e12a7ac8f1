//! Wake-on-LAN magic-packet relay.
//!
//! Deliberately built on blocking `std::net` rather than the async/axum
//! stack seen elsewhere in the wider corpus: the relay serves exactly one
//! endpoint on an internal network and the rest of this control plane is
//! single-threaded and synchronous throughout; pulling in an async runtime
//! for one handler would be the only async code in the crate.

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, UdpSocket},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    constants::{MAGIC_PACKET_LEN, MAGIC_PACKET_MAC_REPEATS, WOL_PORTS, WOL_READ_TIMEOUT},
    runtime,
};

/// On-disk `wol_config.json` inside the config directory: the shared key
/// `POST /wake` requests must present. Preserved by `PurgeAll(remove_configs=false)`.
#[derive(Debug, Deserialize)]
struct WolConfig {
    shared_key: String,
}

/// Loads the relay's shared key from `<config_dir>/wol_config.json`.
pub fn load_shared_key() -> Result<String, WolError> {
    let path = runtime::config_dir().join("wol_config.json");
    let bytes = std::fs::read(&path)?;
    let config: WolConfig =
        serde_json::from_slice(&bytes).map_err(|err| WolError::MalformedBody(err.to_string()))?;
    Ok(config.shared_key)
}

/// Errors raised by the WoL relay.
#[derive(Debug, Error)]
pub enum WolError {
    /// The supplied MAC address was not six colon- or hyphen-separated hex octets.
    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),

    /// The request's `key` field did not match the configured shared key.
    #[error("invalid or missing shared key")]
    InvalidKey,

    /// The request body was not valid JSON, or was missing required fields.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// Underlying I/O failure sending the magic packet or running the listener.
    #[error("WoL I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request body accepted by `POST /wake`.
#[derive(Debug, Deserialize)]
struct WakeRequest {
    mac: String,
    broadcast: Option<String>,
    #[serde(default)]
    key: String,
}

/// Response body emitted by `POST /wake`.
#[derive(Debug, Serialize)]
struct WakeResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// A parsed 6-byte MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Parses a MAC address written as `aa:bb:cc:dd:ee:ff` or
    /// `aa-bb-cc-dd-ee-ff` (case-insensitive).
    pub fn parse(raw: &str) -> Result<Self, WolError> {
        let normalized = raw.replace('-', ":");
        let parts: Vec<&str> = normalized.split(':').collect();
        if parts.len() != 6 {
            return Err(WolError::InvalidMac(raw.to_string()));
        }
        let mut bytes = [0u8; 6];
        for (idx, part) in parts.iter().enumerate() {
            bytes[idx] = u8::from_str_radix(part, 16).map_err(|_| WolError::InvalidMac(raw.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Renders the address in canonical lowercase colon-separated form.
    pub fn to_canonical_string(&self) -> String {
        self.0
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Builds a 102-byte Wake-on-LAN magic packet: 6 bytes of `0xFF` followed
/// by the target MAC repeated 16 times.
fn build_magic_packet(mac: MacAddress) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0u8; MAGIC_PACKET_LEN];
    packet[0..6].copy_from_slice(&[0xFF; 6]);
    for i in 0..MAGIC_PACKET_MAC_REPEATS {
        let start = 6 + i * 6;
        packet[start..start + 6].copy_from_slice(&mac.0);
    }
    packet
}

/// Sends a magic packet for `mac` as a UDP broadcast to `broadcast_addr` on
/// every port in [`WOL_PORTS`]: sent twice, ports 7 and 9.
pub fn send_magic_packet_to(mac: MacAddress, broadcast_addr: Ipv4Addr) -> Result<(), WolError> {
    let packet = build_magic_packet(mac);
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_broadcast(true)?;

    for port in WOL_PORTS {
        socket.send_to(&packet, (broadcast_addr, *port))?;
    }
    info!("sent WoL magic packet for {}", mac.to_canonical_string());
    Ok(())
}

/// Sends a magic packet for `mac` as a limited UDP broadcast
/// (`255.255.255.255`) on every port in [`WOL_PORTS`].
pub fn send_magic_packet(mac: MacAddress) -> Result<(), WolError> {
    send_magic_packet_to(mac, Ipv4Addr::BROADCAST)
}

/// A minimal blocking HTTP/1.1 server exposing a single `POST /wake`
/// endpoint: JSON in, JSON out, a shared-key check gating everything else.
/// The key check precedes any other work.
pub struct WolRelay {
    listener: TcpListener,
    shared_key: String,
}

impl WolRelay {
    /// Binds the relay to `addr`, requiring `shared_key` on every request.
    pub fn bind(addr: SocketAddr, shared_key: String) -> Result<Self, WolError> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, shared_key })
    }

    /// Local address the relay is bound to, for logging/tests.
    pub fn local_addr(&self) -> Result<SocketAddr, WolError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves exactly one request then returns, used by tests and by the
    /// CLI's one-shot `wol-send --listen` mode.
    pub fn serve_one(&self) -> Result<(), WolError> {
        let (stream, _peer) = self.listener.accept()?;
        handle_connection(stream, &self.shared_key)
    }

    /// Serves requests in a loop until the process is terminated.
    pub fn serve_forever(&self) -> Result<(), WolError> {
        loop {
            let (stream, peer) = self.listener.accept()?;
            if let Err(err) = handle_connection(stream, &self.shared_key) {
                warn!("WoL relay: error handling request from {peer}: {err}");
            }
        }
    }
}

fn handle_connection(mut stream: TcpStream, shared_key: &str) -> Result<(), WolError> {
    stream.set_read_timeout(Some(WOL_READ_TIMEOUT))?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    let mut content_length = 0usize;
    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line)? == 0 || header_line.trim().is_empty() {
            break;
        }
        if let Some(value) = header_line
            .to_ascii_lowercase()
            .strip_prefix("content-length:")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body)?;
    }

    let path = parse_request_path(&request_line);
    let response = if path != "/wake" {
        json_response(404, &WakeResponse { status: "error".into(), error: Some("not found".into()) })
    } else {
        match handle_wake(&body, shared_key) {
            Ok(()) => json_response(200, &WakeResponse { status: "ok".into(), error: None }),
            Err(WolError::InvalidKey) => json_response(
                401,
                &WakeResponse { status: "error".into(), error: Some(WolError::InvalidKey.to_string()) },
            ),
            Err(err) => json_response(400, &WakeResponse { status: "error".into(), error: Some(err.to_string()) }),
        }
    };

    stream.write_all(response.as_bytes())?;
    Ok(())
}

/// Validates the shared key first, then the MAC, then sends the packet, in
/// that order, so an unauthenticated request never reaches MAC parsing or
/// the network.
fn handle_wake(body: &[u8], shared_key: &str) -> Result<(), WolError> {
    let request: WakeRequest =
        serde_json::from_slice(body).map_err(|err| WolError::MalformedBody(err.to_string()))?;

    if request.key != shared_key {
        return Err(WolError::InvalidKey);
    }

    let mac = MacAddress::parse(&request.mac)?;
    let broadcast = match request.broadcast {
        Some(addr) => addr
            .parse::<Ipv4Addr>()
            .map_err(|_| WolError::MalformedBody(format!("invalid broadcast address '{addr}'")))?,
        None => Ipv4Addr::BROADCAST,
    };
    send_magic_packet_to(mac, broadcast)
}

fn parse_request_path(line: &str) -> String {
    let mut parts = line.split_whitespace();
    let _method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/");
    target.split_once('?').map(|(path, _)| path).unwrap_or(target).to_string()
}

fn json_response(status: u16, body: &WakeResponse) -> String {
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        400 => "Bad Request",
        _ => "Internal Server Error",
    };
    let payload = serde_json::to_string(body).unwrap_or_else(|_| "{\"status\":\"error\"}".to_string());
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    )
}

/// Test helper re-exported for the integration suite.
pub fn default_listen_timeout() -> Duration {
    WOL_READ_TIMEOUT
}
