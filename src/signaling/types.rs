use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling errors, shared by the core and the WebSocket transport
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("space full: {0}")]
    SpaceFull(SessionId),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("peer gone: {0}")]
    PeerGone(ConnectionId),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Path prefix under which every call lives.
pub const CALL_PATH_PREFIX: &str = "/call/";

const CONNECTION_ID_LEN: usize = 21;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Session identifier: the `{id}` part of `/call/{id}`, compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Extract the session identifier from a request path of the form `/call/{id}`.
    pub fn from_path(path: &str) -> Result<Self, SignalingError> {
        match path.strip_prefix(CALL_PATH_PREFIX) {
            Some(id) if !id.is_empty() => Ok(Self(Arc::from(id))),
            _ => Err(SignalingError::InvalidPath(path.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

/// Connection ID: 21-byte fixed array ("conn_" + 16 hex)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    bytes: [u8; CONNECTION_ID_LEN],
}

impl ConnectionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        bytes[..5].copy_from_slice(b"conn_");

        let mut rng = rand::rng();
        let value: u64 = rng.random();

        for i in 0..16 {
            let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
            bytes[5 + i] = HEX_CHARS[nibble];
        }
        Self { bytes }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// Handle to one client socket, as seen by the session core.
///
/// Cloning is cheap; every clone refers to the same socket. The core never
/// owns the socket itself: it can only queue text for the writer task and
/// ask the read loop to shut down.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    session: SessionId,
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<OutboundMessage>,
    closer: Arc<watch::Sender<bool>>,
}

impl Connection {
    /// Create a handle plus the receiving ends the transport drives.
    pub fn open(session: SessionId, addr: SocketAddr) -> (Self, ConnectionEnds) {
        let (tx, outbound) = mpsc::unbounded_channel();
        let (closer, closed) = watch::channel(false);
        let connection = Self {
            id: ConnectionId::generate(),
            session,
            addr,
            tx,
            closer: Arc::new(closer),
        };
        (connection, ConnectionEnds { outbound, closed })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue a text message for this socket.
    pub fn send(&self, msg: OutboundMessage) -> Result<(), SignalingError> {
        self.tx
            .send(msg)
            .map_err(|_| SignalingError::PeerGone(self.id))
    }

    /// Ask the transport to close this socket. Idempotent.
    pub fn close(&self) {
        self.closer.send_replace(true);
    }

    pub fn is_closing(&self) -> bool {
        *self.closer.borrow()
    }
}

/// Receiving halves of a [`Connection`], owned by the transport task.
#[derive(Debug)]
pub struct ConnectionEnds {
    pub outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    pub closed: watch::Receiver<bool>,
}
