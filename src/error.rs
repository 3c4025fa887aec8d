//! Error types surfaced by the client.
//!
//! - [`RequestError`]: why a single correlated request did not yield a payload.
//! - [`ProtocolError`]: an inbound frame the client cannot make sense of.
//! - [`OpenError`]: why [`crate::WebsocketClient::open`] failed.

use serde_json::Value;

/// Message carried by every [`RequestError::Timeout`].
pub const TIMEOUT_MESSAGE: &str = "Server response timeout";

/// Failure of one correlated request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The generated id was already pending; nothing was sent.
    Collision(String),
    /// The frame could not be serialized or written to the socket.
    SendFailed(String),
    /// No response arrived before the deadline.
    Timeout,
    /// The socket closed while the request was pending, or no socket exists.
    ConnectionClosed,
    /// The server answered with `success: false`. Carries `payload.error`.
    Remote(Value),
}

impl RequestError {
    /// Short, stable identifier of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Collision(_) => "collision",
            Self::SendFailed(_) => "send-failed",
            Self::Timeout => "timeout",
            Self::ConnectionClosed => "connection-closed",
            Self::Remote(_) => "remote",
        }
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collision(id) => write!(f, "Request id collision: {id}"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::Timeout => write!(f, "{TIMEOUT_MESSAGE}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Remote(error) => write!(f, "Server error: {error}"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Inbound frame that breaks the protocol contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The `type` field named something other than `response` or `push`.
    UnknownType(String),
    /// The message was not an object or lacked a usable `type` field.
    Malformed(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownType(kind) => write!(f, "Unknown message type: {kind}"),
            Self::Malformed(msg) => write!(f, "Malformed message: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Failure to bring a connection to the ready state.
#[derive(Debug)]
pub enum OpenError {
    /// The socket could not be established.
    Connect(anyhow::Error),
    /// The server rejected the handshake. Carries the handshake `error`.
    Handshake(Value),
    /// The handshake request itself failed (timeout, closed socket, ...).
    Request(RequestError),
    /// `open()` was called on a client that already owns a socket.
    AlreadyOpen,
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "Connection failed: {e:#}"),
            Self::Handshake(error) => write!(f, "Handshake rejected: {error}"),
            Self::Request(e) => write!(f, "Handshake failed: {e}"),
            Self::AlreadyOpen => write!(f, "Connection already open"),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect(e) => Some(e.as_ref()),
            Self::Request(e) => Some(e),
            Self::Handshake(_) | Self::AlreadyOpen => None,
        }
    }
}
