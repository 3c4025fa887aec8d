//! Connection lifecycle state and events.

use std::sync::Arc;
use tokio::sync::RwLock;

/// Socket lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket has been created yet.
    #[default]
    Uninitialized,
    /// Socket is being established.
    Connecting,
    /// Socket is open (the handshake may still be running).
    Open,
    /// A close frame was sent; waiting for the peer.
    Closing,
    /// Socket is gone.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle notification published to event subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The socket opened.
    Open,
    /// The socket closed.
    Closed {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason or local explanation.
        reason: String,
    },
    /// Transport or protocol error.
    Error(String),
}

/// Connection state shared between the client handle and its event loop.
#[derive(Debug, Default)]
pub struct SharedConnectionState {
    state: RwLock<ConnectionState>,
}

impl SharedConnectionState {
    /// Create new shared state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the current state.
    pub async fn get(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Set the state.
    pub async fn set(&self, new_state: ConnectionState) {
        let mut state = self.state.write().await;
        if *state != new_state {
            log::debug!("[Websocket] State {} -> {}", *state, new_state);
            *state = new_state;
        }
    }
}
