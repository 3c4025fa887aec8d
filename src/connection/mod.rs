//! Websocket client for the Onezone graph-sync endpoint.
//!
//! [`WebsocketClient`] is the only thing the rest of an application needs:
//! "send a subtyped request, get a result back" and "subscribe to pushes".
//! Frame construction, id generation and timeout bookkeeping stay inside the
//! background event loop task that owns the socket.
//!
//! # Architecture
//!
//! ```text
//!   WebsocketClient                      EventLoop (tokio task)
//!         │  Command::Send / Close             │
//!         │ ─────────────────────────────────► │  Correlator + socket halves
//!         │                                    │
//!         │  oneshot (one per request)         │
//!         │ ◄───────────────────────────────── │
//!         │                                    │
//!   subscribe_pushes() ◄── broadcast ───────── │  pushes
//!   subscribe_events() ◄── broadcast ───────── │  Open / Closed / Error
//! ```
//!
//! # Lifecycle
//!
//! [`WebsocketClient::open`] connects, starts the loop, and runs the
//! handshake; it only succeeds once the server accepted the handshake. A
//! rejected handshake leaves the socket open so the caller can decide what
//! to do; nothing is retried automatically. [`WebsocketClient::close`]
//! resolves once the socket is gone. Dropping the client closes the socket
//! in the background. Requests still pending at that point, or when the
//! server drops the connection, fail with [`RequestError::ConnectionClosed`].

mod event_loop;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::constants::{
    CLOSE_TIMEOUT, DEFAULT_PROTOCOL_VERSION, DEFAULT_REQUEST_TIMEOUT,
    EVENT_CHANNEL_CAPACITY, PUSH_CHANNEL_CAPACITY,
};
use crate::correlator::Correlator;
use crate::error::{OpenError, RequestError};
use crate::graph::GraphRequest;
use crate::handshake::{handshake_result, HandshakeRequest};
use crate::protocol::{interpret_payload, Frame, Subtype};
use crate::rpc::RpcRequest;
use event_loop::{Command, EventLoop, Publishers};
pub use state::{ConnectionEvent, ConnectionState, SharedConnectionState};

/// Settings for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Full `ws://` or `wss://` endpoint.
    pub url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Protocol version offered in the handshake.
    pub protocol_version: u32,
    /// Token sent in the upgrade request, if any.
    pub auth_token: Option<String>,
}

impl ClientOptions {
    /// Options for `url` with default timeout and protocol version.
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            auth_token: None,
        }
    }
}

/// Live link to a running event loop.
#[derive(Debug)]
struct Link {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Client owning at most one graph-sync connection at a time.
#[derive(Debug)]
pub struct WebsocketClient {
    options: ClientOptions,
    publishers: Publishers,
    link: Option<Link>,
    handshake_data: Option<Value>,
}

impl WebsocketClient {
    /// Create a client; no connection is made until [`Self::open`].
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        let (pushes, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            options,
            publishers: Publishers {
                pushes,
                events,
                state: SharedConnectionState::new(),
            },
            link: None,
            handshake_data: None,
        }
    }

    /// Client options.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Connect, start the event loop, and perform the handshake.
    ///
    /// Returns the handshake `data` on success.
    ///
    /// # Errors
    ///
    /// - [`OpenError::AlreadyOpen`] if a connection is still running,
    /// - [`OpenError::Connect`] if the socket could not be established,
    /// - [`OpenError::Handshake`] if the server rejected the handshake,
    /// - [`OpenError::Request`] if the handshake request failed (e.g. timeout).
    pub async fn open(&mut self) -> Result<Value, OpenError> {
        if self.link.as_ref().is_some_and(|link| !link.task.is_finished()) {
            return Err(OpenError::AlreadyOpen);
        }
        self.link = None;
        self.handshake_data = None;

        let state = Arc::clone(&self.publishers.state);
        state.set(ConnectionState::Connecting).await;
        log::info!("[Websocket] Connecting to {}", self.options.url);

        let connected =
            crate::ws::connect(&self.options.url, self.options.auth_token.as_deref()).await;
        let (writer, reader) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("[Websocket] Connection failed: {:#}", e);
                state.set(ConnectionState::Closed).await;
                let _ = self
                    .publishers
                    .events
                    .send(ConnectionEvent::Error(format!("{e:#}")));
                return Err(OpenError::Connect(e));
            }
        };

        // Open must be published before the loop runs; the loop owns every
        // later transition.
        state.set(ConnectionState::Open).await;
        let _ = self.publishers.events.send(ConnectionEvent::Open);

        let (commands, command_rx) = mpsc::unbounded_channel();
        let event_loop = EventLoop::new(
            Correlator::new(self.options.request_timeout),
            writer,
            reader,
            command_rx,
            self.publishers.clone(),
        );
        let task = tokio::spawn(event_loop.run());
        self.link = Some(Link { commands, task });
        log::info!("[Websocket] Socket open, sending handshake");

        let handshake = HandshakeRequest::new(self.options.protocol_version);
        let frame = self
            .send(Subtype::Handshake, &handshake)
            .await
            .map_err(OpenError::Request)?;

        let data = handshake_result(&frame.payload)?;
        log::info!("[Websocket] Handshake accepted");
        self.handshake_data = Some(data.clone());
        Ok(data)
    }

    /// Send a request and wait for its response frame.
    ///
    /// # Errors
    ///
    /// [`RequestError::SendFailed`] if `message` does not serialize (nothing
    /// is sent then), [`RequestError::ConnectionClosed`] without a running
    /// connection, or whatever the correlator settles the request with.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        subtype: Subtype,
        message: &T,
    ) -> Result<Frame, RequestError> {
        let payload =
            serde_json::to_value(message).map_err(|e| RequestError::SendFailed(e.to_string()))?;
        let link = self.link.as_ref().ok_or(RequestError::ConnectionClosed)?;

        let (responder, response) = oneshot::channel();
        let command = Command::Send {
            subtype,
            payload,
            responder,
        };
        if link.commands.send(command).is_err() {
            return Err(RequestError::ConnectionClosed);
        }

        response.await.unwrap_or(Err(RequestError::ConnectionClosed))
    }

    /// Send a request and unwrap the `success`/`data`/`error` payload.
    ///
    /// # Errors
    ///
    /// As [`Self::send`], plus [`RequestError::Remote`] when the server did
    /// not report success.
    pub async fn request<T: Serialize + ?Sized>(
        &self,
        subtype: Subtype,
        message: &T,
    ) -> Result<Value, RequestError> {
        let frame = self.send(subtype, message).await?;
        interpret_payload(&frame.payload)
    }

    /// Call a server function over the `rpc` subtype.
    pub async fn rpc(&self, function: &str, args: Value) -> Result<Value, RequestError> {
        self.request(Subtype::Rpc, &RpcRequest::new(function, args))
            .await
    }

    /// Run a `graph` request.
    pub async fn graph(&self, request: &GraphRequest) -> Result<Value, RequestError> {
        self.request(Subtype::Graph, &request.to_payload()).await
    }

    /// Subscribe to server pushes. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe_pushes(&self) -> broadcast::Receiver<Value> {
        self.publishers.pushes.subscribe()
    }

    /// Subscribe to lifecycle events. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.publishers.events.subscribe()
    }

    /// Current socket state.
    pub async fn state(&self) -> ConnectionState {
        self.publishers.state.get().await
    }

    /// Whether the handshake succeeded on the current connection.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.handshake_data.is_some()
            && self
                .link
                .as_ref()
                .is_some_and(|link| !link.task.is_finished())
    }

    /// Data returned by the last successful handshake.
    #[must_use]
    pub fn handshake_data(&self) -> Option<&Value> {
        self.handshake_data.as_ref()
    }

    /// Close the connection and wait until the socket is gone.
    ///
    /// Returns immediately when there is no connection. If the peer does not
    /// finish the close handshake within [`CLOSE_TIMEOUT`], the loop is
    /// aborted.
    pub async fn close(&mut self) {
        self.handshake_data = None;
        let Some(Link { commands, mut task }) = self.link.take() else {
            return;
        };

        log::info!("[Websocket] Closing connection");
        // The loop may already have exited on its own.
        let _ = commands.send(Command::Close);

        if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
            log::warn!(
                "[Websocket] Close not acknowledged within {}s, aborting",
                CLOSE_TIMEOUT.as_secs()
            );
            task.abort();
            self.publishers.state.set(ConnectionState::Closed).await;
            let _ = self.publishers.events.send(ConnectionEvent::Closed {
                code: None,
                reason: "close timed out".to_string(),
            });
        }
        drop(commands);
    }
}
