//! Background task owning one socket.
//!
//! The loop is the only place that reads or writes the socket and the only
//! owner of the [`Correlator`]. It multiplexes three sources with
//! `tokio::select!`:
//!
//! - inbound socket messages → demultiplexed into responses and pushes,
//! - commands from the client handle (send a request, close),
//! - the earliest pending deadline → timeouts.
//!
//! When the loop ends, for whatever reason, every request still pending is
//! rejected with [`RequestError::ConnectionClosed`].

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use super::state::{ConnectionEvent, ConnectionState, SharedConnectionState};
use crate::correlator::{Correlator, Responder};
use crate::error::{ProtocolError, RequestError};
use crate::protocol::demux::{self, Route};
use crate::protocol::Subtype;
use crate::ws::{Inbound, WsReader, WsWriter};

/// Request from the client handle to the loop.
#[derive(Debug)]
pub(crate) enum Command {
    /// Correlate and send a request.
    Send {
        subtype: Subtype,
        payload: Value,
        responder: Responder,
    },
    /// Start the close handshake.
    Close,
}

/// Why the loop stopped.
#[derive(Debug)]
enum LoopExit {
    /// The socket closed or failed.
    Closed { code: Option<u16>, reason: String },
    /// The peer broke the protocol.
    Protocol(ProtocolError),
    /// The client handle went away.
    Abandoned,
}

/// Channels the loop publishes on.
#[derive(Debug, Clone)]
pub(crate) struct Publishers {
    pub(crate) pushes: broadcast::Sender<Value>,
    pub(crate) events: broadcast::Sender<ConnectionEvent>,
    pub(crate) state: Arc<SharedConnectionState>,
}

/// Event loop for one socket.
#[derive(Debug)]
pub(crate) struct EventLoop {
    correlator: Correlator,
    writer: WsWriter,
    reader: WsReader,
    commands: mpsc::UnboundedReceiver<Command>,
    publishers: Publishers,
}

impl EventLoop {
    pub(crate) fn new(
        correlator: Correlator,
        writer: WsWriter,
        reader: WsReader,
        commands: mpsc::UnboundedReceiver<Command>,
        publishers: Publishers,
    ) -> Self {
        Self {
            correlator,
            writer,
            reader,
            commands,
            publishers,
        }
    }

    /// Run until the socket closes, then fail whatever is still pending.
    pub(crate) async fn run(mut self) {
        let exit = self.run_loop().await;
        self.publishers.state.set(ConnectionState::Closed).await;

        let failed = self.correlator.fail_all(&RequestError::ConnectionClosed);
        if failed > 0 {
            log::warn!(
                "[Websocket] Connection closed with {} request(s) pending",
                failed
            );
        }

        let (code, reason) = match exit {
            LoopExit::Closed { code, reason } => (code, reason),
            LoopExit::Protocol(e) => (None, e.to_string()),
            LoopExit::Abandoned => (None, "client dropped".to_string()),
        };
        log::info!("[Websocket] Connection closed ({:?}): {}", code, reason);
        self.publish_event(ConnectionEvent::Closed { code, reason });
    }

    async fn run_loop(&mut self) -> LoopExit {
        loop {
            let deadline = self.correlator.next_deadline();

            tokio::select! {
                inbound = self.reader.recv() => {
                    match inbound {
                        Some(Ok(Inbound::Text(text))) => {
                            if let Err(e) = self.handle_text(&text) {
                                log::error!("[Websocket] Protocol error, dropping connection: {}", e);
                                self.publish_event(ConnectionEvent::Error(e.to_string()));
                                if let Err(close_err) = self.writer.close().await {
                                    log::debug!("[Websocket] Close after protocol error failed: {:#}", close_err);
                                }
                                return LoopExit::Protocol(e);
                            }
                        }
                        Some(Ok(Inbound::Ping(data))) => {
                            if let Err(e) = self.writer.pong(data).await {
                                log::debug!("[Websocket] Pong failed: {:#}", e);
                            }
                        }
                        Some(Ok(Inbound::Closed { code, reason })) => {
                            log::info!("[Websocket] Close received ({:?})", code);
                            if let Err(e) = self.writer.close().await {
                                log::debug!("[Websocket] Close echo failed: {:#}", e);
                            }
                            return LoopExit::Closed { code, reason };
                        }
                        Some(Err(e)) => {
                            log::warn!("[Websocket] Socket error: {:#}", e);
                            self.publish_event(ConnectionEvent::Error(format!("{e:#}")));
                            return LoopExit::Closed { code: None, reason: format!("{e:#}") };
                        }
                        None => {
                            return LoopExit::Closed { code: None, reason: "stream ended".to_string() };
                        }
                    }
                }

                command = self.commands.recv() => {
                    match command {
                        Some(Command::Send { subtype, payload, responder }) => {
                            self.send_request(subtype, payload, responder).await;
                        }
                        Some(Command::Close) => {
                            self.publishers.state.set(ConnectionState::Closing).await;
                            if let Err(e) = self.writer.close().await {
                                log::warn!("[Websocket] Failed to send close: {:#}", e);
                                return LoopExit::Closed { code: None, reason: format!("{e:#}") };
                            }
                        }
                        None => {
                            log::debug!("[Websocket] Client dropped, closing");
                            let _ = self.writer.close().await;
                            return LoopExit::Abandoned;
                        }
                    }
                }

                () = sleep_until_deadline(deadline) => {
                    self.correlator.expire(Instant::now());
                }
            }
        }
    }

    /// Register, serialize and write one request.
    async fn send_request(&mut self, subtype: Subtype, payload: Value, responder: Responder) {
        let Some(frame) = self.correlator.register(subtype, payload, responder) else {
            return;
        };
        let id = frame.id.clone().unwrap_or_default();

        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                self.correlator.fail(&id, RequestError::SendFailed(e.to_string()));
                return;
            }
        };

        log::trace!("[Websocket] -> {}", text);
        if let Err(e) = self.writer.send(text).await {
            self.correlator
                .fail(&id, RequestError::SendFailed(format!("{e:#}")));
        }
    }

    /// Demultiplex one inbound text frame.
    ///
    /// Non-JSON text is skipped. Messages of a batch are handled in order; a
    /// protocol error aborts the rest of the batch.
    fn handle_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        log::trace!("[Websocket] <- {}", text);
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    "[Websocket] Ignoring non-JSON message ({}): {}",
                    e,
                    text.chars().take(100).collect::<String>()
                );
                return Ok(());
            }
        };

        for message in demux::unpack(value) {
            match demux::route(message)? {
                Route::Response(frame) => {
                    self.correlator.resolve(frame);
                }
                Route::Push(message) => {
                    if self.publishers.pushes.send(message).is_err() {
                        log::trace!("[Websocket] Push dropped, no subscribers");
                    }
                }
            }
        }
        Ok(())
    }

    fn publish_event(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.publishers.events.send(event);
    }
}

/// Sleep until `deadline`, or forever when nothing is pending.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
