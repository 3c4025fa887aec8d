//! Graph-sync socket.
//!
//! [`connect`] performs the upgrade (with the access token header when one
//! is configured) and splits the socket into a [`WsWriter`] and a
//! [`WsReader`]. Only the connection event loop holds them.
//!
//! The reader reduces tungstenite's message set to the three things the
//! loop acts on: text frames, pings, and the peer's close. Binary and pong
//! frames carry nothing for this protocol and are dropped here.

use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::constants::AUTH_TOKEN_HEADER;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Inbound event the event loop reacts to.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame; graph-sync messages are JSON text.
    Text(String),
    /// Keepalive ping; answer with [`WsWriter::pong`].
    Ping(Vec<u8>),
    /// The peer started the close handshake.
    Closed {
        /// Close code, absent when the peer sent none.
        code: Option<u16>,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Sending side of the socket.
#[derive(Debug)]
pub struct WsWriter {
    sink: SplitSink<Socket, Message>,
}

impl WsWriter {
    /// Write one serialized message.
    pub async fn send(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .context("failed to write message")
    }

    /// Answer a ping.
    pub async fn pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(Message::Pong(data))
            .await
            .context("failed to write pong")
    }

    /// Send a close frame. Reading continues until the peer's close arrives.
    pub async fn close(&mut self) -> Result<()> {
        self.sink
            .send(Message::Close(None))
            .await
            .context("failed to write close")
    }
}

/// Receiving side of the socket.
#[derive(Debug)]
pub struct WsReader {
    stream: SplitStream<Socket>,
}

impl WsReader {
    /// Next event, or `None` once the stream is exhausted.
    pub async fn recv(&mut self) -> Option<Result<Inbound>> {
        while let Some(message) = self.stream.next().await {
            let inbound = match message {
                Ok(Message::Text(text)) => Inbound::Text(text),
                Ok(Message::Ping(data)) => Inbound::Ping(data),
                Ok(Message::Close(frame)) => match frame {
                    Some(frame) => Inbound::Closed {
                        code: Some(frame.code.into()),
                        reason: frame.reason.into_owned(),
                    },
                    None => Inbound::Closed {
                        code: None,
                        reason: String::new(),
                    },
                },
                Ok(Message::Binary(data)) => {
                    log::trace!("[Websocket] Dropping {} byte binary frame", data.len());
                    continue;
                }
                Ok(Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e).context("failed to read message")),
            };
            return Some(Ok(inbound));
        }
        None
    }
}

/// Open the socket at `url`, sending `auth_token` in the upgrade request.
///
/// # Errors
///
/// Fails on an invalid URL or token, or when the upgrade does not complete.
pub async fn connect(url: &str, auth_token: Option<&str>) -> Result<(WsWriter, WsReader)> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid endpoint {url}"))?;

    if let Some(token) = auth_token {
        let value = HeaderValue::from_str(token).context("access token is not a valid header")?;
        request
            .headers_mut()
            .insert(HeaderName::from_static(AUTH_TOKEN_HEADER), value);
    }

    let (socket, _) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    let (sink, stream) = socket.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Graph-sync endpoint for a Onezone origin.
///
/// An `https` origin maps to `wss`, `http` to `ws`; `ws`/`wss` origins are
/// kept. Trailing slashes on the origin and a missing leading slash on the
/// path are tolerated.
#[must_use]
pub fn endpoint_url(origin: &str, path: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let origin = match origin.split_once("://") {
        Some(("https", rest)) => format!("wss://{rest}"),
        Some(("http", rest)) => format!("ws://{rest}"),
        _ => origin.to_string(),
    };
    format!("{}/{}", origin, path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_https_origin() {
        assert_eq!(
            endpoint_url("https://onezone.example.com", "/graph_sync/gui"),
            "wss://onezone.example.com/graph_sync/gui"
        );
    }

    #[test]
    fn test_endpoint_url_trailing_slash_and_relative_path() {
        assert_eq!(
            endpoint_url("http://127.0.0.1:9000/", "graph_sync/gui"),
            "ws://127.0.0.1:9000/graph_sync/gui"
        );
    }

    #[test]
    fn test_endpoint_url_keeps_ws_origin() {
        assert_eq!(
            endpoint_url("wss://zone.local", "/graph_sync/gui"),
            "wss://zone.local/graph_sync/gui"
        );
    }

    #[test]
    fn test_endpoint_url_rewrites_scheme_only() {
        assert_eq!(
            endpoint_url("https://proxy.local/zone?next=https://other", "gs"),
            "wss://proxy.local/zone?next=https://other/gs"
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        assert!(connect("not-a-url", None).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_token_with_newline() {
        let err = connect("ws://127.0.0.1:1/graph_sync/gui", Some("bad\ntoken"))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("access token"));
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_fails() {
        assert!(connect("ws://127.0.0.1:1/graph_sync/gui", None).await.is_err());
    }
}
