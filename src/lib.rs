//! onedata-ws - websocket client for the Onezone graph-sync API.
//!
//! The crate correlates requests with responses over a single websocket,
//! fans server pushes out to subscribers, and gates the connection on a
//! protocol handshake.
//!
//! # Architecture
//!
//! Leaf first:
//!
//! - **ws** - raw socket halves over `tokio-tungstenite`
//! - **protocol** - wire frames and the batch/push demultiplexer
//! - **correlator** - pending-request registry, ids and deadlines
//! - **handshake** - the one request that gates readiness
//! - **connection** - event loop task plus the [`WebsocketClient`] handle
//! - **graph** / **rpc** - typed payloads for the two request subtypes
//!
//! # Modules
//!
//! - [`connection`] - client handle, lifecycle state and events
//! - [`correlator`] - request/response matching
//! - [`protocol`] - frame types and demultiplexing
//! - [`config`] - configuration loading/saving

pub mod config;
pub mod connection;
pub mod constants;
pub mod correlator;
pub mod error;
pub mod graph;
pub mod handshake;
pub mod protocol;
pub mod rpc;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use connection::{ClientOptions, ConnectionEvent, ConnectionState, WebsocketClient};
pub use error::{OpenError, ProtocolError, RequestError};
pub use graph::{AuthHint, GraphRequest, Gri, Operation};
pub use protocol::{Frame, FrameType, Subtype};
