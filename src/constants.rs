//! Crate-wide constants.
//!
//! Magic numbers for the transport and correlator live here, grouped by
//! concern.

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// How long a request may wait for its response.
///
/// Used when neither the config file nor the environment sets
/// `request_timeout`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long [`crate::WebsocketClient::close`] waits for the peer to echo the
/// close frame before tearing the connection down anyway.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Protocol
// ============================================================================

/// Protocol version offered in the handshake.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;

/// Path of the GUI graph-sync endpoint, appended to the server origin.
pub const DEFAULT_WS_PATH: &str = "/graph_sync/gui";

/// Default Onezone origin.
pub const DEFAULT_SERVER_URL: &str = "https://localhost";

/// Upgrade-request header carrying an access token.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

// ============================================================================
// Channels
// ============================================================================

/// Buffered push messages per subscriber before it starts lagging.
pub const PUSH_CHANNEL_CAPACITY: usize = 256;

/// Buffered lifecycle events per subscriber.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;
