use thiserror::Error;

use crate::accesspoint::PacketType;

/// Top-level error type for the `connectd-api` crate.
///
/// Covers every failure mode across the protocol clients: authentication,
/// the encrypted accesspoint transport, the dealer websocket, and the HTTP
/// APIs. `connectd-core` wraps these with the session stage that failed.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The accesspoint rejected the credentials (`AuthFailure` packet).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Login5 refused to exchange the stored credential for a token.
    #[error("Login5 rejected the stored credential: {message}")]
    Login5Rejected { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An endpoint address could not be used as `host:port`.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A handshake or request did not complete in time.
    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Socket-level I/O error on the accesspoint connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The key exchange with the accesspoint did not complete.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A frame failed to encrypt or authenticate.
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// The peer closed the connection before the expected reply.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    // ── Packets ─────────────────────────────────────────────────────
    /// A packet arrived that does not belong at this point of the exchange.
    #[error("Unexpected {got:?} packet while waiting for {expected}")]
    UnexpectedPacket {
        expected: &'static str,
        got: PacketType,
    },

    /// A live subscriber already exists for this packet type.
    #[error("Already subscribed to {0:?} packets")]
    AlreadySubscribed(PacketType),

    /// The accesspoint was used before a successful authentication.
    #[error("Accesspoint is not authenticated")]
    NotAuthenticated,

    // ── Resolver ────────────────────────────────────────────────────
    /// The resolver returned an empty list for the requested service.
    #[error("Resolver returned no {kind} endpoints")]
    NoEndpoint { kind: &'static str },

    // ── WebSocket ───────────────────────────────────────────────────
    /// Dealer websocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── HTTP APIs ───────────────────────────────────────────────────
    /// Non-success HTTP status from a backend endpoint.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// JSON (de)serialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the backend rejected the presented credentials.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Authentication { .. } | Self::Login5Rejected { .. } => true,
            Self::Status { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}
