//! Error taxonomy for the client engine.
//!
//! DESIGN
//! ======
//! - `ErrorReply` is the wire error body (`E:` frames, `error` pushes) and is
//!   also synthesized locally for transport failures, using reserved negative
//!   codes so handlers can tell local failures from server-reported ones.
//! - `ClientError` is what callers see on a call's error path.
//! - `ProtocolError` never leaves the crate: it is logged and the offending
//!   frame dropped.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Local code: the connection closed before the call was answered.
pub const CONNECTION_CLOSED: i32 = -1;

/// Local code: the transport could not open or send.
pub const NETWORK_ERROR: i32 = -2;

/// Server code: the session is no longer valid; forces local shutdown.
pub const SESSION_EXPIRED: i32 = 19;

const CONNECTION_ERROR_MESSAGE: &str = "There was a connection error";

/// Error body carried by `E:` replies and `error` pushes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    /// Numeric error code; negative values are client-synthesized.
    #[serde(default)]
    pub error_code: i32,
    /// Short human-readable message.
    #[serde(default)]
    pub error_message: String,
    /// Free-form details (often a server stack or transport message).
    #[serde(default)]
    pub error_details: String,
}

impl ErrorReply {
    /// Build a client-synthesized error for a local transport failure.
    #[must_use]
    pub fn client(code: i32, details: impl Into<String>) -> Self {
        Self {
            error_code: code,
            error_message: CONNECTION_ERROR_MESSAGE.to_owned(),
            error_details: details.into(),
        }
    }

    /// Whether this error was produced locally rather than by the server.
    #[must_use]
    pub fn is_client_side(&self) -> bool {
        matches!(self.error_code, CONNECTION_CLOSED | NETWORK_ERROR)
    }

    /// Whether this error carries the reserved session-expired code.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        self.error_code == SESSION_EXPIRED
    }
}

impl fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code, self.error_message)?;
        if !self.error_details.is_empty() {
            write!(f, " ({})", self.error_details)?;
        }
        Ok(())
    }
}

/// Error delivered to a call's error path.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport could not open or send.
    #[error("network error: {0}")]
    Network(ErrorReply),
    /// The connection closed before a reply arrived.
    #[error("connection closed: {0}")]
    ConnectionClosed(ErrorReply),
    /// The server answered with an `E:` reply.
    #[error("server error: {0}")]
    Application(ErrorReply),
    /// The server reported the session as expired; the client has shut down.
    #[error("session expired: {0}")]
    SessionExpired(ErrorReply),
    /// The reply body did not decode into the expected shape.
    #[error("invalid reply payload: {0}")]
    InvalidReply(#[source] serde_json::Error),
    /// The request could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    /// The server URL scheme maps to no transport backend.
    #[error("unknown server protocol: {0}")]
    UnsupportedUrl(String),
    /// A socket backend was requested outside of a tokio runtime.
    #[error("no tokio runtime available for the transport")]
    NoRuntime,
}

impl ClientError {
    /// Classify a wire error body. Only the session-expired code is special;
    /// the reserved local codes are never reinterpreted when they arrive in
    /// an `E:` frame.
    #[must_use]
    pub fn from_reply(reply: ErrorReply) -> Self {
        match reply.error_code {
            SESSION_EXPIRED => Self::SessionExpired(reply),
            _ => Self::Application(reply),
        }
    }

    /// Local network failure with the given details.
    #[must_use]
    pub fn network(details: impl Into<String>) -> Self {
        Self::Network(ErrorReply::client(NETWORK_ERROR, details))
    }

    /// Local connection-closed failure with the given details.
    #[must_use]
    pub fn connection_closed(details: impl Into<String>) -> Self {
        Self::ConnectionClosed(ErrorReply::client(CONNECTION_CLOSED, details))
    }

    /// The wire-shaped error body, when there is one.
    #[must_use]
    pub fn error_reply(&self) -> Option<&ErrorReply> {
        match self {
            Self::Network(r) | Self::ConnectionClosed(r) | Self::Application(r) | Self::SessionExpired(r) => {
                Some(r)
            }
            _ => None,
        }
    }

    /// Numeric code, when there is one.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.error_reply().map(|r| r.error_code)
    }
}

/// Inconsistencies in inbound traffic. Logged and dropped, never surfaced.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ProtocolError {
    #[error("malformed frame: {0}")]
    Codec(#[from] frames::CodecError),
    #[error("reply for unknown sequence id {0}")]
    UnknownSequence(u64),
    #[error("sequence id {0} is already pending")]
    DuplicateSequence(u64),
    #[error("malformed error body for sequence id {seq}: {reason}")]
    MalformedError { seq: u64, reason: String },
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
