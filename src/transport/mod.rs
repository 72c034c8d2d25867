//! Transport backends behind one interface.
//!
//! DESIGN
//! ======
//! A transport only moves strings. Outbound, `send` takes an encoded call
//! frame and returns once the frame is queued. Inbound, everything the
//! transport observes (open, frames, failures, close) goes into the
//! `InboundSink` handed to `open`, which stamps it with the connection epoch.
//! The dispatcher never talks to a socket directly.
//!
//! The backend is chosen at construction time from the URL scheme by a
//! `TransportFactory`; hosts and tests may supply their own factory.

mod http;
mod ws;

use std::sync::Arc;

use tokio::runtime::Handle;

pub use http::HttpTransport;
pub use ws::WsTransport;

use crate::error::ClientError;
use crate::queue::InboundSink;

/// Lifecycle of the current connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// One connection to the server.
pub trait Transport: Send + Sync {
    /// Start connecting. Progress is reported through `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection cannot even be attempted.
    fn open(&self, sink: InboundSink) -> Result<(), ClientError>;

    /// Queue one encoded call frame.
    ///
    /// # Errors
    ///
    /// Returns a network error when the transport is not open.
    fn send(&self, frame: String) -> Result<(), ClientError>;

    /// Close the connection. Idempotent.
    fn close(&self);

    /// Session id to present on requests, for backends that carry one.
    fn authorize(&self, _session_id: Option<&str>) {}
}

/// Builds the transport for a server URL.
pub type TransportFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn Transport>, ClientError> + Send + Sync>;

/// Factory that picks the backend from the URL scheme.
#[must_use]
pub fn default_factory() -> TransportFactory {
    Arc::new(transport_for_url)
}

/// Build the backend for `url`: `ws`/`wss` use the socket transport,
/// `http`/`https` the request-per-call transport.
///
/// # Errors
///
/// Returns `UnsupportedUrl` for any other scheme and `NoRuntime` when called
/// outside a tokio runtime.
pub fn transport_for_url(url: &str) -> Result<Arc<dyn Transport>, ClientError> {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase()).unwrap_or_default();
    let base = url.trim_end_matches('/');
    match scheme.as_str() {
        "ws" | "wss" => Ok(Arc::new(WsTransport::new(base, runtime()?))),
        "http" | "https" => Ok(Arc::new(HttpTransport::new(base, runtime()?))),
        _ => Err(ClientError::UnsupportedUrl(url.to_owned())),
    }
}

fn runtime() -> Result<Handle, ClientError> {
    Handle::try_current().map_err(|_| ClientError::NoRuntime)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
