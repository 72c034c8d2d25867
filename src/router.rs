//! Push notification routing.
//!
//! Lookup order: the handler registered for the message type, then the single
//! global push handler, then a debug log. Handlers are cloned out of the
//! router before they run so a handler may register or remove handlers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::warn;

/// An unsolicited server notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushMessage {
    pub message_type: String,
    pub from_id: String,
    pub via_channel: String,
    /// Unparsed JSON body.
    pub payload: String,
}

impl PushMessage {
    /// Decode the payload into a concrete notification shape.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Shared push handler.
pub type PushHandler = Arc<dyn Fn(&PushMessage) + Send + Sync>;

/// Which handler a push was routed to.
#[derive(Clone)]
pub enum PushRoute {
    /// Handler registered for this message type.
    Typed(PushHandler),
    /// The global push handler.
    Generic(PushHandler),
    /// Nothing registered; the push is logged and dropped.
    Unhandled,
}

impl PushRoute {
    /// Run the selected handler, if any.
    pub fn deliver(&self, message: &PushMessage) {
        match self {
            Self::Typed(handler) | Self::Generic(handler) => handler(message),
            Self::Unhandled => {
                tracing::debug!(message_type = %message.message_type, from = %message.from_id, "no handler for push");
            }
        }
    }
}

impl std::fmt::Debug for PushRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Typed(_) => "Typed",
            Self::Generic(_) => "Generic",
            Self::Unhandled => "Unhandled",
        })
    }
}

#[derive(Default)]
pub struct PushRouter {
    by_type: HashMap<String, PushHandler>,
    fallback: Option<PushHandler>,
}

impl PushRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw handler for one message type, replacing any previous one.
    pub fn on(&mut self, message_type: impl Into<String>, handler: PushHandler) {
        self.by_type.insert(message_type.into(), handler);
    }

    /// Register a handler that receives the payload decoded as `T`.
    ///
    /// Payloads that fail to decode are logged and dropped.
    pub fn on_typed<T, F>(&mut self, message_type: impl Into<String>, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(&PushMessage, T) + Send + Sync + 'static,
    {
        self.on(
            message_type,
            Arc::new(move |message: &PushMessage| match message.decode::<T>() {
                Ok(body) => handler(message, body),
                Err(e) => {
                    warn!(message_type = %message.message_type, error = %e, "push payload did not match handler type");
                }
            }),
        );
    }

    /// Remove the handler for one message type.
    pub fn remove(&mut self, message_type: &str) -> bool {
        self.by_type.remove(message_type).is_some()
    }

    /// Set or clear the global push handler.
    pub fn set_fallback(&mut self, handler: Option<PushHandler>) {
        self.fallback = handler;
    }

    /// Resolve the route for a message type.
    #[must_use]
    pub fn route(&self, message_type: &str) -> PushRoute {
        if let Some(handler) = self.by_type.get(message_type) {
            return PushRoute::Typed(Arc::clone(handler));
        }
        match &self.fallback {
            Some(handler) => PushRoute::Generic(Arc::clone(handler)),
            None => PushRoute::Unhandled,
        }
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
