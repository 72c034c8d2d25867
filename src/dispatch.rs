//! Dispatcher: the cooperative tick that applies inbound events.
//!
//! DESIGN
//! ======
//! `tick` swaps the inbound queue into a scratch buffer and then applies each
//! event with no lock held, in arrival order. Handlers and completions run
//! inline and may call back into the client (issue calls, register handlers,
//! even tick again).
//!
//! ERROR HANDLING
//! ==============
//! - Reply and error frames go to the matching call only.
//! - `error` pushes and transport failures go to the global error handler.
//! - Protocol errors (bad frame, unknown sequence id, unreadable error body)
//!   are logged and the frame dropped; dispatch continues with the next event.
//! - The session-expired code, on a reply or a push, closes the connection
//!   once no matter how many signals arrive.

use std::sync::{Arc, MutexGuard, PoisonError};

use frames::Frame;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::{CONNECTION_CLOSED, ClientError, ErrorReply, NETWORK_ERROR, ProtocolError};
use crate::messages::{SignInReply, ValidateSessionRequest};
use crate::queue::{Envelope, Inbound};
use crate::router::PushMessage;
use crate::session::SessionPhase;
use crate::transport::ConnectionState;

impl Client {
    /// Apply everything received since the last tick. Returns how many events
    /// were taken off the queue, including stale ones that were dropped.
    pub fn tick(&self) -> usize {
        if self.inner.queue.is_empty() {
            return 0;
        }
        let mut batch = std::mem::take(&mut *self.scratch());
        self.inner.queue.drain_all(&mut batch);
        let count = batch.len();

        for envelope in batch.drain(..) {
            // Checked per event: an earlier event may have replaced the connection.
            let current = self.current_epoch();
            if envelope.epoch != current {
                debug!(epoch = envelope.epoch, current, event = ?envelope.event, "dropping event from stale connection");
                continue;
            }
            match envelope.event {
                Inbound::Opened => self.on_opened(),
                Inbound::Message(raw) => self.on_frame(&raw),
                Inbound::Failed(reason) => self.on_failed(reason),
                Inbound::Closed(reason) => self.on_closed(reason),
            }
        }

        *self.scratch() = batch;
        count
    }

    fn scratch(&self) -> MutexGuard<'_, Vec<Envelope>> {
        self.inner.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // LIFECYCLE EVENTS
    // =========================================================================

    fn on_opened(&self) {
        self.set_connection_state(ConnectionState::Connected);
        info!(url = %self.server_url(), "connected");

        let Some(session_id) = self.session_id() else {
            self.inner.session.transition(SessionPhase::SignedOut);
            self.resolve_init(Ok(None));
            return;
        };

        self.inner.session.transition(SessionPhase::AwaitingValidation);
        let weak = Arc::downgrade(&self.inner);
        self.call_with(
            "ValidateSession",
            &ValidateSessionRequest { session_id },
            move |result: Result<SignInReply, ClientError>| {
                let Some(inner) = weak.upgrade() else { return };
                let client = Client { inner };
                match result {
                    Ok(reply) => {
                        client.adopt_session(&reply);
                        client.resolve_init(Ok(Some(reply)));
                    }
                    // Only a server verdict clears the persisted id; a lost
                    // connection leaves it for the next attempt.
                    Err(e @ (ClientError::Application(_) | ClientError::SessionExpired(_))) => {
                        info!(error = %e, "persisted session rejected; signing out");
                        client.sign_out();
                        client.resolve_init(Err(e));
                    }
                    Err(e) => {
                        info!(error = %e, "session validation interrupted; keeping persisted session");
                        client.resolve_init(Err(e));
                    }
                }
            },
        );
    }

    fn on_failed(&self, reason: String) {
        if self.connection_state() != ConnectionState::Connecting {
            warn!(%reason, "transport error");
            self.report_error(&ErrorReply::client(NETWORK_ERROR, reason));
            return;
        }

        warn!(url = %self.server_url(), %reason, "connection failed");
        self.set_connection_state(ConnectionState::Disconnected);
        if let Some(transport) = self.release_transport() {
            transport.close();
        }
        self.inner.session.transition(SessionPhase::Uninitialized);
        self.inner.table.fail_all(|| ClientError::network(reason.clone()));
        self.resolve_init(Err(ClientError::network(reason)));
    }

    fn on_closed(&self, reason: Option<String>) {
        if self.set_connection_state(ConnectionState::Closed) == ConnectionState::Closed {
            return;
        }
        info!(url = %self.server_url(), ?reason, "connection closed by peer");
        self.release_transport();
        self.inner.session.transition(SessionPhase::Closed);

        let details = reason.unwrap_or_default();
        self.fail_outstanding(&details);
        self.report_error(&ErrorReply::client(CONNECTION_CLOSED, details));
    }

    // =========================================================================
    // FRAMES
    // =========================================================================

    fn on_frame(&self, raw: &str) {
        if self.inner.config.log_messages {
            debug!(frame = %raw, "<- server");
        }

        let frame = match frames::decode_frame(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %ProtocolError::from(e), "dropping inbound frame");
                return;
            }
        };

        match frame {
            Frame::Reply { seq, payload } => {
                if let Err(e) = self.inner.table.resolve(seq, Ok(payload)) {
                    warn!(error = %e, "dropping reply");
                }
            }
            Frame::Error { seq, payload } => self.on_error_reply(seq, &payload),
            Frame::Push { message_type, from_id, via_channel, payload } => {
                let push = PushMessage { message_type, from_id, via_channel, payload };
                if push.message_type == frames::ERROR_MESSAGE_TYPE {
                    self.on_error_push(&push);
                } else {
                    let route = self.inner.router.lock().unwrap_or_else(PoisonError::into_inner).route(&push.message_type);
                    route.deliver(&push);
                }
            }
        }
    }

    fn on_error_reply(&self, seq: u64, payload: &str) {
        let Some(entry) = self.inner.table.take(seq) else {
            warn!(error = %ProtocolError::UnknownSequence(seq), "dropping error reply");
            return;
        };

        match serde_json::from_str::<ErrorReply>(payload) {
            Ok(reply) => {
                let expired = reply.is_session_expired();
                debug!(seq, api = %entry.api, error = %reply, "call failed");
                entry.complete(Err(ClientError::from_reply(reply)));
                if expired {
                    self.expire();
                }
            }
            Err(e) => {
                let reason = ProtocolError::MalformedError { seq, reason: e.to_string() };
                warn!(error = %reason, "unreadable error reply");
                entry.complete(Err(ClientError::InvalidReply(e)));
            }
        }
    }

    fn on_error_push(&self, push: &PushMessage) {
        match push.decode::<ErrorReply>() {
            Ok(reply) => {
                let expired = reply.is_session_expired();
                self.report_error(&reply);
                if expired {
                    self.expire();
                }
            }
            Err(e) => warn!(from = %push.from_id, error = %e, "dropping unreadable error push"),
        }
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
