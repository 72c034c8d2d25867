//! Session state: identity, persistence, connection phase, and server clock.
//!
//! DESIGN
//! ======
//! `SessionManager` owns every piece of mutable session state behind one
//! lock. It never performs I/O beyond the session store and never calls back
//! into the client; the client and dispatcher drive it and act on what it
//! returns.
//!
//! PHASES
//! ======
//! `Uninitialized -> Connecting -> {AwaitingValidation | SignedOut} -> SignedIn <-> SignedOut`
//!
//! `Closed` is reachable from every phase and can only be left by starting a
//! new connection (`Connecting`). Entering `Closed` through session expiry is
//! idempotent: only the first signal reports a transition.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::clock::{Clock, as_millis_f64};
use crate::messages::SignInReply;
use crate::store::{SessionStore, session_key};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Connecting,
    AwaitingValidation,
    SignedOut,
    SignedIn,
    Closed,
}

impl SessionPhase {
    /// Whether `self -> to` is a legal transition.
    #[must_use]
    pub fn can_enter(self, to: SessionPhase) -> bool {
        match (self, to) {
            (Self::Closed, Self::Connecting) => true,
            (Self::Closed, _) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    phase: SessionPhase,
    key: String,
    session_id: Option<String>,
    user_info: Option<SignInReply>,
    /// `server_ms - local_ms`, once the server has reported its clock.
    time_offset_ms: Option<f64>,
    last_send: Option<Duration>,
}

pub(crate) struct SessionManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<Session>,
}

impl SessionManager {
    /// Load any persisted session id for `server_url`.
    pub(crate) fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, server_url: &str) -> Self {
        let key = session_key(server_url);
        let session_id = store.load(&key);
        Self { store, clock, state: Mutex::new(Session { key, session_id, ..Session::default() }) }
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    /// Move to `to` if the transition is legal. Returns whether it happened.
    pub(crate) fn transition(&self, to: SessionPhase) -> bool {
        let mut state = self.lock();
        let from = state.phase;
        if !from.can_enter(to) {
            return false;
        }
        if from != to {
            info!(?from, ?to, "session: phase change");
        }
        state.phase = to;
        true
    }

    pub(crate) fn session_id(&self) -> Option<String> {
        self.lock().session_id.clone()
    }

    pub(crate) fn user_info(&self) -> Option<SignInReply> {
        self.lock().user_info.clone()
    }

    /// Adopt a successful sign-in style reply: store and persist the session
    /// id, refresh the server clock, and enter `SignedIn`.
    ///
    /// A reply without a session id (`GetUserInfo`) keeps the id already
    /// held. With no id at all the session is not adopted.
    pub(crate) fn sign_in(&self, reply: &SignInReply) -> bool {
        let now = self.now_ms();
        let mut state = self.lock();
        if reply.time > 0.0 {
            state.time_offset_ms = Some(reply.time - now);
        }

        let mut user = reply.clone();
        if reply.session_id.is_empty() {
            let Some(held) = state.session_id.clone() else {
                warn!(user_id = %reply.user_id, "session: reply carries no session id; not signing in");
                return false;
            };
            user.session_id = held;
        } else {
            self.store.save(&state.key, &reply.session_id);
            state.session_id = Some(reply.session_id.clone());
        }
        state.user_info = Some(user);
        if state.phase.can_enter(SessionPhase::SignedIn) {
            state.phase = SessionPhase::SignedIn;
        }
        true
    }

    /// Forget the session locally and in the store; enter `SignedOut` unless
    /// the connection is closed.
    pub(crate) fn sign_out(&self) {
        let mut state = self.lock();
        Self::clear(&self.store, &mut state);
        if state.phase.can_enter(SessionPhase::SignedOut) {
            state.phase = SessionPhase::SignedOut;
        }
    }

    /// Handle a session-expired signal: forget the session and enter
    /// `Closed`. Returns `true` only for the signal that performed the
    /// transition.
    pub(crate) fn expire(&self) -> bool {
        let mut state = self.lock();
        Self::clear(&self.store, &mut state);
        if state.phase == SessionPhase::Closed {
            return false;
        }
        info!(from = ?state.phase, "session: expired");
        state.phase = SessionPhase::Closed;
        true
    }

    /// Point at a different server: reload the persisted id for its key.
    pub(crate) fn rekey(&self, server_url: &str) {
        let mut state = self.lock();
        state.key = session_key(server_url);
        state.session_id = self.store.load(&state.key);
        state.user_info = None;
        state.time_offset_ms = None;
    }

    pub(crate) fn record_send(&self) {
        let now = self.clock.now();
        self.lock().last_send = Some(now);
    }

    /// Whether a keepalive is due: nothing sent yet, or at least `debounce`
    /// since the last send.
    pub(crate) fn should_ping(&self, debounce: Duration) -> bool {
        let now = self.clock.now();
        match self.lock().last_send {
            Some(at) => now.saturating_sub(at) >= debounce,
            None => true,
        }
    }

    /// Recalibrate the server clock from a time the server just reported.
    pub(crate) fn apply_server_time(&self, reported_ms: f64) {
        let now = self.now_ms();
        self.lock().time_offset_ms = Some(reported_ms - now);
    }

    /// Estimated current server time in milliseconds since the Unix epoch.
    pub(crate) fn server_time(&self) -> Option<f64> {
        let now = self.now_ms();
        self.lock().time_offset_ms.map(|offset| now + offset)
    }

    fn now_ms(&self) -> f64 {
        as_millis_f64(self.clock.now())
    }

    fn clear(store: &Arc<dyn SessionStore>, state: &mut Session) {
        store.remove(&state.key);
        state.session_id = None;
        state.user_info = None;
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
