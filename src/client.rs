//! The client façade: calls, connection lifecycle, and handler registration.
//!
//! ARCHITECTURE
//! ============
//! `Client` is a cheap handle over shared state. Calls run on the caller's
//! thread up to the point the frame is queued on the transport; replies,
//! pushes and lifecycle events are applied later by [`Client::tick`] (see
//! `dispatch.rs`), which the host or the [`Driver`](crate::Driver) runs.
//!
//! A call registers its completion in the correlation table before the frame
//! is sent, so a reply can never arrive for an unregistered sequence id.
//! Completions hold a weak reference back to the client so the table never
//! keeps the client alive.
//!
//! CONNECTIONS
//! ===========
//! Every connection gets a fresh epoch. Events are stamped with the epoch of
//! the connection that produced them; closing, replacing, or expiring a
//! connection bumps the epoch so anything still in flight from the old one is
//! dropped by the dispatcher. Outstanding calls are failed with
//! `ConnectionClosed` whenever their connection goes away.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::correlation::{Completion, CorrelationTable};
use crate::error::{ClientError, ErrorReply};
use crate::messages::{EmptyClientRequest, ServerTime, SignInReply};
use crate::pending::Pending;
use crate::queue::{Envelope, InboundQueue, InboundSink};
use crate::router::{PushHandler, PushMessage, PushRouter};
use crate::session::{SessionManager, SessionPhase};
use crate::store::{FileStore, MemoryStore, SessionStore};
use crate::transport::{ConnectionState, Transport, TransportFactory, default_factory};

/// Global error handler: server-pushed errors and transport failures.
pub type ErrorHandler = Arc<dyn Fn(&ErrorReply) + Send + Sync>;

/// Outcome of connection setup: the validated user, or `None` when no session
/// was persisted.
pub type InitResult = Result<Option<SignInReply>, ClientError>;

type InitWaiter = Box<dyn FnOnce(InitResult) + Send>;

// =============================================================================
// SHARED STATE
// =============================================================================

struct Connection {
    url: String,
    epoch: u64,
    state: ConnectionState,
    transport: Option<Arc<dyn Transport>>,
}

pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) queue: Arc<InboundQueue>,
    pub(crate) table: CorrelationTable,
    pub(crate) session: SessionManager,
    pub(crate) router: Mutex<PushRouter>,
    error_handler: Mutex<Option<ErrorHandler>>,
    connection: Mutex<Connection>,
    init_waiter: Mutex<Option<InitWaiter>>,
    pub(crate) scratch: Mutex<Vec<Envelope>>,
    factory: TransportFactory,
}

/// Handle to one logical client. Clones share the same connection.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server_url", &self.server_url())
            .field("phase", &self.phase())
            .field("connection", &self.connection_state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

pub struct ClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn SessionStore>>,
    clock: Option<Arc<dyn Clock>>,
    factory: Option<TransportFactory>,
}

impl ClientBuilder {
    /// Session store; defaults to a file store when the config names one,
    /// memory otherwise.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the scheme-based transport selection.
    #[must_use]
    pub fn transport_factory(mut self, factory: TransportFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    #[must_use]
    pub fn build(self) -> Client {
        let store: Arc<dyn SessionStore> = match (self.store, &self.config.session_file) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileStore::new(path.clone())),
            (None, None) => Arc::new(MemoryStore::new()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new()),
        };
        let session = SessionManager::new(store, clock, &self.config.server_url);
        let connection = Connection {
            url: self.config.server_url.clone(),
            epoch: 0,
            state: ConnectionState::Disconnected,
            transport: None,
        };

        Client {
            inner: Arc::new(Inner {
                queue: Arc::new(InboundQueue::new()),
                table: CorrelationTable::new(),
                session,
                router: Mutex::new(PushRouter::new()),
                error_handler: Mutex::new(None),
                connection: Mutex::new(connection),
                init_waiter: Mutex::new(None),
                scratch: Mutex::new(Vec::new()),
                factory: self.factory.unwrap_or_else(default_factory),
                config: self.config,
            }),
        }
    }
}

impl Client {
    /// Client for `server_url` with default settings.
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::builder(ClientConfig::new(server_url)).build()
    }

    #[must_use]
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder { config, store: None, clock: None, factory: None }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }
}

// =============================================================================
// CALLS
// =============================================================================

impl Client {
    /// Call any API by name.
    ///
    /// The request is serialized as the frame body; the reply body is decoded
    /// as `Reply`. A reply that does not decode fails the call with
    /// `InvalidReply`.
    pub fn call<Req, Reply>(&self, api: &str, request: &Req) -> Pending<Reply>
    where
        Req: Serialize + ?Sized,
        Reply: DeserializeOwned + Send + 'static,
    {
        let (tx, pending) = Pending::channel();
        self.call_with(api, request, move |result: Result<Reply, ClientError>| {
            let _ = tx.send(result);
        });
        pending
    }

    /// Call and hand the decoded outcome to `on_done`, exactly once.
    pub(crate) fn call_with<Req, Reply, F>(&self, api: &str, request: &Req, on_done: F)
    where
        Req: Serialize + ?Sized,
        Reply: DeserializeOwned + 'static,
        F: FnOnce(Result<Reply, ClientError>) + Send + 'static,
    {
        let body = match serde_json::to_string(request) {
            Ok(body) => body,
            Err(e) => {
                on_done(Err(ClientError::Encode(e)));
                return;
            }
        };
        let complete: Completion = Box::new(move |outcome: Result<String, ClientError>| {
            on_done(outcome.and_then(|payload| serde_json::from_str(&payload).map_err(ClientError::InvalidReply)));
        });
        self.send_call(api, &body, complete);
    }

    /// Call a sign-in style API; success adopts the returned session.
    pub(crate) fn call_signing_in<Req>(&self, api: &str, request: &Req) -> Pending<SignInReply>
    where
        Req: Serialize + ?Sized,
    {
        let (tx, pending) = Pending::channel();
        let weak = self.downgrade();
        self.call_with(api, request, move |result: Result<SignInReply, ClientError>| {
            if let (Ok(reply), Some(client)) = (&result, Self::from_weak(&weak)) {
                client.adopt_session(reply);
            }
            let _ = tx.send(result);
        });
        pending
    }

    fn send_call(&self, api: &str, body: &str, complete: Completion) {
        let seq = match self.inner.table.register(api, complete) {
            Ok(seq) => seq,
            Err(rejected) => {
                warn!(api, error = %rejected.error, "call rejected");
                (rejected.complete)(Err(ClientError::network(rejected.error.to_string())));
                return;
            }
        };

        let frame = match frames::encode_call(api, seq, body) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(api, error = %e, "call not encodable");
                if let Some(entry) = self.inner.table.take(seq) {
                    entry.complete(Err(ClientError::network(e.to_string())));
                }
                return;
            }
        };
        if self.inner.config.log_messages {
            debug!(%frame, "-> server");
        }

        let sent = match self.transport() {
            Some(transport) => transport.send(frame),
            None => Err(ClientError::network("not connected")),
        };
        match sent {
            Ok(()) => self.inner.session.record_send(),
            Err(e) => {
                warn!(api, seq, error = %e, "call send failed");
                // A reset may already have completed it.
                if let Some(entry) = self.inner.table.take(seq) {
                    entry.complete(Err(e));
                }
            }
        }
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

impl Client {
    /// Open the connection and restore any persisted session.
    ///
    /// Resolves to `Ok(None)` when no session id was persisted, `Ok(Some)`
    /// once a persisted session has been validated, and `Err` when the
    /// connection fails or validation is rejected (the persisted id is then
    /// cleared).
    pub fn init(&self) -> Pending<Option<SignInReply>> {
        let (tx, pending) = Pending::channel();
        self.start_connection(Box::new(move |result| {
            let _ = tx.send(result);
        }));
        pending
    }

    fn start_connection(&self, waiter: InitWaiter) {
        let url = self.server_url();
        let transport = match (self.inner.factory)(&url) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(%url, error = %e, "no transport for server");
                waiter(Err(e));
                return;
            }
        };

        let (previous, epoch) = {
            let mut conn = self.connection();
            conn.epoch += 1;
            conn.state = ConnectionState::Connecting;
            (conn.transport.replace(Arc::clone(&transport)), conn.epoch)
        };
        if let Some(previous) = previous {
            previous.close();
        }
        self.inner.table.reset(|| ClientError::connection_closed("connection replaced"));
        self.inner.session.transition(SessionPhase::Connecting);
        let stale = self.init_waiter().replace(waiter);
        if let Some(stale) = stale {
            stale(Err(ClientError::connection_closed("connection replaced")));
        }

        info!(%url, epoch, "connecting");
        if let Err(e) = transport.open(InboundSink::new(Arc::clone(&self.inner.queue), epoch)) {
            warn!(%url, error = %e, "transport failed to open");
            {
                let mut conn = self.connection();
                if conn.epoch == epoch {
                    conn.state = ConnectionState::Disconnected;
                    conn.transport = None;
                }
            }
            self.inner.session.transition(SessionPhase::Uninitialized);
            self.resolve_init(Err(e));
        }
    }

    /// Close the connection. Outstanding calls fail with `ConnectionClosed`.
    pub fn close(&self) {
        let transport = {
            let mut conn = self.connection();
            conn.epoch += 1;
            conn.state = ConnectionState::Closed;
            conn.transport.take()
        };
        if let Some(transport) = transport {
            info!(url = %self.server_url(), "closing connection");
            transport.close();
        }
        self.inner.session.transition(SessionPhase::Closed);
        self.fail_outstanding("connection closed by client");
    }

    /// Move to another server. The same URL is a no-op; otherwise the current
    /// connection is closed and the init flow runs against `server_url`,
    /// reporting only whether it failed.
    pub fn switch_host(&self, server_url: &str) -> Pending<()> {
        if self.server_url() == server_url {
            return Pending::ready(Ok(()));
        }
        self.close();
        self.connection().url = server_url.to_owned();
        self.inner.session.rekey(server_url);

        let (tx, pending) = Pending::channel();
        self.start_connection(Box::new(move |result| {
            let _ = tx.send(result.map(|_| ()));
        }));
        pending
    }

    /// Forget the session locally and in the store.
    pub fn sign_out(&self) {
        self.inner.session.sign_out();
        if let Some(transport) = self.transport() {
            transport.authorize(None);
        }
    }

    /// Keepalive. Issues `GetTime` unless something was sent within the
    /// debounce window or the connection is not up; returns `None` when
    /// suppressed.
    pub fn ping(&self) -> Option<Pending<ServerTime>> {
        if self.connection_state() != ConnectionState::Connected {
            return None;
        }
        if !self.inner.session.should_ping(self.inner.config.ping_debounce) {
            return None;
        }
        Some(self.get_time())
    }

    /// Fetch the server clock and recalibrate the local estimate.
    pub fn get_time(&self) -> Pending<ServerTime> {
        let (tx, pending) = Pending::channel();
        let weak = self.downgrade();
        self.call_with("GetTime", &EmptyClientRequest {}, move |result: Result<ServerTime, ClientError>| {
            if let (Ok(time), Some(client)) = (&result, Self::from_weak(&weak)) {
                client.inner.session.apply_server_time(time.time);
            }
            let _ = tx.send(result);
        });
        pending
    }

    pub(crate) fn adopt_session(&self, reply: &SignInReply) {
        if !self.inner.session.sign_in(reply) {
            return;
        }
        if let Some(transport) = self.transport() {
            transport.authorize(self.inner.session.session_id().as_deref());
        }
    }

    /// Handle a session-expired signal. Only the first signal closes the
    /// connection.
    pub(crate) fn expire(&self) {
        if !self.inner.session.expire() {
            return;
        }
        warn!(url = %self.server_url(), "session expired; closing connection");
        let transport = {
            let mut conn = self.connection();
            conn.epoch += 1;
            conn.state = ConnectionState::Closed;
            conn.transport.take()
        };
        if let Some(transport) = transport {
            transport.close();
        }
        self.fail_outstanding("session expired");
    }

    /// Fail every outstanding call, then any init still waiting.
    pub(crate) fn fail_outstanding(&self, reason: &str) {
        let failed = self.inner.table.fail_all(|| ClientError::connection_closed(reason));
        if failed > 0 {
            debug!(failed, reason, "failed outstanding calls");
        }
        self.resolve_init(Err(ClientError::connection_closed(reason)));
    }

    pub(crate) fn resolve_init(&self, result: InitResult) {
        let waiter = self.init_waiter().take();
        if let Some(waiter) = waiter {
            waiter(result);
        }
    }

    pub(crate) fn report_error(&self, reply: &ErrorReply) {
        let handler = self.inner.error_handler.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match handler {
            Some(handler) => handler(reply),
            None => warn!(error = %reply, "unhandled client error"),
        }
    }
}

// =============================================================================
// STATE & HANDLERS
// =============================================================================

impl Client {
    #[must_use]
    pub fn server_url(&self) -> String {
        self.connection().url.clone()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.inner.session.phase()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection().state
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.inner.session.session_id().is_some()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.session.session_id()
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn user_info(&self) -> Option<SignInReply> {
        self.inner.session.user_info()
    }

    /// Estimated server time in milliseconds since the Unix epoch, once the
    /// server has reported its clock.
    #[must_use]
    pub fn server_time(&self) -> Option<f64> {
        self.inner.session.server_time()
    }

    /// Number of calls awaiting a reply.
    #[must_use]
    pub fn outstanding_calls(&self) -> usize {
        self.inner.table.len()
    }

    /// Events received but not yet applied by `tick`.
    #[must_use]
    pub fn queued_events(&self) -> usize {
        self.inner.queue.len()
    }

    /// Handle pushes of one message type.
    pub fn on_push(&self, message_type: impl Into<String>, handler: impl Fn(&PushMessage) + Send + Sync + 'static) {
        self.router().on(message_type, Arc::new(handler));
    }

    /// Handle pushes of one message type with the payload decoded as `T`.
    pub fn on_push_typed<T, F>(&self, message_type: impl Into<String>, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(&PushMessage, T) + Send + Sync + 'static,
    {
        self.router().on_typed(message_type, handler);
    }

    /// Stop handling one message type.
    pub fn remove_push_handler(&self, message_type: &str) -> bool {
        self.router().remove(message_type)
    }

    /// Handle every push without a type-specific handler.
    pub fn on_any_push(&self, handler: Option<PushHandler>) {
        self.router().set_fallback(handler);
    }

    /// Receive server-pushed errors and transport failures.
    pub fn on_error(&self, handler: Option<ErrorHandler>) {
        *self.inner.error_handler.lock().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.connection().epoch
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.connection().transport.clone()
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.inner.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_waiter(&self) -> MutexGuard<'_, Option<InitWaiter>> {
        self.inner.init_waiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn router(&self) -> MutexGuard<'_, PushRouter> {
        self.inner.router.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a socket lifecycle event to the connection record. Returns the
    /// previous state.
    pub(crate) fn set_connection_state(&self, state: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut self.connection().state, state)
    }

    /// Drop the transport after it failed or closed on its own.
    pub(crate) fn release_transport(&self) -> Option<Arc<dyn Transport>> {
        self.connection().transport.take()
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

#[cfg(test)]
#[path = "client_helpers_test.rs"]
pub(crate) mod test_helpers;
