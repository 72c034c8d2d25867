//! Hand-off buffer between the socket's delivery context and the dispatch tick.
//!
//! DESIGN
//! ======
//! Writers take the lock only long enough to append. The single consumer takes
//! the same lock only to swap the active buffer with its (empty) scratch
//! buffer, then works through the scratch buffer unlocked. Handlers that run
//! during dispatch can therefore call back into the client, including pushing
//! new events, without deadlocking.
//!
//! Every event is stamped with the epoch of the connection that produced it so
//! the dispatcher can drop late events from a connection it has already
//! replaced.

use std::sync::{Arc, Mutex, PoisonError};

/// A socket event as seen by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// The connection finished opening.
    Opened,
    /// One raw text frame.
    Message(String),
    /// The transport reported a failure.
    Failed(String),
    /// The connection closed, with an optional reason.
    Closed(Option<String>),
}

/// An event stamped with the connection epoch it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub epoch: u64,
    pub event: Inbound,
}

/// FIFO hand-off buffer. See the module docs for the locking discipline.
#[derive(Debug, Default)]
pub struct InboundQueue {
    active: Mutex<Vec<Envelope>>,
}

impl InboundQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. Called from the transport's delivery context.
    pub fn push(&self, epoch: u64, event: Inbound) {
        self.lock().push(Envelope { epoch, event });
    }

    /// Swap everything queued so far into `scratch`, in arrival order.
    ///
    /// `scratch` should be empty; the consumer clears it after processing and
    /// hands it back on the next tick so both buffers keep their capacity.
    pub fn drain_all(&self, scratch: &mut Vec<Envelope>) {
        debug_assert!(scratch.is_empty(), "scratch buffer must be drained before reuse");
        std::mem::swap(&mut *self.lock(), scratch);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Envelope>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write handle given to a transport for one connection.
#[derive(Clone, Debug)]
pub struct InboundSink {
    queue: Arc<InboundQueue>,
    epoch: u64,
}

impl InboundSink {
    #[must_use]
    pub fn new(queue: Arc<InboundQueue>, epoch: u64) -> Self {
        Self { queue, epoch }
    }

    /// Epoch of the connection this sink belongs to.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn opened(&self) {
        self.queue.push(self.epoch, Inbound::Opened);
    }

    pub fn message(&self, raw: impl Into<String>) {
        self.queue.push(self.epoch, Inbound::Message(raw.into()));
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.queue.push(self.epoch, Inbound::Failed(reason.into()));
    }

    pub fn closed(&self, reason: Option<String>) {
        self.queue.push(self.epoch, Inbound::Closed(reason));
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
