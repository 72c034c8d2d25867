//! Correlation table: outstanding sequence ids and their completions.
//!
//! DESIGN
//! ======
//! The table is type-erased. Each entry holds a boxed completion that already
//! knows how to decode the reply body into the caller's expected shape, so the
//! dispatcher only hands it the raw payload or an error.
//!
//! Entries are removed under the lock and completed after the lock is
//! released: a completion may issue new calls, which register back into this
//! table.
//!
//! INVARIANTS
//! ==========
//! - Sequence ids are allocated from a per-connection counter that starts at 0
//!   and only grows; `reset` starts a fresh connection's counter.
//! - A completion runs at most once: removal and completion are one step from
//!   the caller's point of view, and a second reply for the same id finds no
//!   entry and is reported as `UnknownSequence`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{ClientError, ProtocolError};

/// Completion invoked with the raw reply body or the call's error.
pub(crate) type Completion = Box<dyn FnOnce(Result<String, ClientError>) + Send>;

/// One outstanding call.
pub(crate) struct PendingRequest {
    pub(crate) seq: u64,
    pub(crate) api: String,
    complete: Completion,
}

impl PendingRequest {
    pub(crate) fn new(seq: u64, api: impl Into<String>, complete: Completion) -> Self {
        Self { seq, api: api.into(), complete }
    }

    pub(crate) fn complete(self, outcome: Result<String, ClientError>) {
        (self.complete)(outcome);
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest").field("seq", &self.seq).field("api", &self.api).finish_non_exhaustive()
    }
}

/// A registration the table refused, with the completion handed back so the
/// caller can fail it.
pub(crate) struct Rejected {
    pub(crate) error: ProtocolError,
    pub(crate) complete: Completion,
}

impl std::fmt::Debug for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejected").field("error", &self.error).finish_non_exhaustive()
    }
}

#[derive(Default)]
struct TableInner {
    next_seq: u64,
    pending: HashMap<u64, PendingRequest>,
}

#[derive(Default)]
pub(crate) struct CorrelationTable {
    inner: Mutex<TableInner>,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence id and register `complete` under it in one
    /// locked step.
    ///
    /// An id that is somehow still pending is rejected.
    pub(crate) fn register(&self, api: &str, complete: Completion) -> Result<u64, Rejected> {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        if inner.pending.contains_key(&seq) {
            return Err(Rejected { error: ProtocolError::DuplicateSequence(seq), complete });
        }
        inner.next_seq += 1;
        inner.pending.insert(seq, PendingRequest::new(seq, api, complete));
        Ok(seq)
    }

    /// Remove an entry without completing it.
    pub(crate) fn take(&self, seq: u64) -> Option<PendingRequest> {
        self.lock().pending.remove(&seq)
    }

    /// Remove the entry for `seq` and complete it with `outcome`.
    pub(crate) fn resolve(&self, seq: u64, outcome: Result<String, ClientError>) -> Result<(), ProtocolError> {
        let entry = self.take(seq).ok_or(ProtocolError::UnknownSequence(seq))?;
        entry.complete(outcome);
        Ok(())
    }

    /// Complete every outstanding entry with a fresh error from `make_error`,
    /// in sequence order. Returns how many were failed.
    pub(crate) fn fail_all(&self, make_error: impl Fn() -> ClientError) -> usize {
        let drained = drain_sorted(&mut self.lock());
        complete_all(drained, make_error)
    }

    /// Fail everything outstanding and restart the sequence counter for a new
    /// connection.
    pub(crate) fn reset(&self, make_error: impl Fn() -> ClientError) -> usize {
        let drained = {
            let mut inner = self.lock();
            inner.next_seq = 0;
            drain_sorted(&mut inner)
        };
        complete_all(drained, make_error)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().pending.len()
    }

    #[cfg(test)]
    pub(crate) fn next_seq(&self) -> u64 {
        self.lock().next_seq
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn drain_sorted(inner: &mut TableInner) -> Vec<PendingRequest> {
    let mut drained: Vec<PendingRequest> = inner.pending.drain().map(|(_, entry)| entry).collect();
    drained.sort_by_key(|entry| entry.seq);
    drained
}

fn complete_all(drained: Vec<PendingRequest>, make_error: impl Fn() -> ClientError) -> usize {
    let count = drained.len();
    for entry in drained {
        entry.complete(Err(make_error()));
    }
    count
}

#[cfg(test)]
#[path = "correlation_test.rs"]
mod tests;
