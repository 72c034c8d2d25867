//! Single-use completion handles returned by every call.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::ClientError;

/// The eventual result of one call.
///
/// Await it, or poll it from a host loop with [`Pending::try_take`]. Exactly
/// one result is ever produced; a call abandoned by the client (for example
/// because the client itself was dropped) resolves to `ConnectionClosed`.
#[derive(Debug)]
#[must_use = "a call's result is only observable through its Pending handle"]
pub struct Pending<T> {
    // `None` once the result has been handed out.
    rx: Option<oneshot::Receiver<Result<T, ClientError>>>,
}

/// Sending half held by the completion.
pub(crate) type Resolver<T> = oneshot::Sender<Result<T, ClientError>>;

impl<T> Pending<T> {
    pub(crate) fn channel() -> (Resolver<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx: Some(rx) })
    }

    /// A handle that is already resolved.
    pub fn ready(result: Result<T, ClientError>) -> Self {
        let (tx, pending) = Self::channel();
        // The receiver is alive in `pending`; send cannot fail.
        let _ = tx.send(result);
        pending
    }

    /// Take the result if it has arrived.
    ///
    /// Returns `None` while the call is outstanding, and again after the
    /// result has been taken.
    pub fn try_take(&mut self) -> Option<Result<T, ClientError>> {
        let rx = self.rx.as_mut()?;
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(abandoned()),
        };
        self.rx = None;
        Some(result)
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Err(abandoned()));
        };
        let result = std::task::ready!(Pin::new(rx).poll(cx)).unwrap_or_else(|_| Err(abandoned()));
        self.rx = None;
        Poll::Ready(result)
    }
}

fn abandoned() -> ClientError {
    ClientError::connection_closed("call abandoned before completion")
}

#[cfg(test)]
#[path = "pending_test.rs"]
mod tests;
