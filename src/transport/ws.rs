//! WebSocket backend.
//!
//! One tokio task per connection owns the socket. It forwards frames queued by
//! `send` and reports everything it reads into the inbound sink. Dropping the
//! outbound sender (on `close`) makes the task send a close frame and exit.

use std::sync::{Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use super::Transport;
use crate::error::ClientError;
use crate::queue::InboundSink;

pub struct WsTransport {
    url: String,
    runtime: Handle,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl WsTransport {
    /// Transport for the server at `base_url`; the socket lives at
    /// `{base_url}/websocket`.
    #[must_use]
    pub fn new(base_url: &str, runtime: Handle) -> Self {
        Self { url: format!("{base_url}/websocket"), runtime, outbound: Mutex::new(None) }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WsTransport {
    fn open(&self, sink: InboundSink) -> Result<(), ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.outbound.lock().unwrap_or_else(PoisonError::into_inner).replace(tx);
        drop(previous);
        self.runtime.spawn(run(self.url.clone(), sink, rx));
        Ok(())
    }

    fn send(&self, frame: String) -> Result<(), ClientError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            return Err(ClientError::network("socket is not open"));
        };
        tx.send(frame).map_err(|_| ClientError::network("socket is closed"))
    }

    fn close(&self) {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

async fn run(url: String, sink: InboundSink, mut outbound: mpsc::UnboundedReceiver<String>) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(%url, error = %e, "ws: connect failed");
            sink.failed(e.to_string());
            return;
        }
    };
    info!(%url, epoch = sink.epoch(), "ws: connected");
    sink.opened();

    let (mut write, mut read) = stream.split();
    let reason = loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => sink.message(text.as_str()),
                Some(Ok(Message::Close(frame))) => break frame.map(|f| f.reason.as_str().to_owned()),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%url, error = %e, "ws: read failed");
                    sink.failed(e.to_string());
                    break Some(e.to_string());
                }
                None => break None,
            },
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        warn!(%url, error = %e, "ws: send failed");
                        sink.failed(e.to_string());
                        break Some(e.to_string());
                    }
                }
                None => {
                    // Local close; the peer may already be gone.
                    let _ = write.send(Message::Close(None)).await;
                    break None;
                }
            },
        }
    };

    info!(%url, epoch = sink.epoch(), "ws: disconnected");
    sink.closed(reason);
}
