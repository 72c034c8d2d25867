//! Request-per-call HTTP backend.
//!
//! Each call frame becomes `POST {base}/api/{api}` with the JSON body. The
//! response is turned back into an `R:`/`E:` frame carrying the call's
//! sequence id and pushed into the inbound sink, so replies take the same
//! dispatch path as socket replies. There is no connection: `open` reports
//! opened immediately and pushes never arrive.

use std::sync::{Mutex, PoisonError};

use frames::Frame;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::runtime::Handle;
use tracing::warn;

use super::Transport;
use crate::error::{ClientError, ErrorReply, NETWORK_ERROR};
use crate::queue::InboundSink;

pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
    runtime: Handle,
    sink: Mutex<Option<InboundSink>>,
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(base_url: &str, runtime: Handle) -> Self {
        Self {
            base_url: base_url.to_owned(),
            http: reqwest::Client::new(),
            runtime,
            sink: Mutex::new(None),
            session_id: Mutex::new(None),
        }
    }
}

impl Transport for HttpTransport {
    fn open(&self, sink: InboundSink) -> Result<(), ClientError> {
        sink.opened();
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        Ok(())
    }

    fn send(&self, frame: String) -> Result<(), ClientError> {
        let Some(sink) = self.sink.lock().unwrap_or_else(PoisonError::into_inner).clone() else {
            return Err(ClientError::network("transport is not open"));
        };
        let call = frames::decode_call(&frame).map_err(|e| ClientError::network(e.to_string()))?;

        let mut request = self
            .http
            .post(format!("{}/api/{}", self.base_url, call.api))
            .header(CONTENT_TYPE, "application/json")
            .body(call.body);
        if let Some(session_id) = self.session_id.lock().unwrap_or_else(PoisonError::into_inner).as_deref() {
            request = request.header(AUTHORIZATION, session_id);
        }

        let seq = call.seq;
        self.runtime.spawn(async move {
            let reply = exchange(request).await;
            match frames::encode_frame(&reply.into_frame(seq)) {
                Ok(raw) => sink.message(raw),
                Err(e) => warn!(seq, error = %e, "http: reply frame not encodable"),
            }
        });
        Ok(())
    }

    fn close(&self) {
        if let Some(sink) = self.sink.lock().unwrap_or_else(PoisonError::into_inner).take() {
            sink.closed(None);
        }
    }

    fn authorize(&self, session_id: Option<&str>) {
        *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = session_id.map(str::to_owned);
    }
}

/// Outcome of one HTTP exchange, before it is framed.
#[derive(Debug, PartialEq, Eq)]
enum HttpReply {
    Ok(String),
    Err(String),
}

impl HttpReply {
    fn into_frame(self, seq: u64) -> Frame {
        match self {
            Self::Ok(payload) => Frame::Reply { seq, payload },
            Self::Err(payload) => Frame::Error { seq, payload },
        }
    }
}

async fn exchange(request: reqwest::RequestBuilder) -> HttpReply {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "http: request failed");
            return network_failure(e.to_string());
        }
    };
    let status = response.status();
    match response.text().await {
        Ok(body) => classify(status, body),
        Err(e) => {
            warn!(%status, error = %e, "http: failed to read response body");
            network_failure(e.to_string())
        }
    }
}

/// 2xx and 3xx are replies; anything else must carry an error body, and one
/// that does not is replaced by a local network error naming the status.
fn classify(status: StatusCode, body: String) -> HttpReply {
    if status.is_success() || status.is_redirection() {
        return HttpReply::Ok(body);
    }
    if serde_json::from_str::<ErrorReply>(&body).is_ok() {
        return HttpReply::Err(body);
    }
    network_failure(format!("HTTP {status}: {body}"))
}

fn network_failure(details: String) -> HttpReply {
    let reply = ErrorReply::client(NETWORK_ERROR, details);
    // ErrorReply has only string and integer fields; serialization cannot fail.
    HttpReply::Err(serde_json::to_string(&reply).unwrap_or_default())
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
