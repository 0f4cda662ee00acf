//! Request/response pair handed from a transport to a worker.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ResponseClosed;

/// The immutable part of an accepted request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    /// Decoded query pairs, in request order.
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub remote: SocketAddr,
}

impl RequestHead {
    /// First query value whose key matches `name`, ignoring case.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn header(&self, name: impl axum::http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }
}

/// A finished response, as handed back to the transport on close.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn header(&self, name: impl axum::http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    completion: Option<oneshot::Sender<HttpResponse>>,
}

/// Writable side of an exchange.
///
/// Cheap to clone; all clones write the same response. Once [`close`]d the
/// response is handed to the transport and every further write fails with
/// [`ResponseClosed`]. Dropping every clone without closing makes the
/// transport answer on its own.
///
/// [`close`]: ResponseSink::close
#[derive(Clone)]
pub struct ResponseSink {
    state: Arc<Mutex<ResponseState>>,
}

impl ResponseSink {
    pub fn new() -> (Self, oneshot::Receiver<HttpResponse>) {
        let (tx, rx) = oneshot::channel();
        let sink = Self {
            state: Arc::new(Mutex::new(ResponseState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Vec::new(),
                completion: Some(tx),
            })),
        };
        (sink, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().completion.is_none()
    }

    pub fn status(&self) -> StatusCode {
        self.state.lock().status
    }

    pub fn header(&self, name: impl axum::http::header::AsHeaderName) -> Option<HeaderValue> {
        self.state.lock().headers.get(name).cloned()
    }

    pub fn set_status(&self, status: StatusCode) -> Result<(), ResponseClosed> {
        let mut state = self.open_state()?;
        state.status = status;
        Ok(())
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), ResponseClosed> {
        let mut state = self.open_state()?;
        state.headers.insert(name, value);
        Ok(())
    }

    pub fn append_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), ResponseClosed> {
        let mut state = self.open_state()?;
        state.headers.append(name, value);
        Ok(())
    }

    pub fn write(&self, chunk: &[u8]) -> Result<(), ResponseClosed> {
        let mut state = self.open_state()?;
        state.body.extend_from_slice(chunk);
        Ok(())
    }

    /// Close the response and hand it to the transport.
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        let Some(completion) = state.completion.take() else {
            return false;
        };
        let response = HttpResponse {
            status: state.status,
            headers: std::mem::take(&mut state.headers),
            body: Bytes::from(std::mem::take(&mut state.body)),
        };
        // The transport may have given up on the request already.
        let _ = completion.send(response);
        true
    }

    /// Set status, content type and body, then close.
    pub fn respond(
        &self,
        status: StatusCode,
        content_type: Option<&'static str>,
        body: &[u8],
    ) -> Result<(), ResponseClosed> {
        {
            let mut state = self.open_state()?;
            state.status = status;
            if let Some(content_type) = content_type {
                state
                    .headers
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            state.body.clear();
            state.body.extend_from_slice(body);
        }
        self.close();
        Ok(())
    }

    fn open_state(&self) -> Result<parking_lot::MutexGuard<'_, ResponseState>, ResponseClosed> {
        let state = self.state.lock();
        if state.completion.is_none() {
            return Err(ResponseClosed);
        }
        Ok(state)
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResponseSink")
            .field("status", &state.status)
            .field("closed", &state.completion.is_none())
            .finish()
    }
}

/// One accepted request together with its response sink.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    head: Arc<RequestHead>,
    body: Bytes,
    response: ResponseSink,
}

impl HttpExchange {
    pub fn new(head: RequestHead, body: Bytes, response: ResponseSink) -> Self {
        Self {
            head: Arc::new(head),
            body,
            response,
        }
    }

    pub fn head(&self) -> &Arc<RequestHead> {
        &self.head
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn response(&self) -> &ResponseSink {
        &self.response
    }
}
