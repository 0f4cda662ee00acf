//! Transports for modrpc.
//!
//! A transport accepts requests and hands each one out exactly once, as an
//! [`HttpExchange`], to whichever worker asks first. Workers write the
//! response through the exchange's [`ResponseSink`] and close it.

pub mod error;
pub mod exchange;
pub mod loopback;
pub mod server;

pub use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
pub use error::{ResponseClosed, TransportError};
pub use exchange::{HttpExchange, HttpResponse, RequestHead, ResponseSink};
pub use loopback::{LoopbackRequest, LoopbackTransport};
pub use server::{HttpTransport, HttpTransportConfig, Transport};
