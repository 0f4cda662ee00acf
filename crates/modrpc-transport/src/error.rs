//! Transport errors.

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is already started")]
    AlreadyStarted,

    #[error("transport is not started")]
    NotStarted,

    #[error("invalid listen address {0}")]
    Address(String),

    #[error("transport closed before a response was produced")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Write attempted on a response that was already closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response already closed")]
pub struct ResponseClosed;
