//! Domain-specific error types for the Incppect protocol.
//!
//! All fallible operations return `Result<T, IncppectError>`.
//! A malformed client message is a typed, recoverable error; it never panics
//! the server.

use thiserror::Error;

/// The canonical error type for the Incppect protocol.
#[derive(Debug, Error)]
pub enum IncppectError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The message is shorter than its 4-byte type tag.
    #[error("message too short: {0} bytes")]
    MessageTooShort(usize),

    /// The leading type tag does not name a known client message.
    #[error("unknown message type: {0}")]
    UnknownMessageType(i32),

    /// A fixed-size message body is not a whole number of records.
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),

    /// A subscribe tuple could not be parsed.
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    /// The server frame or diff payload could not be decoded.
    #[error("invalid diff: {0}")]
    InvalidDiff(&'static str),

    // ── Registry Errors ──────────────────────────────────────────
    /// A path template was registered twice.
    #[error("path already registered: {0}")]
    DuplicatePath(String),

    /// A path is not present in the registry.
    #[error("unknown path: {0}")]
    UnknownPath(String),

    /// The number of indices does not match the path's `%d` wildcards.
    #[error("path {path} expects {expected} indices, got {actual}")]
    WildcardMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The WebSocket layer reported an error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for IncppectError {
    fn from(s: String) -> Self {
        IncppectError::Other(s)
    }
}

impl From<&str> for IncppectError {
    fn from(s: &str) -> Self {
        IncppectError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for IncppectError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        IncppectError::ChannelClosed
    }
}
