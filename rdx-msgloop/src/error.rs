//! Typed errors surfaced by the library.

use thiserror::Error;

/// Errors from retrieving a message payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// The message carries no payload.
    #[error("message has no payload")]
    Empty,
    /// The payload was attached as a different type than requested.
    #[error("payload type mismatch: expected `{expected}`, found `{actual}`")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Errors from the fallible `try_post_*` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PostError {
    /// The loop has been stopped and its queue no longer accepts work.
    #[error("loop is stopped; the item was dropped")]
    Closed,
}
