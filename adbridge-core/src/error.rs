//! Domain-specific error types for the device bridge.
//!
//! All fallible operations return `Result<T, BridgeError>`.
//! No panics on untrusted input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// The canonical error type for the device bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The device control binary could not be found or spawned.
    #[error("device control binary unavailable: {0}")]
    ProtocolUnavailable(String),

    /// A device command exceeded its time budget.
    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    /// A device command ran but reported failure.
    #[error("command failed with exit code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    // ── Hierarchy Errors ─────────────────────────────────────────
    /// Every hierarchy dump strategy was exhausted.
    #[error("UI hierarchy unavailable: all dump strategies exhausted")]
    HierarchyUnavailable,

    /// The dumped hierarchy was not well-formed XML.
    #[error("invalid hierarchy XML: {0}")]
    InvalidHierarchy(String),

    // ── Element Errors ───────────────────────────────────────────
    /// No on-screen element matched the given criteria.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// A tap or swipe target fell outside the reported screen.
    #[error("coordinates ({x}, {y}) out of bounds for {width}x{height} screen")]
    CoordinatesOutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },

    // ── Stream Errors ────────────────────────────────────────────
    /// Screen capture failed repeatedly and the stream was stopped.
    #[error("screen capture failed {failures} consecutive times")]
    StreamCaptureFailed { failures: u32 },

    // ── Channel / IO Errors ──────────────────────────────────────
    /// The OS-level subprocess or file layer reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Serialization Errors ─────────────────────────────────────
    /// JSON encoding or decoding of a message failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame decode or re-encode failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::Other(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BridgeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BridgeError::ChannelClosed
    }
}
