//! Error types for the tether manager

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the connection manager.
///
/// None of these are thrown across the API boundary during normal operation;
/// they are delivered through open-callbacks and lifecycle events. Only the
/// fallible write path (`send_packet`) returns them directly.
#[derive(Error, Debug, Clone)]
pub enum TetherError {
    /// The transport reported an error while a connection attempt was in
    /// flight. Surfaced via the `ConnectError` event and the open callback.
    #[error("connection error: {0}")]
    TransportOpen(String),

    /// The connect timer fired before the transport reported open.
    #[error("connect attempt timed out after {}ms", .0.as_millis())]
    ConnectTimeout(Duration),

    /// The transport reported an error while the connection was open.
    /// Surfaced via the `Error` event only.
    #[error("transport error: {0}")]
    Transport(String),

    /// Writing an encoded packet to the transport failed.
    #[error("transport write failed: {0}")]
    Write(String),

    /// Encoding or decoding a packet failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The manager backing a channel handle has been dropped.
    #[error("manager shut down")]
    Shutdown,
}

/// Result type for tether operations
pub type Result<T> = std::result::Result<T, TetherError>;
