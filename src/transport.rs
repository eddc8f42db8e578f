//! Abstract transport interface
//!
//! The manager owns exactly one transport and is the only component allowed
//! to call `open`/`close`/`write` on it. Handshaking, framing, and actual
//! byte movement live behind this trait.

use bytes::Bytes;

use crate::error::Result;
use crate::events::EventBus;

/// Notifications a transport delivers asynchronously on its event bus.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport finished its open sequence
    Open,
    /// The transport hit an error; the payload is transport-defined
    Error(String),
    /// An inbound frame arrived
    Data(Bytes),
    /// The transport closed
    Close,
}

/// A raw bidirectional transport.
///
/// All methods must be non-blocking; outcomes of `open` and `close` arrive as
/// [`TransportEvent`]s on the bus returned by [`events`](Transport::events).
/// Implementations may queue writes issued before the open sequence finishes.
pub trait Transport: Send + Sync + 'static {
    /// Begin the transport's open sequence
    fn open(&self);

    /// Close the transport
    fn close(&self);

    /// Write one encoded packet
    fn write(&self, bytes: Bytes) -> Result<()>;

    /// The bus carrying this transport's notifications
    fn events(&self) -> &EventBus<TransportEvent>;
}
