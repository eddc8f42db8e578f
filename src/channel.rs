//! Channel handles
//!
//! A [`Channel`] is a logical stream multiplexed over the manager's single
//! transport. Channels are created lazily by [`Manager::channel`]
//! (crate::Manager::channel), shared by everyone asking for the same
//! identifier, and persist for the manager's lifetime; a disconnect only
//! detaches them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{Result, TetherError};
use crate::events::EventBus;
use crate::manager::ManagerInner;
use crate::packet::Packet;

/// Events a channel emits about its own lifecycle.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The channel considers itself connected at the application level
    Connected,
    /// The channel detached from the manager
    Detached,
}

struct ChannelInner {
    name: String,
    manager: Weak<ManagerInner>,
    events: EventBus<ChannelEvent>,
    connected: AtomicBool,
}

/// Handle for one logical channel. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn new(name: &str, manager: Weak<ManagerInner>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.to_string(),
                manager,
                events: EventBus::new(),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// The channel identifier
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// This channel's lifecycle event bus
    pub fn events(&self) -> &EventBus<ChannelEvent> {
        &self.inner.events
    }

    /// Whether the channel currently reports itself connected
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Send a packet through the manager's transport.
    ///
    /// Channels never touch the transport directly; everything is routed
    /// through the manager so encoding and transport access stay in one place.
    pub fn send(&self, packet: &Packet) -> Result<()> {
        let manager = self.inner.manager.upgrade().ok_or(TetherError::Shutdown)?;
        manager.send_packet(packet)
    }

    /// Report that this channel is connected.
    ///
    /// Only the first report after creation or after a detach emits
    /// [`ChannelEvent::Connected`]; repeats while connected are no-ops, so
    /// the manager's live-channel count stays exact.
    pub fn set_connected(&self) {
        if !self.inner.connected.swap(true, Ordering::SeqCst) {
            self.inner.events.emit(&ChannelEvent::Connected);
        }
    }

    /// Detach from the manager after a disconnect.
    ///
    /// The handle stays usable and may report connected again later. When the
    /// last connected channel detaches, the manager closes deliberately.
    ///
    /// # Panics
    ///
    /// Panics if the channel is not currently connected; detaching a channel
    /// that never attached is a programming error.
    pub fn detach(&self) {
        assert!(
            self.inner.connected.swap(false, Ordering::SeqCst),
            "channel '{}' detached without being connected",
            self.inner.name
        );
        self.inner.events.emit(&ChannelEvent::Detached);
        if let Some(manager) = self.inner.manager.upgrade() {
            manager.channel_detached();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn orphan_channel(name: &str) -> Channel {
        Channel::new(name, Weak::new())
    }

    #[test]
    fn test_connected_emits_once_until_detach() {
        let channel = orphan_channel("chat");
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let _ = channel.events().subscribe(move |event| {
            if matches!(event, ChannelEvent::Connected) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        channel.set_connected();
        channel.set_connected();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(channel.is_connected());

        channel.detach();
        assert!(!channel.is_connected());

        channel.set_connected();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[should_panic(expected = "detached without being connected")]
    fn test_detach_before_connect_panics() {
        orphan_channel("chat").detach();
    }

    #[test]
    fn test_detach_emits_detached() {
        let channel = orphan_channel("chat");
        let log = Arc::new(Mutex::new(Vec::new()));

        let sink = log.clone();
        let _ = channel
            .events()
            .subscribe(move |event| sink.lock().push(format!("{event:?}")));

        channel.set_connected();
        channel.detach();
        assert_eq!(*log.lock(), vec!["Connected", "Detached"]);
    }

    #[test]
    fn test_send_without_manager_is_shutdown() {
        let channel = orphan_channel("chat");
        let err = channel
            .send(&Packet::new("chat", serde_json::json!(null)))
            .unwrap_err();
        assert!(matches!(err, TetherError::Shutdown));
    }

    #[test]
    fn test_clones_share_state() {
        let channel = orphan_channel("chat");
        let clone = channel.clone();

        channel.set_connected();
        assert!(clone.is_connected());
    }
}
