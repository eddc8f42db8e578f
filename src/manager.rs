//! Connection manager
//!
//! [`Manager`] owns the single transport for a remote endpoint, drives its
//! open/error/close transitions, enforces the connect timeout, runs the
//! reconnection backoff cycle, and multiplexes channel handles over the one
//! connection. All caller-facing operations return immediately; outcomes are
//! delivered through open-callbacks and [`ManagerEvent`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::channel::{Channel, ChannelEvent};
use crate::config::ManagerConfig;
use crate::error::{Result, TetherError};
use crate::events::EventBus;
use crate::packet::{Codec, Packet};
use crate::subs::{Subscription, SubscriptionList};
use crate::transport::{Transport, TransportEvent};

/// Connection state of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// No connection; initial state, and terminal after a deliberate close
    Closed,
    /// A connection attempt is in flight
    Opening,
    /// The transport is open
    Open,
}

/// Lifecycle events emitted by the manager.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// The transport reached the open state
    Open,
    /// The transport closed
    Close,
    /// A decoded inbound packet
    Packet(Packet),
    /// The transport reported an error while open
    Error(TetherError),
    /// The transport reported an error during a connection attempt
    ConnectError(String),
    /// A connection attempt hit the connect timeout
    ConnectTimeout(Duration),
    /// Reconnected; carries the attempt count that succeeded
    Reconnect(u32),
    /// The reconnection attempt budget is exhausted
    ReconnectFailed,
    /// One reconnection attempt failed; the cycle continues
    ReconnectError(TetherError),
}

/// Completion callback for [`Manager::open_with`]; invoked at most once.
pub type OpenCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Composite lifecycle state; every transition happens under one lock so
/// state changes and subscription draining can't interleave.
struct Lifecycle {
    ready: ReadyState,
    reconnecting: bool,
    /// Suppresses the automatic reconnect for a close the manager initiated
    /// itself. Cleared by the next manual `open()`, so a deliberately closed
    /// manager stays reusable.
    closed_deliberately: bool,
}

pub(crate) struct ManagerInner {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    config: Mutex<ManagerConfig>,
    lifecycle: Mutex<Lifecycle>,
    subs: SubscriptionList,
    channels: Mutex<HashMap<String, Channel>>,
    connected_channels: AtomicUsize,
    events: EventBus<ManagerEvent>,
    /// Bumped to invalidate any sleeping reconnect timer.
    timer_gen: AtomicU64,
    /// Identity of the most recently started reconnection cycle; only the
    /// owning cycle may clear the reconnecting flag.
    reconnect_cycle: AtomicU64,
}

/// Wraps an open callback so that at most one of the open / error / timeout
/// outcomes settles it.
struct Settle {
    callback: Mutex<Option<OpenCallback>>,
}

impl Settle {
    fn new(callback: Option<OpenCallback>) -> Arc<Self> {
        Arc::new(Self {
            callback: Mutex::new(callback),
        })
    }

    fn fire(&self, result: Result<()>) {
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

/// Connection-lifecycle manager for one remote endpoint.
///
/// Created once per endpoint and reused across reconnects. Cheaply cloneable;
/// clones share the same connection.
///
/// Timers are spawned on the ambient tokio runtime, so `open` must be called
/// from within one.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Create a manager over a transport and codec
    pub fn new(transport: Arc<dyn Transport>, codec: Arc<dyn Codec>, config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                codec,
                config: Mutex::new(config),
                lifecycle: Mutex::new(Lifecycle {
                    ready: ReadyState::Closed,
                    reconnecting: false,
                    closed_deliberately: false,
                }),
                subs: SubscriptionList::new(),
                channels: Mutex::new(HashMap::new()),
                connected_channels: AtomicUsize::new(0),
                events: EventBus::new(),
                timer_gen: AtomicU64::new(0),
                reconnect_cycle: AtomicU64::new(0),
            }),
        }
    }

    /// The manager's lifecycle event bus
    pub fn events(&self) -> &EventBus<ManagerEvent> {
        &self.inner.events
    }

    /// Current connection state
    pub fn ready_state(&self) -> ReadyState {
        self.inner.lifecycle.lock().ready
    }

    /// Whether a reconnection cycle is in progress
    pub fn is_reconnecting(&self) -> bool {
        self.inner.lifecycle.lock().reconnecting
    }

    /// Number of channels currently reporting themselves connected
    pub fn connected_channels(&self) -> usize {
        self.inner.connected_channels.load(Ordering::SeqCst)
    }

    /// Number of live transport-scoped subscriptions (listeners and timers)
    pub fn subscription_count(&self) -> usize {
        self.inner.subs.len()
    }

    /// Whether automatic reconnection is enabled
    pub fn reconnection(&self) -> bool {
        self.inner.config.lock().reconnection
    }

    /// Enable or disable automatic reconnection
    pub fn set_reconnection(&self, enabled: bool) {
        self.inner.config.lock().reconnection = enabled;
    }

    /// Maximum reconnection attempts per cycle
    pub fn reconnection_attempts(&self) -> u32 {
        self.inner.config.lock().reconnection_attempts
    }

    /// Set the maximum reconnection attempts per cycle
    pub fn set_reconnection_attempts(&self, attempts: u32) {
        self.inner.config.lock().reconnection_attempts = attempts;
    }

    /// Base reconnection delay
    pub fn reconnection_delay(&self) -> Duration {
        self.inner.config.lock().reconnection_delay
    }

    /// Set the base reconnection delay
    pub fn set_reconnection_delay(&self, delay: Duration) {
        self.inner.config.lock().reconnection_delay = delay;
    }

    /// Cap on the reconnection delay
    pub fn reconnection_delay_max(&self) -> Duration {
        self.inner.config.lock().reconnection_delay_max
    }

    /// Set the cap on the reconnection delay
    pub fn set_reconnection_delay_max(&self, delay: Duration) {
        self.inner.config.lock().reconnection_delay_max = delay;
    }

    /// Connect timeout, `None` when disabled
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.inner.config.lock().connect_timeout
    }

    /// Set or disable the connect timeout
    pub fn set_connect_timeout(&self, timeout: Option<Duration>) {
        self.inner.config.lock().connect_timeout = timeout;
    }

    /// Start a connection attempt.
    ///
    /// No-op when already open outside a reconnection cycle. Returns
    /// immediately; the outcome arrives as an `Open` / `ConnectError` /
    /// `ConnectTimeout` event.
    pub fn open(&self) {
        self.inner.open_with(None);
    }

    /// Start a connection attempt with a completion callback.
    ///
    /// The callback fires at most once: `Ok` when the transport opens, `Err`
    /// when the transport errors during the attempt or the connect timeout
    /// forces it closed. If the transport never signals at all, the callback
    /// never fires.
    pub fn open_with(&self, callback: OpenCallback) {
        self.inner.open_with(Some(callback));
    }

    /// Get or create the channel for `name`.
    ///
    /// The same handle is returned for every request of the same identifier.
    pub fn channel(&self, name: &str) -> Channel {
        self.inner.channel(name)
    }

    /// Encode a packet and write it to the transport.
    pub fn send_packet(&self, packet: &Packet) -> Result<()> {
        self.inner.send_packet(packet)
    }
}

impl ManagerInner {
    fn open_with(self: &Arc<Self>, callback: Option<OpenCallback>) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.ready == ReadyState::Open && !lifecycle.reconnecting {
                return;
            }
            lifecycle.ready = ReadyState::Opening;
            lifecycle.closed_deliberately = false;
        }
        debug!("starting connection attempt");

        let settle = Settle::new(callback);

        let weak = Arc::downgrade(self);
        let on_settle = settle.clone();
        let open_id = self.transport.events().subscribe(move |event| {
            if matches!(event, TransportEvent::Open) {
                if let Some(inner) = weak.upgrade() {
                    inner.on_open();
                    on_settle.fire(Ok(()));
                }
            }
        });

        let weak = Arc::downgrade(self);
        let err_settle = settle.clone();
        let error_id = self.transport.events().subscribe(move |event| {
            if let TransportEvent::Error(data) = event {
                let Some(inner) = weak.upgrade() else { return };
                inner.cleanup();
                inner.events.emit(&ManagerEvent::ConnectError(data.clone()));
                err_settle.fire(Err(TetherError::TransportOpen(data.clone())));
            }
        });

        let timeout = self.config.lock().connect_timeout;
        if let Some(timeout) = timeout {
            debug!(timeout_ms = timeout.as_millis() as u64, "connection attempt will time out");

            let weak = Arc::downgrade(self);
            let transport = Arc::clone(&self.transport);
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let Some(inner) = weak.upgrade() else { return };
                // A later open supersedes this timer; only a still-pending
                // attempt may be failed.
                if inner.lifecycle.lock().ready != ReadyState::Opening {
                    return;
                }
                info!(timeout_ms = timeout.as_millis() as u64, "connect attempt timed out");
                transport.events().unsubscribe(open_id);
                transport.close();
                transport
                    .events()
                    .emit(&TransportEvent::Error("connect timeout".to_string()));
                inner.events.emit(&ManagerEvent::ConnectTimeout(timeout));
            });
            let abort = timer.abort_handle();
            self.subs.push(Subscription::new(move || abort.abort()));
        }

        let transport = Arc::clone(&self.transport);
        self.subs.push(Subscription::new(move || {
            transport.events().unsubscribe(open_id);
        }));
        let transport = Arc::clone(&self.transport);
        self.subs.push(Subscription::new(move || {
            transport.events().unsubscribe(error_id);
        }));

        self.transport.open();
    }

    /// Transport reached open: tear down attempt-scoped listeners and bind
    /// the listeners that live for the duration of the open connection.
    fn on_open(self: &Arc<Self>) {
        self.cleanup();

        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.ready = ReadyState::Open;
            // Any open reaching this point ends the reconnecting phase, even
            // a manual one racing a pending reconnect timer.
            lifecycle.reconnecting = false;
        }
        debug!("transport open");
        self.events.emit(&ManagerEvent::Open);

        let weak = Arc::downgrade(self);
        let data_id = self.transport.events().subscribe(move |event| {
            if let TransportEvent::Data(bytes) = event {
                if let Some(inner) = weak.upgrade() {
                    inner.on_data(bytes);
                }
            }
        });

        let weak = Arc::downgrade(self);
        let error_id = self.transport.events().subscribe(move |event| {
            if let TransportEvent::Error(data) = event {
                if let Some(inner) = weak.upgrade() {
                    warn!(error = %data, "transport error");
                    inner
                        .events
                        .emit(&ManagerEvent::Error(TetherError::Transport(data.clone())));
                }
            }
        });

        let weak = Arc::downgrade(self);
        let close_id = self.transport.events().subscribe(move |event| {
            if matches!(event, TransportEvent::Close) {
                if let Some(inner) = weak.upgrade() {
                    inner.on_close();
                }
            }
        });

        for id in [data_id, error_id, close_id] {
            let transport = Arc::clone(&self.transport);
            self.subs.push(Subscription::new(move || {
                transport.events().unsubscribe(id);
            }));
        }
    }

    fn on_data(&self, bytes: &Bytes) {
        match self.codec.decode(bytes) {
            Ok(packet) => self.events.emit(&ManagerEvent::Packet(packet)),
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                self.events.emit(&ManagerEvent::Error(err));
            }
        }
    }

    /// Transport closed: tear down connection-scoped listeners and decide
    /// whether this close starts a reconnection cycle.
    fn on_close(self: &Arc<Self>) {
        debug!("transport closed");
        self.cleanup();

        let should_reconnect = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.ready = ReadyState::Closed;
            !lifecycle.closed_deliberately && self.config.lock().reconnection
        };

        self.events.emit(&ManagerEvent::Close);

        if should_reconnect {
            self.reconnect();
        }
    }

    /// Deliberate close, triggered when the last connected channel detaches.
    /// Terminal for the current connection; a later manual `open()` reuses
    /// the manager.
    fn close(self: &Arc<Self>) {
        info!("last channel detached, closing connection");
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.closed_deliberately = true;
            lifecycle.reconnecting = false;
            lifecycle.ready = ReadyState::Closed;
        }
        self.cleanup();
        self.transport.close();
    }

    /// Run one reconnection cycle as a single task: wait, attempt, and on
    /// failure climb the backoff until an attempt succeeds or the budget is
    /// exhausted. One cycle at a time; each pending wait is cancelable.
    fn reconnect(self: &Arc<Self>) {
        let cycle;
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.reconnecting || lifecycle.closed_deliberately {
                return;
            }
            lifecycle.reconnecting = true;
            cycle = self.reconnect_cycle.fetch_add(1, Ordering::SeqCst) + 1;
        }

        let mut backoff = {
            let config = self.config.lock();
            Backoff::new(
                config.reconnection_attempts,
                config.reconnection_delay,
                config.reconnection_delay_max,
            )
        };

        let weak = Arc::downgrade(self);
        drop(tokio::spawn(async move {
            loop {
                let generation;
                let delay = {
                    let Some(inner) = weak.upgrade() else { return };
                    let Some(delay) = backoff.next_delay() else {
                        info!("reconnect attempt budget exhausted");
                        inner.events.emit(&ManagerEvent::ReconnectFailed);
                        inner.end_cycle(cycle);
                        return;
                    };

                    // Take a fresh timer generation and register its
                    // cancellation; a cleanup during the wait invalidates
                    // exactly this pending timer.
                    generation = inner.timer_gen.fetch_add(1, Ordering::SeqCst) + 1;
                    let weak = weak.clone();
                    inner.subs.push(Subscription::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            let _ = inner.timer_gen.fetch_add(1, Ordering::SeqCst);
                        }
                    }));

                    info!(
                        delay_ms = delay.as_millis() as u64,
                        attempt = backoff.attempts(),
                        "waiting before reconnect attempt"
                    );
                    delay
                };

                tokio::time::sleep(delay).await;

                let Some(inner) = weak.upgrade() else { return };
                if inner.timer_gen.load(Ordering::SeqCst) != generation {
                    debug!("reconnect timer superseded");
                    inner.end_cycle(cycle);
                    return;
                }

                info!(attempt = backoff.attempts(), "attempting reconnect");
                let (tx, rx) = tokio::sync::oneshot::channel();
                inner.open_with(Some(Box::new(move |result| {
                    let _ = tx.send(result);
                })));
                drop(inner);

                match rx.await {
                    Ok(Ok(())) => {
                        let Some(inner) = weak.upgrade() else { return };
                        let attempts = backoff.reset();
                        inner.end_cycle(cycle);
                        info!(attempts, "reconnect succeeded");
                        inner.events.emit(&ManagerEvent::Reconnect(attempts));
                        return;
                    }
                    Ok(Err(err)) => {
                        let Some(inner) = weak.upgrade() else { return };
                        info!(error = %err, "reconnect attempt failed");
                        inner.events.emit(&ManagerEvent::ReconnectError(err));
                    }
                    Err(_) => {
                        // The attempt's listeners were torn down before the
                        // transport answered; the cycle is over.
                        let Some(inner) = weak.upgrade() else { return };
                        inner.end_cycle(cycle);
                        return;
                    }
                }
            }
        }));
    }

    /// Mark a reconnection cycle finished, unless a newer cycle has taken
    /// over in the meantime.
    fn end_cycle(&self, cycle: u64) {
        let mut lifecycle = self.lifecycle.lock();
        if self.reconnect_cycle.load(Ordering::SeqCst) == cycle {
            lifecycle.reconnecting = false;
        }
    }

    /// Cancel and discard every transport-scoped listener and pending timer.
    fn cleanup(&self) {
        let canceled = self.subs.drain();
        if canceled > 0 {
            debug!(canceled, "drained transport subscriptions");
        }
    }

    fn channel(self: &Arc<Self>, name: &str) -> Channel {
        let mut channels = self.channels.lock();
        if let Some(channel) = channels.get(name) {
            return channel.clone();
        }

        debug!(channel = name, "creating channel");
        let channel = Channel::new(name, Arc::downgrade(self));

        let weak = Arc::downgrade(self);
        let _ = channel.events().subscribe(move |event| {
            if matches!(event, ChannelEvent::Connected) {
                if let Some(inner) = weak.upgrade() {
                    let live = inner.connected_channels.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(live, "channel connected");
                }
            }
        });

        channels.insert(name.to_string(), channel.clone());
        channel
    }

    /// Called by a channel when it detaches; the last one out closes the
    /// connection.
    pub(crate) fn channel_detached(self: &Arc<Self>) {
        let previous = self.connected_channels.fetch_sub(1, Ordering::SeqCst);
        assert!(previous > 0, "channel detached with no connected channels");
        debug!(live = previous - 1, "channel detached");
        if previous == 1 {
            self.close();
        }
    }

    pub(crate) fn send_packet(&self, packet: &Packet) -> Result<()> {
        debug!(channel = %packet.channel, "writing packet");
        let bytes = self.codec.encode(packet)?;
        self.transport.write(bytes)
    }
}
