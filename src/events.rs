//! Typed event dispatch
//!
//! [`EventBus`] is an explicit, owned replacement for an inherited emitter
//! base class: subscribers register a callback and get back a [`ListenerId`]
//! they can use to unsubscribe. Delivery is synchronous and ordered, to the
//! set of subscribers present at emit time.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A typed event dispatcher with subscribe/unsubscribe/emit.
pub struct EventBus<E> {
    listeners: Mutex<Vec<(ListenerId, Listener<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener; it stays registered until unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Deliver `event` synchronously, in registration order, to the
    /// listeners registered at this moment.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe (including themselves) during dispatch without deadlock.
    /// A listener unsubscribed mid-dispatch may still observe this event.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_all_listeners_in_order() {
        let bus: EventBus<u32> = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let log = log.clone();
            let _ = bus.subscribe(move |value: &u32| log.lock().push(format!("{tag}:{value}")));
        }

        bus.emit(&7);
        assert_eq!(*log.lock(), vec!["a:7", "b:7", "c:7"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus: EventBus<()> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let id = bus.subscribe(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&());
        assert!(bus.unsubscribe(id));
        bus.emit(&());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_unknown_id() {
        let bus: EventBus<()> = EventBus::new();
        let id = bus.subscribe(|()| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_listener_may_unsubscribe_itself_during_dispatch() {
        let bus: Arc<EventBus<()>> = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));

        let id_cell: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let bus_ref = bus.clone();
        let cell = id_cell.clone();
        let counter = count.clone();

        let id = bus.subscribe(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *cell.lock() {
                bus_ref.unsubscribe(id);
            }
        });
        *id_cell.lock() = Some(id);

        bus.emit(&());
        bus.emit(&());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_subscribe_during_dispatch() {
        let bus: Arc<EventBus<()>> = Arc::new(EventBus::new());
        let bus_ref = bus.clone();

        let _ = bus.subscribe(move |()| {
            let _ = bus_ref.subscribe(|()| {});
        });

        bus.emit(&());
        assert_eq!(bus.listener_count(), 2);
    }
}
