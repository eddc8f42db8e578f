//! Cancelable subscription handles
//!
//! Every listener or timer the manager binds while a connection attempt or an
//! open connection is live gets a [`Subscription`] recorded in a
//! [`SubscriptionList`]. Any transition out of that phase drains the list,
//! canceling every handle exactly once, so no stale listener can fire after
//! the transition and none is ever double-canceled.

use parking_lot::Mutex;

/// A cancel-once handle for a bound listener or scheduled timer.
///
/// The handle owns nothing beyond its cancel action; canceling is
/// idempotent by construction because the action is consumed on first use.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a cancel action
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Invoke the cancel action
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Append-only collection of subscriptions, drained as a batch.
pub struct SubscriptionList {
    entries: Mutex<Vec<Subscription>>,
}

impl SubscriptionList {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Record a subscription
    pub fn push(&self, sub: Subscription) {
        self.entries.lock().push(sub);
    }

    /// Take every recorded subscription atomically and cancel each one.
    ///
    /// Safe to call with an empty list, repeatedly. Cancel actions run
    /// outside the list lock, so they may push new subscriptions without
    /// deadlocking (those survive this drain). Returns the number canceled.
    pub fn drain(&self) -> usize {
        let entries = std::mem::take(&mut *self.entries.lock());
        let count = entries.len();
        for sub in entries {
            sub.cancel();
        }
        count
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for SubscriptionList {
    fn default() -> Self {
        Self::new()
    }
}
