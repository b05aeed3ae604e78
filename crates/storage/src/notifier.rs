//! Subscriber registry for new-tree-head notifications.

use ctlog_types::SignedTreeHead;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Receives a callback whenever a new signed tree head becomes the latest.
///
/// Callbacks are invoked after the store's lock has been released, so an
/// implementation may call back into the store without deadlocking. Delivery
/// order across subscribers is unspecified.
pub trait TreeHeadSubscriber: Send + Sync {
    /// Called with the newly current tree head.
    fn tree_head_updated(&self, sth: &SignedTreeHead);
}

/// A set of registered [`TreeHeadSubscriber`]s.
///
/// Membership is keyed on `Arc` identity: adding the same subscriber twice is
/// a no-op, as is removing one that was never added. The registry lock is
/// held only to snapshot the subscriber list, never across an invocation.
pub(crate) struct SubscriberRegistry {
    subscribers: Mutex<Vec<Arc<dyn TreeHeadSubscriber>>>,
}

impl SubscriberRegistry {
    pub(crate) const fn new() -> Self {
        Self { subscribers: Mutex::new(Vec::new()) }
    }

    pub(crate) fn add(&self, subscriber: Arc<dyn TreeHeadSubscriber>) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if !subscribers.iter().any(|s| Arc::ptr_eq(s, &subscriber)) {
            subscribers.push(subscriber);
        }
    }

    pub(crate) fn remove(&self, subscriber: &Arc<dyn TreeHeadSubscriber>) {
        self.subscribers.lock().unwrap().retain(|s| !Arc::ptr_eq(s, subscriber));
    }

    /// Invokes every registered subscriber with `sth`.
    ///
    /// The caller must not hold the store lock: subscribers are allowed to
    /// re-enter the store.
    pub(crate) fn notify_all(&self, sth: &SignedTreeHead) {
        let snapshot = self.subscribers.lock().unwrap().clone();
        debug!(
            target: "ctlog_storage",
            tree_size = sth.tree_size,
            subscribers = snapshot.len(),
            "Notifying tree head subscribers"
        );
        for subscriber in snapshot {
            subscriber.tree_head_updated(sth);
        }
    }
}

impl core::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let count = self.subscribers.lock().unwrap().len();
        f.debug_struct("SubscriberRegistry").field("subscribers", &count).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscriber {
        calls: AtomicUsize,
    }

    impl TreeHeadSubscriber for CountingSubscriber {
        fn tree_head_updated(&self, _sth: &SignedTreeHead) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter() -> Arc<CountingSubscriber> {
        Arc::new(CountingSubscriber { calls: AtomicUsize::new(0) })
    }

    #[test]
    fn double_add_delivers_once() {
        let registry = SubscriberRegistry::new();
        let subscriber = counter();
        let as_dyn: Arc<dyn TreeHeadSubscriber> = subscriber.clone();
        registry.add(as_dyn.clone());
        registry.add(as_dyn);

        registry.notify_all(&SignedTreeHead::default());
        assert_eq!(subscriber.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let subscriber = counter();
        let as_dyn: Arc<dyn TreeHeadSubscriber> = subscriber.clone();
        registry.add(as_dyn.clone());
        registry.remove(&as_dyn);
        registry.remove(&as_dyn);

        registry.notify_all(&SignedTreeHead::default());
        assert_eq!(subscriber.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn removing_unregistered_subscriber_is_a_no_op() {
        let registry = SubscriberRegistry::new();
        let registered = counter();
        let stranger: Arc<dyn TreeHeadSubscriber> = counter();
        registry.add(registered.clone());
        registry.remove(&stranger);

        registry.notify_all(&SignedTreeHead::default());
        assert_eq!(registered.calls.load(Ordering::SeqCst), 1);
    }
}
