//! Connection lifecycle listeners.

use std::sync::Arc;

use parking_lot::RwLock;

/// Observes connection lifecycle events.
pub trait ConnectionListener: Send + Sync {
    /// Called after a connection is established and bound.
    fn connection_opened(&self) {}

    /// Called after a connection closes, cleanly or not.
    fn connection_closed(&self) {}
}

/// A shared registry of [`ConnectionListener`]s.
///
/// Backends clone the registry into their connections and driver tasks;
/// registration takes effect for events after it.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<RwLock<Vec<Arc<dyn ConnectionListener>>>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn register(&self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.write().push(listener);
    }

    /// Removes a previously registered listener.
    ///
    /// Identity is the `Arc` allocation, so the caller passes the same
    /// handle it registered. Unknown handles are ignored.
    pub fn unregister(&self, listener: &Arc<dyn ConnectionListener>) {
        self.listeners.write().retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Notifies all listeners of an open.
    pub fn notify_opened(&self) {
        for listener in self.listeners.read().iter() {
            listener.connection_opened();
        }
    }

    /// Notifies all listeners of a close.
    pub fn notify_closed(&self) {
        for listener in self.listeners.read().iter() {
            listener.connection_closed();
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry").field("listeners", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl ConnectionListener for Counter {
        fn connection_opened(&self) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }

        fn connection_closed(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn listeners_receive_events() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(Counter::default());
        registry.register(Arc::clone(&counter) as Arc<dyn ConnectionListener>);

        registry.notify_opened();
        registry.notify_opened();
        registry.notify_closed();

        assert_eq!(counter.opened.load(Ordering::SeqCst), 2);
        assert_eq!(counter.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_registry_is_fine() {
        let registry = ListenerRegistry::new();
        assert!(registry.is_empty());
        registry.notify_closed();
    }

    #[test]
    fn unregistered_listeners_stop_receiving_events() {
        let registry = ListenerRegistry::new();
        let kept = Arc::new(Counter::default());
        let removed = Arc::new(Counter::default());
        let kept_handle = Arc::clone(&kept) as Arc<dyn ConnectionListener>;
        let removed_handle = Arc::clone(&removed) as Arc<dyn ConnectionListener>;
        registry.register(Arc::clone(&kept_handle));
        registry.register(Arc::clone(&removed_handle));

        registry.notify_opened();
        registry.unregister(&removed_handle);
        assert_eq!(registry.len(), 1);
        registry.notify_opened();

        assert_eq!(kept.opened.load(Ordering::SeqCst), 2);
        assert_eq!(removed.opened.load(Ordering::SeqCst), 1);

        // Unknown handles are a no-op.
        registry.unregister(&removed_handle);
        assert_eq!(registry.len(), 1);
    }
}
