// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Listener Registry
//!
//! Subscriptions are keyed by a [`ListenerId`] handle returned on
//! registration. Notification iterates over a snapshot, so adding or
//! removing a listener concurrently with delivery neither blocks the
//! delivering thread nor skips or repeats other listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Copy-on-write set of listeners of type `L`.
pub struct Listeners<L: ?Sized> {
    entries: RwLock<Arc<Vec<(ListenerId, Arc<L>)>>>,
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Listeners {
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl<L: ?Sized> Listeners<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId::next();
        let mut entries = self.entries.write();
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push((id, listener));
        *entries = Arc::new(next);
        id
    }

    /// Returns whether a listener was removed.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        if !entries.iter().any(|(entry_id, _)| *entry_id == id) {
            return false;
        }
        let next: Vec<_> = entries
            .iter()
            .filter(|(entry_id, _)| *entry_id != id)
            .cloned()
            .collect();
        *entries = Arc::new(next);
        true
    }

    pub fn clear(&self) {
        *self.entries.write() = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current listeners; later registrations are not included.
    pub fn snapshot(&self) -> Arc<Vec<(ListenerId, Arc<L>)>> {
        Arc::clone(&self.entries.read())
    }

    /// Calls `f` for each listener in registration order.
    pub fn for_each(&self, mut f: impl FnMut(&L)) {
        for (_, listener) in self.snapshot().iter() {
            f(listener);
        }
    }
}

// INLINE_TEST_REQUIRED: uses a private listener trait to exercise unsized entries
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    trait Counter: Send + Sync {
        fn hit(&self);
    }

    struct Hits(AtomicUsize);

    impl Counter for Hits {
        fn hit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_notify_remove() {
        let listeners: Listeners<dyn Counter> = Listeners::new();
        let hits = Arc::new(Hits(AtomicUsize::new(0)));

        let id = listeners.add(hits.clone());
        listeners.for_each(|l| l.hit());
        assert_eq!(hits.0.load(Ordering::SeqCst), 1);

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.for_each(|l| l.hit());
        assert_eq!(hits.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_listener_twice_gets_two_handles() {
        let listeners: Listeners<dyn Counter> = Listeners::new();
        let hits = Arc::new(Hits(AtomicUsize::new(0)));

        let a = listeners.add(hits.clone());
        let b = listeners.add(hits.clone());
        assert_ne!(a, b);
        assert_eq!(listeners.len(), 2);
    }
}
