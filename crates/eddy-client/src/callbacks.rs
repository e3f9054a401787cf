//! Callback registration primitives.
//!
//! A [`CallbackSet`] holds the callbacks registered for one kind of event on
//! one target. Dispatch snapshots the registered list before invoking
//! anything, so registering or removing callbacks from inside a firing
//! callback is always safe and never affects which callbacks fire for the
//! current batch. The lock is held only while snapshotting or mutating the
//! list, never while a callback runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

/// Identifies one registered callback for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// A set of registered callbacks of one shape `F` (an unsized `dyn Fn` type).
pub struct CallbackSet<F: ?Sized> {
    entries: Mutex<Vec<(CallbackId, Arc<F>)>>,
    next_id: AtomicU64,
}

impl<F: ?Sized> Default for CallbackSet<F> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<F: ?Sized> CallbackSet<F> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback`, returning an id for [`CallbackSet::remove`].
    pub fn insert(&self, callback: Arc<F>) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, callback));
        id
    }

    /// Removes the callback registered under `id`.
    ///
    /// Returns `false` if the id was never registered or already removed.
    /// Removal does not affect a dispatch snapshot taken before this call.
    pub fn remove(&self, id: CallbackId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones the current registration list out of the lock.
    ///
    /// Callers iterate the snapshot to dispatch; mutations racing with (or
    /// made during) the iteration apply to the live list only.
    #[must_use]
    pub fn snapshot(&self) -> SmallVec<[Arc<F>; 4]> {
        self.entries
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}

impl<F: ?Sized> std::fmt::Debug for CallbackSet<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet").field("len", &self.len()).finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    type TestFn = dyn Fn(u32) + Send + Sync;

    fn collect_set() -> (Arc<CallbackSet<TestFn>>, Arc<Mutex<Vec<u32>>>) {
        (Arc::new(CallbackSet::new()), Arc::new(Mutex::new(Vec::new())))
    }

    #[test]
    fn test_insert_and_fire() {
        let (set, seen) = collect_set();
        let sink = Arc::clone(&seen);
        set.insert(Arc::new(move |v| sink.lock().push(v)));

        for callback in set.snapshot() {
            callback(7);
        }
        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn test_remove() {
        let (set, seen) = collect_set();
        let sink = Arc::clone(&seen);
        let id = set.insert(Arc::new(move |v| sink.lock().push(v)));

        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert!(set.is_empty());

        for callback in set.snapshot() {
            callback(7);
        }
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_register_during_dispatch_does_not_fire_in_batch() {
        let (set, seen) = collect_set();
        let set_inner = Arc::clone(&set);
        let sink = Arc::clone(&seen);
        let sink_inner = Arc::clone(&seen);
        set.insert(Arc::new(move |v| {
            sink.lock().push(v);
            // Registering from inside a firing callback must not add to the
            // in-flight snapshot.
            let sink_late = Arc::clone(&sink_inner);
            set_inner.insert(Arc::new(move |v| sink_late.lock().push(v + 100)));
        }));

        for callback in set.snapshot() {
            callback(1);
        }
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(set.len(), 2);

        // The next batch sees both.
        for callback in set.snapshot() {
            callback(2);
        }
        assert_eq!(*seen.lock(), vec![1, 2, 102]);
    }

    #[test]
    fn test_remove_during_dispatch_still_fires_batch() {
        let (set, seen) = collect_set();
        let removed_id = Arc::new(Mutex::new(None::<CallbackId>));

        let set_inner = Arc::clone(&set);
        let id_cell = Arc::clone(&removed_id);
        let sink = Arc::clone(&seen);
        set.insert(Arc::new(move |v| {
            sink.lock().push(v);
            if let Some(id) = *id_cell.lock() {
                set_inner.remove(id);
            }
        }));

        let sink = Arc::clone(&seen);
        let second = set.insert(Arc::new(move |v| sink.lock().push(v + 10)));
        *removed_id.lock() = Some(second);

        // The first callback removes the second mid-dispatch; the snapshot
        // still fires it for this batch.
        for callback in set.snapshot() {
            callback(1);
        }
        assert_eq!(*seen.lock(), vec![1, 11]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let set: CallbackSet<TestFn> = CallbackSet::new();
        let a = set.insert(Arc::new(|_| {}));
        let b = set.insert(Arc::new(|_| {}));
        assert_ne!(a, b);
    }
}
