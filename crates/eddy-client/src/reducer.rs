//! Per-reducer callback dispatch.
//!
//! Callbacks are keyed by reducer name and fire for every observed
//! [`ReducerEvent`], whatever its status: a failed call is ordinary protocol
//! data here, and the callback inspects [`Status`](crate::Status) to surface
//! it. The registry handle is cheaply cloneable so callbacks can register or
//! remove other callbacks from inside a dispatch.

use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::callbacks::{CallbackId, CallbackSet};
use crate::event::ReducerEvent;

/// Shape of a reducer callback.
pub(crate) type ReducerCallbackFn = dyn Fn(&ReducerEvent) + Send + Sync;

/// Reducer-name-keyed callback registries for one connection.
///
/// Cloning shares the underlying registries.
#[derive(Clone, Default)]
pub struct ReducerCallbacks {
    by_name: Arc<RwLock<FxHashMap<String, Arc<CallbackSet<ReducerCallbackFn>>>>>,
}

impl ReducerCallbacks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for events of the named reducer.
    pub fn on_reducer(
        &self,
        reducer: &str,
        callback: impl Fn(&ReducerEvent) + Send + Sync + 'static,
    ) -> CallbackId {
        let set = {
            let mut by_name = self.by_name.write();
            Arc::clone(
                by_name
                    .entry(reducer.to_owned())
                    .or_insert_with(|| Arc::new(CallbackSet::new())),
            )
        };
        set.insert(Arc::new(callback))
    }

    /// Removes a callback registered for the named reducer.
    pub fn remove_on_reducer(&self, reducer: &str, id: CallbackId) -> bool {
        let set = self.by_name.read().get(reducer).map(Arc::clone);
        set.is_some_and(|set| set.remove(id))
    }

    /// Fires every callback registered for `event`'s reducer.
    ///
    /// The registry lock is released before any callback runs; the set is
    /// snapshotted so mid-dispatch registration changes do not affect this
    /// event's dispatch.
    pub(crate) fn dispatch(&self, event: &ReducerEvent) {
        let set = self.by_name.read().get(event.reducer.as_str()).map(Arc::clone);
        if let Some(set) = set {
            for callback in set.snapshot() {
                callback(event);
            }
        }
    }
}

impl std::fmt::Debug for ReducerCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReducerCallbacks")
            .field("reducers", &self.by_name.read().len())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ConnectionId, Identity};
    use crate::Status;
    use bytes::Bytes;
    use parking_lot::Mutex;

    fn event(reducer: &str, status: Status) -> ReducerEvent {
        ReducerEvent {
            caller_identity: Identity::ZERO,
            caller_connection_id: ConnectionId::ZERO,
            reducer: reducer.into(),
            status,
            args: None,
            raw_args: Bytes::new(),
        }
    }

    #[test]
    fn test_dispatch_by_name() {
        let callbacks = ReducerCallbacks::new();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        callbacks.on_reducer("set_name", move |ev| sink.lock().push(ev.reducer.clone()));
        let sink = Arc::clone(&seen);
        callbacks.on_reducer("delete_user", move |ev| sink.lock().push(ev.reducer.clone()));

        callbacks.dispatch(&event("set_name", Status::Committed));
        assert_eq!(*seen.lock(), vec!["set_name"]);

        callbacks.dispatch(&event("unregistered", Status::Committed));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_remove() {
        let callbacks = ReducerCallbacks::new();
        let seen = Arc::new(Mutex::new(0u32));

        let sink = Arc::clone(&seen);
        let id = callbacks.on_reducer("set_name", move |_| *sink.lock() += 1);

        callbacks.dispatch(&event("set_name", Status::Committed));
        assert!(callbacks.remove_on_reducer("set_name", id));
        callbacks.dispatch(&event("set_name", Status::Committed));
        assert_eq!(*seen.lock(), 1);

        assert!(!callbacks.remove_on_reducer("set_name", id));
        assert!(!callbacks.remove_on_reducer("never_registered", id));
    }

    #[test]
    fn test_register_from_inside_callback() {
        let callbacks = ReducerCallbacks::new();
        let seen = Arc::new(Mutex::new(0u32));

        let inner_registry = callbacks.clone();
        let sink = Arc::clone(&seen);
        callbacks.on_reducer("set_name", move |_| {
            *sink.lock() += 1;
            let sink = Arc::clone(&sink);
            inner_registry.on_reducer("set_name", move |_| *sink.lock() += 100);
        });

        callbacks.dispatch(&event("set_name", Status::Committed));
        assert_eq!(*seen.lock(), 1);

        callbacks.dispatch(&event("set_name", Status::Committed));
        // First callback again (+1), plus one late registration (+100); the
        // registration made during this dispatch does not fire in it.
        assert_eq!(*seen.lock(), 102);
    }

    #[test]
    fn test_failed_status_is_delivered() {
        let callbacks = ReducerCallbacks::new();
        let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&messages);
        callbacks.on_reducer("set_name", move |ev| {
            if let Some(message) = ev.message() {
                sink.lock().push(message.to_owned());
            }
        });

        callbacks.dispatch(&event("set_name", Status::Failed("name taken".into())));
        assert_eq!(*messages.lock(), vec!["name taken"]);
    }
}
