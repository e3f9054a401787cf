//! Subscription lifecycle tracking.
//!
//! One connection carries one active query set at a time. The lifecycle is
//! `Idle → Pending → Applied`; subscribing again from `Applied` (or
//! `Pending`) starts a new generation and returns to `Pending`. The server
//! owns replacement semantics: when a query set supersedes another, rows
//! that no longer match arrive as deletes and newly matching rows as
//! inserts, packaged like any other snapshot payload, so this manager only
//! routes acknowledgements and never computes set differences.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fxhash::FxHashMap;
use tracing::{debug, warn};

/// Callback fired once when a subscribe call's snapshot has been applied.
pub(crate) type OnAppliedFn = Box<dyn FnOnce() + Send>;

// ---------------------------------------------------------------------------
// SubscriptionHandle
// ---------------------------------------------------------------------------

/// Tracks one subscribe call.
///
/// The handle is passive: dropping it does not unsubscribe (the query set
/// is replaced only by a later subscribe call).
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    request_id: u32,
    applied: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// The request id carried by the `Subscribe` message, echoed by the
    /// server's acknowledgement.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Returns `true` once the server has delivered this subscription's
    /// initial snapshot.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// SubscriptionManager
// ---------------------------------------------------------------------------

/// Lifecycle state of the connection's query set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No subscribe call has been made.
    Idle,
    /// A subscribe was sent; its snapshot has not arrived yet.
    Pending,
    /// The newest subscribe call's snapshot has been applied.
    Applied,
}

struct Generation {
    applied: Arc<AtomicBool>,
    on_applied: Option<OnAppliedFn>,
}

/// Tracks the active query set and correlates snapshot acknowledgements.
pub(crate) struct SubscriptionManager {
    state: SubscriptionState,
    queries: Vec<String>,
    current_request: u32,
    /// In-flight generations by request id. A superseded generation stays
    /// here until its acknowledgement arrives (the server serializes them).
    generations: FxHashMap<u32, Generation>,
}

impl SubscriptionManager {
    pub(crate) fn new() -> Self {
        Self {
            state: SubscriptionState::Idle,
            queries: Vec::new(),
            current_request: 0,
            generations: FxHashMap::default(),
        }
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        self.state
    }

    /// The most recently requested query set.
    pub(crate) fn queries(&self) -> &[String] {
        &self.queries
    }

    /// Starts a new generation for a subscribe call that was just sent.
    pub(crate) fn begin(
        &mut self,
        request_id: u32,
        queries: Vec<String>,
        on_applied: Option<OnAppliedFn>,
    ) -> SubscriptionHandle {
        debug!(request_id, queries = queries.len(), "subscription pending");
        self.state = SubscriptionState::Pending;
        self.queries = queries;
        self.current_request = request_id;

        let applied = Arc::new(AtomicBool::new(false));
        self.generations.insert(
            request_id,
            Generation {
                applied: Arc::clone(&applied),
                on_applied,
            },
        );
        SubscriptionHandle {
            request_id,
            applied,
        }
    }

    /// Returns `true` if snapshot payloads may be routed into the cache,
    /// i.e. at least one subscribe call has been made.
    pub(crate) fn accepts_snapshots(&self) -> bool {
        self.state != SubscriptionState::Idle
    }

    /// Records the server's acknowledgement of `request_id` and returns the
    /// generation's `on_applied` callback for the connection to fire after
    /// the snapshot's row callbacks.
    ///
    /// An acknowledgement for an unknown request id is logged and ignored.
    pub(crate) fn acknowledge(&mut self, request_id: u32) -> Option<OnAppliedFn> {
        let Some(mut generation) = self.generations.remove(&request_id) else {
            warn!(request_id, "snapshot acknowledges an unknown subscribe request");
            return None;
        };
        generation.applied.store(true, Ordering::Release);
        if request_id == self.current_request {
            debug!(request_id, "subscription applied");
            self.state = SubscriptionState::Applied;
        } else {
            // A superseded generation's snapshot; the newest one is still
            // in flight behind it.
            debug!(request_id, "superseded subscription applied");
        }
        generation.on_applied.take()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
