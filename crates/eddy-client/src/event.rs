//! Reducer outcome events delivered alongside cache mutations.

use bytes::Bytes;
use eddy_codec::ProductValue;

use crate::identity::{ConnectionId, Identity};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// How a reducer invocation ended.
///
/// A non-committed status is ordinary protocol data, not an error at this
/// layer: the server delivers it through the same event channel as commits,
/// and only the API boundary facing application code turns it into a
/// caller-visible failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The transaction committed and its diffs were applied to the cache.
    Committed,
    /// The reducer signalled failure; nothing was applied.
    Failed(String),
    /// The module's energy budget was exhausted; nothing was applied.
    OutOfEnergy,
}

impl Status {
    /// Returns `true` for [`Status::Committed`].
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// The failure message, if the reducer failed.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            Self::Committed | Self::OutOfEnergy => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ReducerEvent
// ---------------------------------------------------------------------------

/// Context for one reducer invocation observed over the wire.
///
/// Row callbacks receive `Option<&ReducerEvent>`; `None` marks a row change
/// that came from an initial subscription snapshot rather than any reducer.
#[derive(Debug, Clone)]
pub struct ReducerEvent {
    /// The principal that invoked the reducer.
    pub caller_identity: Identity,
    /// The connection the call was made from.
    pub caller_connection_id: ConnectionId,
    /// Name of the reducer that ran.
    pub reducer: String,
    /// How the invocation ended.
    pub status: Status,
    /// Arguments decoded against the registry's argument schema, when the
    /// reducer is registered and its arguments decoded cleanly.
    pub args: Option<ProductValue>,
    /// The raw argument bytes, always retained.
    pub raw_args: Bytes,
}

impl ReducerEvent {
    /// Returns `true` if this event was caused by the given principal on
    /// the given connection.
    ///
    /// Reducer callbacks fire for every observed event; a client compares
    /// against its own identity and connection id to decide whether an
    /// event is its own call's outcome.
    #[must_use]
    pub fn caused_by(&self, identity: Identity, connection_id: ConnectionId) -> bool {
        self.caller_identity == identity && self.caller_connection_id == connection_id
    }

    /// The failure message, if the reducer failed.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.status.message()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: Status) -> ReducerEvent {
        ReducerEvent {
            caller_identity: Identity::from_bytes([1; 32]),
            caller_connection_id: ConnectionId::from_bytes([2; 16]),
            reducer: "set_name".into(),
            status,
            args: None,
            raw_args: Bytes::new(),
        }
    }

    #[test]
    fn test_caused_by() {
        let ev = event(Status::Committed);
        assert!(ev.caused_by(
            Identity::from_bytes([1; 32]),
            ConnectionId::from_bytes([2; 16])
        ));
        // Same identity from a different connection is not "mine".
        assert!(!ev.caused_by(
            Identity::from_bytes([1; 32]),
            ConnectionId::from_bytes([3; 16])
        ));
        assert!(!ev.caused_by(
            Identity::from_bytes([9; 32]),
            ConnectionId::from_bytes([2; 16])
        ));
    }

    #[test]
    fn test_status_message() {
        assert_eq!(event(Status::Committed).message(), None);
        assert_eq!(event(Status::OutOfEnergy).message(), None);
        assert_eq!(
            event(Status::Failed("no such user".into())).message(),
            Some("no such user")
        );
        assert!(!Status::Failed(String::new()).is_committed());
        assert!(Status::Committed.is_committed());
    }
}
