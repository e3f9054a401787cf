//! Error types for the client connection.

use eddy_codec::DecodeError;
use thiserror::Error;

/// An error reported by the transport collaborator.
///
/// The transport is opaque to this crate; its failures are carried as a
/// message only.
#[derive(Debug, Clone, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Errors surfaced by [`DbConnection`](crate::DbConnection) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A message envelope failed to decode. Fatal for the connection: byte
    /// boundaries on a binary stream cannot be resynchronized.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An inbound frame exceeded the configured size limit.
    #[error("inbound frame of {len} bytes exceeds the {max}-byte limit")]
    FrameTooLarge {
        /// Size of the offending frame.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// A second `IdentityToken` arrived on a connection that already
    /// completed its handshake. The handshake is one-shot.
    #[error("received a second IdentityToken on one connection")]
    DuplicateIdentityToken,

    /// A data message arrived before the `IdentityToken` handshake.
    #[error("received {kind} before the IdentityToken handshake")]
    MessageBeforeHandshake {
        /// Wire name of the offending message.
        kind: &'static str,
    },

    /// The connection has been disconnected and accepts no further work.
    #[error("connection is no longer active")]
    NotActive,

    /// The requested table is not present in the schema registry.
    #[error("table '{0}' is not registered")]
    UnknownTable(&'static str),

    /// The transport failed to accept an outbound frame.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors detected while assembling a [`SchemaRegistry`](crate::SchemaRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The same table name was registered twice.
    #[error("table '{0}' registered twice")]
    DuplicateTable(&'static str),

    /// The same reducer name was registered twice.
    #[error("reducer '{0}' registered twice")]
    DuplicateReducer(&'static str),
}
