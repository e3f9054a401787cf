//! Principal and connection identifiers assigned by the server.
//!
//! Both are delivered exactly once, in the `IdentityToken` handshake
//! message, and are immutable for the lifetime of the connection.

use std::fmt;

use eddy_codec::{DecodeError, Reader, Writer};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A 256-bit public identifier for a connected principal.
///
/// Stable across reconnections of the same principal. Encodes on the wire as
/// 32 raw bytes with no length prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity([u8; 32]);

impl Identity {
    /// The all-zero identity, used by tests and placeholder events.
    pub const ZERO: Identity = Identity([0; 32]);

    /// Wraps raw identity bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw identity bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Writes the 32 raw bytes.
    pub(crate) fn write_bsatn(&self, w: &mut Writer) {
        w.put_raw(&self.0);
    }

    /// Reads 32 raw bytes.
    pub(crate) fn read_bsatn(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self(r.get_array()?))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

/// An opaque per-connection identifier.
///
/// Unlike [`Identity`], a new one is assigned on every connection. Encodes
/// on the wire as 16 raw bytes with no length prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId([u8; 16]);

impl ConnectionId {
    /// The all-zero connection id, used by tests and placeholder events.
    pub const ZERO: ConnectionId = ConnectionId([0; 16]);

    /// Wraps raw connection id bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The raw connection id bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub(crate) fn write_bsatn(&self, w: &mut Writer) {
        w.put_raw(&self.0);
    }

    pub(crate) fn read_bsatn(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self(r.get_array()?))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({self})")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
