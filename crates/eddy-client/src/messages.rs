//! Typed representations of the wire protocol vocabulary.
//!
//! The protocol is a pair of top-level sums, one per direction, encoded in
//! BSATN like any other value: a tag byte selects the message, then the
//! message's fields follow in declared order.
//!
//! Client → Server:
//! - tag 0 [`Subscribe`] — replace the active query set.
//! - tag 1 [`CallReducer`] — invoke a server-side transactional function.
//!
//! Server → Client:
//! - tag 0 [`IdentityToken`] — one-shot handshake, always first.
//! - tag 1 [`InitialSubscription`] — full matching row set for a new
//!   query set (or the server-computed overlay when replacing one).
//! - tag 2 [`TransactionUpdate`] — the outcome of one committed, failed,
//!   or out-of-energy reducer call.
//!
//! Both directions implement encode and decode; the server half of the
//! codec doubles as the fixture builder for tests.

use bytes::Bytes;
use eddy_codec::{DecodeError, Reader, Writer};

use crate::identity::{ConnectionId, Identity};

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Replaces the connection's active query set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    /// SQL query strings defining the new subscribed set.
    pub queries: Vec<String>,
    /// Locally-generated correlation id, echoed by the matching
    /// [`InitialSubscription`].
    pub request_id: u32,
}

/// Invokes a reducer by name with BSATN-encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReducer {
    /// Reducer name.
    pub reducer: String,
    /// The argument product, pre-encoded against the reducer's schema.
    pub args: Bytes,
    /// Locally-generated correlation id. Ergonomic sugar only: reducer
    /// effects are observed through the broadcast channel regardless.
    pub request_id: u32,
}

/// A message sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Tag 0.
    Subscribe(Subscribe),
    /// Tag 1.
    CallReducer(CallReducer),
}

impl ClientMessage {
    /// Encodes this message as one wire frame.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new();
        match self {
            Self::Subscribe(msg) => {
                w.put_u8(0);
                w.put_count(msg.queries.len());
                for query in &msg.queries {
                    w.put_str(query);
                }
                w.put_u32(msg.request_id);
            }
            Self::CallReducer(msg) => {
                w.put_u8(1);
                w.put_str(&msg.reducer);
                w.put_bytes(&msg.args);
                w.put_u32(msg.request_id);
            }
        }
        w.finish()
    }

    /// Decodes one complete frame.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`] is fatal for the frame.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(frame);
        let msg = match r.get_u8()? {
            0 => {
                let count = r.get_count()?;
                let mut queries = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    queries.push(r.get_string()?);
                }
                let request_id = r.get_u32()?;
                Self::Subscribe(Subscribe { queries, request_id })
            }
            1 => Self::CallReducer(CallReducer {
                reducer: r.get_string()?,
                args: Bytes::copy_from_slice(r.get_bytes()?),
                request_id: r.get_u32()?,
            }),
            tag => return Err(DecodeError::InvalidTag { tag, variants: 2 }),
        };
        r.expect_exhausted()?;
        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// The one-shot handshake message, always first on a new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityToken {
    /// The principal this connection is authenticated as.
    pub identity: Identity,
    /// An opaque token the caller may persist for reuse on later
    /// connections. Persistence itself is out of scope here.
    pub token: String,
    /// This connection's server-assigned id.
    pub connection_id: ConnectionId,
}

/// All row changes for one table within one atomic payload.
///
/// Each entry is one BSATN-encoded row; rows are decoded lazily against the
/// table's registered row type. The encoded bytes double as the row's
/// identity key inside the client cache.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableUpdate {
    /// Table name, resolved against the schema registry.
    pub table_name: String,
    /// Rows entering the subscribed set.
    pub inserts: Vec<Bytes>,
    /// Rows leaving the subscribed set.
    pub deletes: Vec<Bytes>,
}

/// The full matching row set for a newly applied subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialSubscription {
    /// One update per subscribed table.
    pub tables: Vec<TableUpdate>,
    /// Echo of the originating [`Subscribe`]'s request id.
    pub request_id: u32,
}

/// Outcome of one reducer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Tag 0: the transaction committed; the carried diffs are applied to
    /// the cache.
    Committed(Vec<TableUpdate>),
    /// Tag 1: the reducer signalled failure; no diffs are carried.
    Failed(String),
    /// Tag 2: the module ran out of energy; no diffs are carried.
    OutOfEnergy,
}

/// The outcome of one reducer call, broadcast to affected subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionUpdate {
    /// Commit status, with diffs on commit or a message on failure.
    pub status: UpdateStatus,
    /// The identity of the principal that invoked the reducer.
    pub caller_identity: Identity,
    /// The connection the call was made from.
    pub caller_connection_id: ConnectionId,
    /// The reducer that ran.
    pub reducer: String,
    /// The call's BSATN-encoded argument product.
    pub args: Bytes,
}

/// A message sent from the server to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Tag 0.
    IdentityToken(IdentityToken),
    /// Tag 1.
    InitialSubscription(InitialSubscription),
    /// Tag 2.
    TransactionUpdate(TransactionUpdate),
}

impl TableUpdate {
    fn encode_into(&self, w: &mut Writer) {
        w.put_str(&self.table_name);
        w.put_count(self.inserts.len());
        for row in &self.inserts {
            w.put_bytes(row);
        }
        w.put_count(self.deletes.len());
        for row in &self.deletes {
            w.put_bytes(row);
        }
    }

    fn decode_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let table_name = r.get_string()?;
        let inserts = decode_row_list(r)?;
        let deletes = decode_row_list(r)?;
        Ok(Self {
            table_name,
            inserts,
            deletes,
        })
    }

    /// Returns `true` if the update carries no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

fn decode_row_list(r: &mut Reader<'_>) -> Result<Vec<Bytes>, DecodeError> {
    let count = r.get_count()?;
    let mut rows = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        rows.push(Bytes::copy_from_slice(r.get_bytes()?));
    }
    Ok(rows)
}

fn encode_table_list(w: &mut Writer, tables: &[TableUpdate]) {
    w.put_count(tables.len());
    for table in tables {
        table.encode_into(w);
    }
}

fn decode_table_list(r: &mut Reader<'_>) -> Result<Vec<TableUpdate>, DecodeError> {
    let count = r.get_count()?;
    let mut tables = Vec::with_capacity(count.min(256));
    for _ in 0..count {
        tables.push(TableUpdate::decode_from(r)?);
    }
    Ok(tables)
}

impl ServerMessage {
    /// Encodes this message as one wire frame.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new();
        match self {
            Self::IdentityToken(msg) => {
                w.put_u8(0);
                msg.identity.write_bsatn(&mut w);
                w.put_str(&msg.token);
                msg.connection_id.write_bsatn(&mut w);
            }
            Self::InitialSubscription(msg) => {
                w.put_u8(1);
                encode_table_list(&mut w, &msg.tables);
                w.put_u32(msg.request_id);
            }
            Self::TransactionUpdate(msg) => {
                w.put_u8(2);
                match &msg.status {
                    UpdateStatus::Committed(tables) => {
                        w.put_u8(0);
                        encode_table_list(&mut w, tables);
                    }
                    UpdateStatus::Failed(message) => {
                        w.put_u8(1);
                        w.put_str(message);
                    }
                    UpdateStatus::OutOfEnergy => w.put_u8(2),
                }
                msg.caller_identity.write_bsatn(&mut w);
                msg.caller_connection_id.write_bsatn(&mut w);
                w.put_str(&msg.reducer);
                w.put_bytes(&msg.args);
            }
        }
        w.finish()
    }

    /// Decodes one complete frame.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`] is fatal: either for the frame (and the caller
    /// drops it) or, since this is the message envelope itself, for the
    /// connection.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(frame);
        let msg = match r.get_u8()? {
            0 => Self::IdentityToken(IdentityToken {
                identity: Identity::read_bsatn(&mut r)?,
                token: r.get_string()?,
                connection_id: ConnectionId::read_bsatn(&mut r)?,
            }),
            1 => Self::InitialSubscription(InitialSubscription {
                tables: decode_table_list(&mut r)?,
                request_id: r.get_u32()?,
            }),
            2 => {
                let status = match r.get_u8()? {
                    0 => UpdateStatus::Committed(decode_table_list(&mut r)?),
                    1 => UpdateStatus::Failed(r.get_string()?),
                    2 => UpdateStatus::OutOfEnergy,
                    tag => return Err(DecodeError::InvalidTag { tag, variants: 3 }),
                };
                Self::TransactionUpdate(TransactionUpdate {
                    status,
                    caller_identity: Identity::read_bsatn(&mut r)?,
                    caller_connection_id: ConnectionId::read_bsatn(&mut r)?,
                    reducer: r.get_string()?,
                    args: Bytes::copy_from_slice(r.get_bytes()?),
                })
            }
            tag => return Err(DecodeError::InvalidTag { tag, variants: 3 }),
        };
        r.expect_exhausted()?;
        Ok(msg)
    }

    /// Wire name of this message kind, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IdentityToken(_) => "IdentityToken",
            Self::InitialSubscription(_) => "InitialSubscription",
            Self::TransactionUpdate(_) => "TransactionUpdate",
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
