//! # Eddy Client
//!
//! A client-side library that keeps a local, in-memory replica of a subset
//! of a remote Eddy database's tables synchronized in real time, and that
//! invokes server-side transactional functions ("reducers") as RPCs whose
//! effects are observed through the same replication channel.
//!
//! ## Architecture
//!
//! - **Wire messages** ([`messages`]) — the small fixed protocol
//!   vocabulary, BSATN-encoded via [`eddy_codec`].
//! - **Client cache** — per-table row stores keyed by content identity
//!   (the row's encoded bytes), applied to in two passes (deletes before
//!   inserts) with primary-key update coalescing.
//! - **Subscriptions** — the `Idle → Pending → Applied` query-set
//!   lifecycle; snapshot and replacement payloads are routed into the cache
//!   unchanged, with `event = None`.
//! - **Reducer dispatch** — correlates `TransactionUpdate`s to
//!   per-reducer callbacks; committed diffs mutate the cache atomically
//!   before any callback fires.
//! - **Connection** ([`DbConnection`]) — single-threaded frame routing
//!   over an opaque byte-frame [`Transport`], with a one-shot
//!   `IdentityToken` handshake and a terminal disconnect event.
//!
//! ## What this crate does not do
//!
//! Transport implementation, authentication/token storage, reconnection and
//! re-subscription, and per-table code generation all live with the
//! embedder. The generated (or hand-written) binding set describes itself
//! through a [`SchemaRegistry`] passed in at connection construction.

pub mod messages;

mod cache;
mod callbacks;
mod connection;
mod error;
mod event;
mod identity;
mod reducer;
mod registry;
mod subscription;
mod table;

pub use callbacks::CallbackId;
pub use connection::{ConnectionConfig, DbConnection, DbConnectionBuilder, Transport};
pub use error::{ClientError, SchemaError, TransportError};
pub use event::{ReducerEvent, Status};
pub use identity::{ConnectionId, Identity};
pub use reducer::ReducerCallbacks;
pub use registry::{SchemaRegistry, SchemaRegistryBuilder};
pub use subscription::{SubscriptionHandle, SubscriptionState};
pub use table::{PrimaryKeyRow, Row, TableHandle};
