//! The connection: frame routing, handshake, and outbound calls.
//!
//! A [`DbConnection`] is single-threaded and event-driven. The embedder owns
//! the transport's receive side and feeds each inbound frame to
//! [`DbConnection::handle_frame`]; frames are processed strictly in call
//! order and every cache mutation happens synchronously inside that call.
//! Outbound operations (subscribe, call-reducer) are fire-and-forget: they
//! serialize a frame, hand it to the [`Transport`], and return; their
//! effects surface later as ordinary inbound messages.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use eddy_codec::{AlgebraicValue, ProductType, ProductValue, Reader, Writer};

use crate::cache::{ClientCache, TypedSlot};
use crate::error::{ClientError, TransportError};
use crate::event::{ReducerEvent, Status};
use crate::identity::{ConnectionId, Identity};
use crate::messages::{
    CallReducer, ClientMessage, IdentityToken, InitialSubscription, ServerMessage, Subscribe,
    TransactionUpdate, UpdateStatus,
};
use crate::reducer::ReducerCallbacks;
use crate::registry::SchemaRegistry;
use crate::subscription::{OnAppliedFn, SubscriptionHandle, SubscriptionManager, SubscriptionState};
use crate::table::{Row, TableHandle};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// The outbound half of the opaque byte-frame channel.
///
/// The transport must deliver frames reliably and in order (a WebSocket,
/// typically). Its receive side stays with the embedder, which forwards
/// each inbound frame to [`DbConnection::handle_frame`] and reports channel
/// loss via [`DbConnection::handle_transport_closed`].
pub trait Transport: Send {
    /// Hands one encoded frame to the channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the channel cannot accept the frame.
    fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Asks the channel to close. Default is a no-op.
    fn close(&mut self) {}
}

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Tunables for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Largest inbound frame accepted before the connection gives up with
    /// [`ClientError::FrameTooLarge`].
    pub max_frame_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// DbConnectionBuilder
// ---------------------------------------------------------------------------

type OnConnectFn = Box<dyn FnOnce(Identity, ConnectionId, &str) + Send>;
type OnDisconnectFn = Box<dyn FnOnce(Option<&ClientError>) + Send>;

/// Builder for [`DbConnection`].
#[derive(Default)]
pub struct DbConnectionBuilder {
    config: ConnectionConfig,
    on_connect: Option<OnConnectFn>,
    on_disconnect: Option<OnDisconnectFn>,
}

impl DbConnectionBuilder {
    /// Overrides the default configuration.
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers the one-shot handshake callback, fired when the
    /// `IdentityToken` arrives. The token string is handed to the caller
    /// for persistence and reuse on later connections; this crate keeps it
    /// only for [`DbConnection::token`].
    #[must_use]
    pub fn on_connect(
        mut self,
        callback: impl FnOnce(Identity, ConnectionId, &str) + Send + 'static,
    ) -> Self {
        self.on_connect = Some(Box::new(callback));
        self
    }

    /// Registers the terminal disconnect callback. It fires exactly once,
    /// whether the embedder called [`DbConnection::disconnect`] or reported
    /// transport loss.
    #[must_use]
    pub fn on_disconnect(
        mut self,
        callback: impl FnOnce(Option<&ClientError>) + Send + 'static,
    ) -> Self {
        self.on_disconnect = Some(Box::new(callback));
        self
    }

    /// Builds the connection over `transport`, instantiating one cache slot
    /// per table in `registry`.
    #[must_use]
    pub fn build(self, registry: Arc<SchemaRegistry>, transport: Box<dyn Transport>) -> DbConnection {
        let cache = registry.instantiate();
        DbConnection {
            config: self.config,
            registry,
            cache,
            subscriptions: SubscriptionManager::new(),
            reducers: ReducerCallbacks::new(),
            transport,
            session: None,
            active: true,
            next_request_id: 1,
            on_connect: self.on_connect,
            on_disconnect: self.on_disconnect,
        }
    }
}

// ---------------------------------------------------------------------------
// DbConnection
// ---------------------------------------------------------------------------

/// Identity material delivered by the handshake, immutable thereafter.
struct Session {
    identity: Identity,
    connection_id: ConnectionId,
    token: String,
}

/// One client connection: the cache it owns, its subscription state, and
/// its callback registries.
pub struct DbConnection {
    config: ConnectionConfig,
    registry: Arc<SchemaRegistry>,
    cache: ClientCache,
    subscriptions: SubscriptionManager,
    reducers: ReducerCallbacks,
    transport: Box<dyn Transport>,
    session: Option<Session>,
    active: bool,
    next_request_id: u32,
    on_connect: Option<OnConnectFn>,
    on_disconnect: Option<OnDisconnectFn>,
}

impl DbConnection {
    /// Starts building a connection.
    #[must_use]
    pub fn builder() -> DbConnectionBuilder {
        DbConnectionBuilder::default()
    }

    // ── Inbound ──

    /// Processes one inbound frame.
    ///
    /// All cache mutation and callback dispatch for the frame happens
    /// synchronously inside this call, in arrival order.
    ///
    /// # Errors
    ///
    /// A [`ClientError::Decode`] (or [`ClientError::FrameTooLarge`],
    /// [`ClientError::DuplicateIdentityToken`],
    /// [`ClientError::MessageBeforeHandshake`]) is fatal for the
    /// connection: the stream cannot be resynchronized and the embedder
    /// should close the transport. Unknown table or reducer names inside a
    /// well-formed message are NOT errors; those updates are logged and
    /// dropped individually.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), ClientError> {
        if !self.active {
            return Err(ClientError::NotActive);
        }
        if frame.len() > self.config.max_frame_bytes {
            return Err(ClientError::FrameTooLarge {
                len: frame.len(),
                max: self.config.max_frame_bytes,
            });
        }

        match ServerMessage::decode(frame)? {
            ServerMessage::IdentityToken(token) => self.handle_identity_token(token),
            ServerMessage::InitialSubscription(sub) => self.handle_initial_subscription(sub),
            ServerMessage::TransactionUpdate(update) => self.handle_transaction_update(update),
        }
    }

    fn handle_identity_token(&mut self, token: IdentityToken) -> Result<(), ClientError> {
        if self.session.is_some() {
            return Err(ClientError::DuplicateIdentityToken);
        }
        debug!(identity = %token.identity, connection_id = %token.connection_id, "handshake complete");
        let IdentityToken {
            identity,
            token,
            connection_id,
        } = token;
        if let Some(callback) = self.on_connect.take() {
            callback(identity, connection_id, &token);
        }
        self.session = Some(Session {
            identity,
            connection_id,
            token,
        });
        Ok(())
    }

    fn handle_initial_subscription(&mut self, sub: InitialSubscription) -> Result<(), ClientError> {
        if self.session.is_none() {
            return Err(ClientError::MessageBeforeHandshake {
                kind: "InitialSubscription",
            });
        }
        if !self.subscriptions.accepts_snapshots() {
            warn!(
                request_id = sub.request_id,
                "dropping snapshot with no subscribe call outstanding",
            );
            return Ok(());
        }

        // Snapshot rows carry no reducer event. Replacement diffs arrive
        // from the server in this same shape; idempotent inserts keep rows
        // present under both the old and new query sets callback-silent.
        self.cache.apply_database_update(&sub.tables, None);

        if let Some(on_applied) = self.subscriptions.acknowledge(sub.request_id) {
            on_applied();
        }
        Ok(())
    }

    fn handle_transaction_update(&mut self, update: TransactionUpdate) -> Result<(), ClientError> {
        if self.session.is_none() {
            return Err(ClientError::MessageBeforeHandshake {
                kind: "TransactionUpdate",
            });
        }

        let (status, tables) = match update.status {
            UpdateStatus::Committed(tables) => (Status::Committed, Some(tables)),
            UpdateStatus::Failed(message) => (Status::Failed(message), None),
            UpdateStatus::OutOfEnergy => (Status::OutOfEnergy, None),
        };

        let args = self.decode_reducer_args(&update.reducer, &update.args);
        let event = ReducerEvent {
            caller_identity: update.caller_identity,
            caller_connection_id: update.caller_connection_id,
            reducer: update.reducer,
            status,
            args,
            raw_args: update.args,
        };

        // A failed or out-of-energy call carries no diffs; nothing touches
        // the cache for it.
        if let Some(tables) = &tables {
            self.cache.apply_database_update(tables, Some(&event));
        }
        self.reducers.dispatch(&event);
        Ok(())
    }

    /// Decodes reducer arguments against the registry's argument schema.
    ///
    /// An unregistered reducer or undecodable argument buffer yields `None`
    /// (the raw bytes stay on the event) and only affects this event.
    fn decode_reducer_args(&self, reducer: &str, raw: &[u8]) -> Option<ProductValue> {
        let Some(args_type) = self.registry.reducer_args(reducer) else {
            warn!(reducer = %reducer, "event from unregistered reducer");
            return None;
        };
        match decode_product(args_type, raw) {
            Ok(args) => Some(args),
            Err(err) => {
                warn!(reducer = %reducer, %err, "dropping undecodable reducer arguments");
                None
            }
        }
    }

    /// Tells the connection the transport is gone. Fires the terminal
    /// disconnect event (with `error` as its detail) unless it already
    /// fired. No reconnection is attempted.
    pub fn handle_transport_closed(&mut self, error: Option<TransportError>) {
        if !self.active {
            return;
        }
        self.active = false;
        debug!("transport closed");
        if let Some(callback) = self.on_disconnect.take() {
            let error = error.map(ClientError::Transport);
            callback(error.as_ref());
        }
    }

    // ── Outbound ──

    /// Replaces the active query set.
    ///
    /// The server answers with an `InitialSubscription` carrying the new
    /// matching row set; rows leaving the set arrive as deletes within it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotActive`] after disconnect, or a transport
    /// error if the frame was not accepted.
    pub fn subscribe<Q: Into<String>>(
        &mut self,
        queries: impl IntoIterator<Item = Q>,
    ) -> Result<SubscriptionHandle, ClientError> {
        self.subscribe_inner(queries.into_iter().map(Into::into).collect(), None)
    }

    /// Like [`DbConnection::subscribe`], with a one-shot callback fired
    /// after the snapshot's row callbacks.
    pub fn subscribe_with<Q: Into<String>>(
        &mut self,
        queries: impl IntoIterator<Item = Q>,
        on_applied: impl FnOnce() + Send + 'static,
    ) -> Result<SubscriptionHandle, ClientError> {
        self.subscribe_inner(
            queries.into_iter().map(Into::into).collect(),
            Some(Box::new(on_applied)),
        )
    }

    fn subscribe_inner(
        &mut self,
        queries: Vec<String>,
        on_applied: Option<OnAppliedFn>,
    ) -> Result<SubscriptionHandle, ClientError> {
        if !self.active {
            return Err(ClientError::NotActive);
        }
        let request_id = self.next_request_id();
        let frame = ClientMessage::Subscribe(Subscribe {
            queries: queries.clone(),
            request_id,
        })
        .encode();
        self.transport.send(frame)?;
        Ok(self.subscriptions.begin(request_id, queries, on_applied))
    }

    /// Invokes a reducer with an argument product.
    ///
    /// Fire-and-forget: the call's outcome arrives later as a
    /// `TransactionUpdate` through [`DbConnection::handle_frame`], exactly
    /// as other clients observe it. The returned request id is correlation
    /// sugar only.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotActive`] after disconnect, or a transport
    /// error if the frame was not accepted.
    pub fn call_reducer(&mut self, reducer: &str, args: &ProductValue) -> Result<u32, ClientError> {
        let mut w = Writer::new();
        for element in &args.elements {
            element.encode(&mut w);
        }
        self.call_reducer_raw(reducer, w.finish())
    }

    /// Invokes a reducer with pre-encoded argument bytes.
    ///
    /// # Errors
    ///
    /// Same as [`DbConnection::call_reducer`].
    pub fn call_reducer_raw(&mut self, reducer: &str, args: Bytes) -> Result<u32, ClientError> {
        if !self.active {
            return Err(ClientError::NotActive);
        }
        let request_id = self.next_request_id();
        debug!(reducer = %reducer, request_id, "calling reducer");
        let frame = ClientMessage::CallReducer(CallReducer {
            reducer: reducer.to_owned(),
            args,
            request_id,
        })
        .encode();
        self.transport.send(frame)?;
        Ok(request_id)
    }

    /// Disconnects locally: closes the transport and fires the terminal
    /// disconnect event (once).
    pub fn disconnect(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.transport.close();
        debug!("disconnected");
        if let Some(callback) = self.on_disconnect.take() {
            callback(None);
        }
    }

    fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    // ── Access ──

    /// A typed handle onto the named table's row store.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownTable`] if `R`'s table was not in the
    /// schema registry this connection was built with.
    pub fn table<R: Row>(&self) -> Result<TableHandle<R>, ClientError> {
        let slot = self
            .cache
            .slot(R::TABLE_NAME)
            .ok_or(ClientError::UnknownTable(R::TABLE_NAME))?;
        let typed = slot
            .as_any()
            .downcast_ref::<TypedSlot<R>>()
            .ok_or(ClientError::UnknownTable(R::TABLE_NAME))?;
        Ok(TableHandle {
            core: Arc::clone(&typed.core),
        })
    }

    /// The reducer callback registry. Cloneable, so callbacks may capture
    /// it to register or remove other callbacks.
    #[must_use]
    pub fn reducers(&self) -> ReducerCallbacks {
        self.reducers.clone()
    }

    /// This connection's identity, once the handshake has completed.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.session.as_ref().map(|s| s.identity)
    }

    /// This connection's server-assigned id, once the handshake has
    /// completed.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.session.as_ref().map(|s| s.connection_id)
    }

    /// The handshake token, for the caller to persist.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }

    /// Returns `false` once the terminal disconnect event has fired.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current subscription lifecycle state.
    #[must_use]
    pub fn subscription_state(&self) -> SubscriptionState {
        self.subscriptions.state()
    }
}

/// Decodes a bare product value (no envelope) against `ty`.
fn decode_product(ty: &ProductType, raw: &[u8]) -> Result<ProductValue, eddy_codec::DecodeError> {
    let mut r = Reader::new(raw);
    let mut elements = Vec::with_capacity(ty.len());
    for element in &ty.elements {
        elements.push(AlgebraicValue::decode(&element.ty, &mut r)?);
    }
    r.expect_exhausted()?;
    Ok(ProductValue::new(elements))
}

// ===========================================================================
// Tests
// ===========================================================================
