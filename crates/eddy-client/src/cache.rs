//! The client cache: per-table row stores with callback dispatch.
//!
//! Each table keeps its rows keyed by content identity — the row's encoded
//! bytes — so two inserts with identical encodings are the same logical row.
//! One [`TableUpdate`] is applied in two passes, deletes before inserts, to
//! support the primary-key replace idiom. Tables with a declared primary key
//! additionally coalesce a delete/insert pair sharing a key value into a
//! single update and maintain a point-lookup index over the key column.
//!
//! Callback discipline: every mutation of a batch commits to the store
//! before any callback for that batch fires, and the callback lists are
//! snapshotted before dispatch, so a callback observing the cache sees the
//! post-batch state and registration changes made mid-dispatch never affect
//! the in-flight batch.

use std::any::Any;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use bytes::Bytes;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use tracing::{trace, warn};

use eddy_codec::Reader;

use crate::callbacks::CallbackSet;
use crate::event::ReducerEvent;
use crate::messages::TableUpdate;
use crate::table::{PrimaryKeyRow, Row};

/// Shape of an insert/delete callback.
pub(crate) type RowCallbackFn<R> = dyn Fn(&R, Option<&ReducerEvent>) + Send + Sync;
/// Shape of an update callback.
pub(crate) type UpdateCallbackFn<R> = dyn Fn(&R, &R, Option<&ReducerEvent>) + Send + Sync;

// ---------------------------------------------------------------------------
// RowChange
// ---------------------------------------------------------------------------

/// One committed mutation, queued for callback dispatch after its batch.
pub(crate) enum RowChange<R> {
    /// The row entered the subscribed set.
    Insert(R),
    /// The row left the subscribed set.
    Delete(R),
    /// A delete/insert pair sharing a primary-key value was coalesced.
    Update { old: R, new: R },
}

// ---------------------------------------------------------------------------
// TableCore
// ---------------------------------------------------------------------------

/// Row store, callback registries, and optional primary-key behavior for
/// one table.
pub(crate) struct TableCore<R: Row> {
    rows: RwLock<FxHashMap<Bytes, R>>,
    pub(crate) on_insert: CallbackSet<RowCallbackFn<R>>,
    pub(crate) on_delete: CallbackSet<RowCallbackFn<R>>,
    pub(crate) on_update: CallbackSet<UpdateCallbackFn<R>>,
    hooks: Option<Box<dyn PrimaryKeyHooks<R>>>,
}

impl<R: Row> TableCore<R> {
    pub(crate) fn new(hooks: Option<Box<dyn PrimaryKeyHooks<R>>>) -> Self {
        Self {
            rows: RwLock::new(FxHashMap::default()),
            on_insert: CallbackSet::new(),
            on_delete: CallbackSet::new(),
            on_update: CallbackSet::new(),
            hooks,
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.rows.read().len()
    }

    pub(crate) fn snapshot_rows(&self) -> Vec<R> {
        self.rows.read().values().cloned().collect()
    }

    pub(crate) fn find(&self, mut pred: impl FnMut(&R) -> bool) -> Option<R> {
        self.rows.read().values().find(|row| pred(row)).cloned()
    }

    pub(crate) fn contains_key_bytes(&self, key: &[u8]) -> bool {
        self.rows.read().contains_key(key)
    }

    pub(crate) fn row_for_key_bytes(&self, key: &[u8]) -> Option<R> {
        self.rows.read().get(key).cloned()
    }

    pub(crate) fn lookup_key(&self, key: &dyn Any) -> Option<Bytes> {
        self.hooks.as_ref()?.lookup_key(key)
    }

    /// Decodes one operation list, dropping (with a warning) any row whose
    /// bytes fail to decode. A row buffer is fatal only for itself: the
    /// envelope already framed the remaining operations.
    fn decode_rows(encoded: &[Bytes], table_name: &str) -> Vec<(Bytes, R)> {
        let mut rows = Vec::with_capacity(encoded.len());
        for bytes in encoded {
            let mut r = Reader::new(bytes);
            match R::read_bsatn(&mut r).and_then(|row| r.expect_exhausted().map(|()| row)) {
                Ok(row) => rows.push((bytes.clone(), row)),
                Err(err) => {
                    warn!(table = %table_name, %err, "dropping undecodable row operation");
                }
            }
        }
        rows
    }

    /// Applies one table's operations and returns the committed changes in
    /// dispatch order. Callbacks are NOT fired here; the caller dispatches
    /// after every table in the batch has committed.
    pub(crate) fn apply(&self, update: &TableUpdate) -> Vec<RowChange<R>> {
        let deletes = Self::decode_rows(&update.deletes, &update.table_name);
        let inserts = Self::decode_rows(&update.inserts, &update.table_name);
        let mut changes = Vec::with_capacity(deletes.len() + inserts.len());

        if let Some(hooks) = &self.hooks {
            hooks.apply_keyed(&self.rows, deletes, inserts, &mut changes);
        } else {
            let mut rows = self.rows.write();
            for (key, _) in deletes {
                // Deleting an absent row is a silent no-op.
                if let Some(old) = rows.remove(&key) {
                    changes.push(RowChange::Delete(old));
                } else {
                    trace!(table = R::TABLE_NAME, "delete for non-resident row");
                }
            }
            for (key, row) in inserts {
                // Re-inserting an identical row is idempotent: no callback.
                match rows.entry(key) {
                    Entry::Occupied(_) => {
                        trace!(table = R::TABLE_NAME, "duplicate insert for resident row");
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(row.clone());
                        changes.push(RowChange::Insert(row));
                    }
                }
            }
        }

        changes
    }
}

// ---------------------------------------------------------------------------
// Primary-key hooks
// ---------------------------------------------------------------------------

/// Key-aware application strategy for tables with a declared primary key.
///
/// Object-safe so [`TableCore`] can hold it without naming the key type.
pub(crate) trait PrimaryKeyHooks<R: Row>: Send + Sync {
    /// Applies a batch with delete/insert coalescing and index maintenance.
    fn apply_keyed(
        &self,
        rows: &RwLock<FxHashMap<Bytes, R>>,
        deletes: Vec<(Bytes, R)>,
        inserts: Vec<(Bytes, R)>,
        changes: &mut Vec<RowChange<R>>,
    );

    /// Resolves a key value (downcast from `&R::Key`) to the row's identity
    /// bytes through the index.
    fn lookup_key(&self, key: &dyn Any) -> Option<Bytes>;
}

/// The secondary index over a table's primary-key column.
pub(crate) struct KeyIndex<R: PrimaryKeyRow> {
    index: RwLock<FxHashMap<R::Key, Bytes>>,
}

impl<R: PrimaryKeyRow> Default for KeyIndex<R> {
    fn default() -> Self {
        Self {
            index: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<R: PrimaryKeyRow> PrimaryKeyHooks<R> for KeyIndex<R> {
    fn apply_keyed(
        &self,
        rows: &RwLock<FxHashMap<Bytes, R>>,
        deletes: Vec<(Bytes, R)>,
        inserts: Vec<(Bytes, R)>,
        changes: &mut Vec<RowChange<R>>,
    ) {
        // Merge the batch by key value: a delete and an insert sharing a
        // key become one update.
        type Pair<R> = (Option<(Bytes, R)>, Option<(Bytes, R)>);
        let mut merged: FxHashMap<R::Key, Pair<R>> = FxHashMap::default();

        for (key_bytes, row) in deletes {
            let slot = merged.entry(row.primary_key()).or_default();
            if slot.0.is_some() {
                warn!(
                    table = R::TABLE_NAME,
                    key = ?row.primary_key(),
                    "duplicate delete for one key in a single batch",
                );
            } else {
                slot.0 = Some((key_bytes, row));
            }
        }
        for (key_bytes, row) in inserts {
            let slot = merged.entry(row.primary_key()).or_default();
            if slot.1.is_some() {
                warn!(
                    table = R::TABLE_NAME,
                    key = ?row.primary_key(),
                    "duplicate insert for one key in a single batch",
                );
            } else {
                slot.1 = Some((key_bytes, row));
            }
        }

        let mut plain_deletes = Vec::new();
        let mut updates = Vec::new();
        let mut plain_inserts = Vec::new();
        for (key_value, pair) in merged {
            match pair {
                (Some(delete), Some(insert)) => updates.push((key_value, delete, insert)),
                (Some(delete), None) => plain_deletes.push((key_value, delete)),
                (None, Some(insert)) => plain_inserts.push((key_value, insert)),
                (None, None) => unreachable!("merge entries are created with one side"),
            }
        }

        let mut rows = rows.write();
        let mut index = self.index.write();

        for (key_value, (old_bytes, _)) in plain_deletes {
            if let Some(old) = rows.remove(&old_bytes) {
                index.remove(&key_value);
                changes.push(RowChange::Delete(old));
            } else {
                trace!(table = R::TABLE_NAME, "delete for non-resident row");
            }
        }

        for (key_value, (old_bytes, old_row), (new_bytes, new_row)) in updates {
            // Prefer the stored row as the update's "old" side; fall back to
            // the wire copy when the delete targeted a non-resident row.
            let old = match rows.remove(&old_bytes) {
                Some(stored) => stored,
                None => {
                    warn!(table = R::TABLE_NAME, "update pairing for non-resident row");
                    old_row
                }
            };
            rows.insert(new_bytes.clone(), new_row.clone());
            index.insert(key_value, new_bytes);
            changes.push(RowChange::Update { old, new: new_row });
        }

        for (key_value, (new_bytes, new_row)) in plain_inserts {
            match rows.entry(new_bytes.clone()) {
                Entry::Occupied(_) => {
                    trace!(table = R::TABLE_NAME, "duplicate insert for resident row");
                }
                Entry::Vacant(entry) => {
                    entry.insert(new_row.clone());
                    index.insert(key_value, new_bytes);
                    changes.push(RowChange::Insert(new_row));
                }
            }
        }
    }

    fn lookup_key(&self, key: &dyn Any) -> Option<Bytes> {
        let key = key.downcast_ref::<R::Key>()?;
        self.index.read().get(key).cloned()
    }
}

// ---------------------------------------------------------------------------
// Slots and dispatch
// ---------------------------------------------------------------------------

/// Callbacks queued for one table of a batch, fired after the whole batch
/// has committed.
pub(crate) struct PendingDispatch(Box<dyn FnOnce(Option<&ReducerEvent>)>);

impl PendingDispatch {
    pub(crate) fn fire(self, event: Option<&ReducerEvent>) {
        (self.0)(event);
    }
}

/// Type-erased entry point for one table, keyed by name in [`ClientCache`].
pub(crate) trait TableSlot: Send + Sync {
    /// Decodes and commits one table's operations, returning the deferred
    /// callback dispatch.
    fn apply_update(&self, update: &TableUpdate) -> PendingDispatch;

    /// Downcast support for recovering the typed core behind a handle.
    fn as_any(&self) -> &dyn Any;
}

/// The typed slot implementation bridging wire updates to a [`TableCore`].
pub(crate) struct TypedSlot<R: Row> {
    pub(crate) core: Arc<TableCore<R>>,
}

impl<R: Row> TableSlot for TypedSlot<R> {
    fn apply_update(&self, update: &TableUpdate) -> PendingDispatch {
        let changes = self.core.apply(update);

        // Snapshot the registries now, after this table's mutations but
        // before any callback of the batch runs.
        let on_insert = self.core.on_insert.snapshot();
        let on_delete = self.core.on_delete.snapshot();
        let on_update = self.core.on_update.snapshot();

        PendingDispatch(Box::new(move |event| {
            for change in &changes {
                match change {
                    RowChange::Delete(row) => {
                        for callback in &on_delete {
                            callback(row, event);
                        }
                    }
                    RowChange::Update { old, new } => {
                        for callback in &on_update {
                            callback(old, new, event);
                        }
                    }
                    RowChange::Insert(row) => {
                        for callback in &on_insert {
                            callback(row, event);
                        }
                    }
                }
            }
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// ClientCache
// ---------------------------------------------------------------------------

/// The local mirror of every subscribed table, keyed by table name.
///
/// Owned exclusively by the connection; mutated only while handling one
/// inbound message. Application code reads through typed handles.
pub(crate) struct ClientCache {
    slots: FxHashMap<&'static str, Arc<dyn TableSlot>>,
}

impl ClientCache {
    pub(crate) fn new(slots: FxHashMap<&'static str, Arc<dyn TableSlot>>) -> Self {
        Self { slots }
    }

    pub(crate) fn slot(&self, table_name: &str) -> Option<&Arc<dyn TableSlot>> {
        self.slots.get(table_name)
    }

    /// Applies every table's operations, then fires every queued callback.
    ///
    /// An update naming an unknown table is logged and dropped without
    /// affecting the rest of the batch.
    pub(crate) fn apply_database_update(
        &self,
        tables: &[TableUpdate],
        event: Option<&ReducerEvent>,
    ) {
        let mut pending = Vec::with_capacity(tables.len());
        for update in tables {
            match self.slots.get(update.table_name.as_str()) {
                Some(slot) => pending.push(slot.apply_update(update)),
                None => {
                    warn!(table = %update.table_name, "dropping update for unknown table");
                }
            }
        }
        for dispatch in pending {
            dispatch.fire(event);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
