//! Typed row traits and table access handles.
//!
//! Application code never touches the cache's row stores directly: it reads
//! and registers callbacks through a [`TableHandle`], obtained from the
//! connection by row type. Runtime table-name lookup is confined to the
//! wire-decoding boundary; everything here is statically typed.

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use bytes::Bytes;
use eddy_codec::{DecodeError, Reader, Writer};

use crate::cache::TableCore;
use crate::callbacks::CallbackId;
use crate::event::ReducerEvent;

// ---------------------------------------------------------------------------
// Row traits
// ---------------------------------------------------------------------------

/// A row type bound to one remote table.
///
/// Implementations are ordinarily generated from the module schema; the
/// trait is small enough to hand-write for tests or ad-hoc bindings. The
/// encoding must match the table's declared column order exactly: the row's
/// encoded bytes are its identity key inside the cache, so two encodings of
/// the same logical row must be byte-identical.
pub trait Row: Clone + fmt::Debug + Send + Sync + 'static {
    /// The remote table's name, as it appears in wire updates.
    const TABLE_NAME: &'static str;

    /// Appends this row's BSATN encoding to `w`.
    fn write_bsatn(&self, w: &mut Writer);

    /// Decodes one row, advancing the cursor.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`] is fatal for the row's buffer.
    fn read_bsatn(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Encodes this row into a fresh buffer.
    #[must_use]
    fn encoded(&self) -> Bytes {
        let mut w = Writer::new();
        self.write_bsatn(&mut w);
        w.finish()
    }
}

/// A [`Row`] with a declared primary-key (or unique) column.
///
/// Tables registered with a primary key coalesce a delete and an insert that
/// share a key value within one batch into a single update, and maintain a
/// point-lookup index over the key column.
pub trait PrimaryKeyRow: Row {
    /// The key column's type.
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Extracts the key column's value.
    fn primary_key(&self) -> Self::Key;
}

// ---------------------------------------------------------------------------
// TableHandle
// ---------------------------------------------------------------------------

/// A typed handle onto one table's row store.
///
/// Cheap to clone; clones share the underlying store and callback
/// registries, so a handle captured inside a callback can register or
/// remove other callbacks safely.
pub struct TableHandle<R: Row> {
    pub(crate) core: Arc<TableCore<R>>,
}

impl<R: Row> Clone for TableHandle<R> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<R: Row> fmt::Debug for TableHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("table", &R::TABLE_NAME)
            .field("rows", &self.count())
            .finish()
    }
}

impl<R: Row> TableHandle<R> {
    /// Number of subscribed rows currently resident.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.core.count() as u64
    }

    /// Iterates a point-in-time snapshot of the resident rows.
    ///
    /// Iteration order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = R> {
        self.core.snapshot_rows().into_iter()
    }

    /// The first resident row satisfying `pred`, if any.
    #[must_use]
    pub fn find(&self, pred: impl FnMut(&R) -> bool) -> Option<R> {
        self.core.find(pred)
    }

    /// Returns `true` if a row with `row`'s exact encoding is resident.
    #[must_use]
    pub fn contains(&self, row: &R) -> bool {
        self.core.contains_key_bytes(&row.encoded())
    }

    /// Registers a callback fired after a row enters the subscribed set.
    ///
    /// The event is `None` for rows delivered by an initial subscription
    /// snapshot, `Some` for rows inserted by a committed reducer.
    pub fn on_insert(
        &self,
        callback: impl Fn(&R, Option<&ReducerEvent>) + Send + Sync + 'static,
    ) -> CallbackId {
        self.core.on_insert.insert(Arc::new(callback))
    }

    /// Removes an [`on_insert`](Self::on_insert) callback.
    pub fn remove_on_insert(&self, id: CallbackId) -> bool {
        self.core.on_insert.remove(id)
    }

    /// Registers a callback fired after a row leaves the subscribed set.
    pub fn on_delete(
        &self,
        callback: impl Fn(&R, Option<&ReducerEvent>) + Send + Sync + 'static,
    ) -> CallbackId {
        self.core.on_delete.insert(Arc::new(callback))
    }

    /// Removes an [`on_delete`](Self::on_delete) callback.
    pub fn remove_on_delete(&self, id: CallbackId) -> bool {
        self.core.on_delete.remove(id)
    }

    /// Registers a callback fired when a delete and an insert sharing a
    /// primary-key value are coalesced into one update.
    ///
    /// Fires only for tables registered with a primary key; on other tables
    /// the registration is accepted but never invoked.
    pub fn on_update(
        &self,
        callback: impl Fn(&R, &R, Option<&ReducerEvent>) + Send + Sync + 'static,
    ) -> CallbackId {
        self.core.on_update.insert(Arc::new(callback))
    }

    /// Removes an [`on_update`](Self::on_update) callback.
    pub fn remove_on_update(&self, id: CallbackId) -> bool {
        self.core.on_update.remove(id)
    }
}

impl<R: PrimaryKeyRow> TableHandle<R> {
    /// Point lookup through the primary-key index.
    #[must_use]
    pub fn find_by_key(&self, key: &R::Key) -> Option<R> {
        let key_bytes = self.core.lookup_key(key as &dyn Any)?;
        self.core.row_for_key_bytes(&key_bytes)
    }
}
