//! The schema registry: the explicit, instantiable description of one
//! generated binding set.
//!
//! A registry is constructed once (ordinarily by generated code) and passed
//! into each connection at construction time; nothing here is process-wide.
//! It records which tables exist, whether each has a primary key, and the
//! argument product type of each reducer, and it can instantiate a fresh
//! [`ClientCache`] with one typed slot per table.

use std::sync::Arc;

use eddy_codec::ProductType;
use fxhash::FxHashMap;

use crate::cache::{ClientCache, KeyIndex, TableCore, TableSlot, TypedSlot};
use crate::error::SchemaError;
use crate::table::{PrimaryKeyRow, Row};

type SlotFactory = Box<dyn Fn() -> Arc<dyn TableSlot> + Send + Sync>;

/// One registered table: its name and a factory for per-connection slots.
struct TableDef {
    name: &'static str,
    make_slot: SlotFactory,
}

// ---------------------------------------------------------------------------
// SchemaRegistry
// ---------------------------------------------------------------------------

/// An immutable description of the tables and reducers a binding set knows.
pub struct SchemaRegistry {
    tables: Vec<TableDef>,
    reducers: FxHashMap<&'static str, ProductType>,
}

impl SchemaRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// The argument product type of a registered reducer.
    #[must_use]
    pub fn reducer_args(&self, reducer: &str) -> Option<&ProductType> {
        self.reducers.get(reducer)
    }

    /// Names of all registered tables.
    pub fn table_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.iter().map(|def| def.name)
    }

    /// Instantiates a fresh cache with one empty slot per registered table.
    pub(crate) fn instantiate(&self) -> ClientCache {
        let slots = self
            .tables
            .iter()
            .map(|def| (def.name, (def.make_slot)()))
            .collect();
        ClientCache::new(slots)
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("tables", &self.tables.iter().map(|d| d.name).collect::<Vec<_>>())
            .field("reducers", &self.reducers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SchemaRegistryBuilder
// ---------------------------------------------------------------------------

/// Accumulates table and reducer registrations.
#[derive(Default)]
pub struct SchemaRegistryBuilder {
    tables: Vec<TableDef>,
    reducers: Vec<(&'static str, ProductType)>,
}

impl SchemaRegistryBuilder {
    /// Registers a table without a primary key.
    #[must_use]
    pub fn table<R: Row>(mut self) -> Self {
        self.tables.push(TableDef {
            name: R::TABLE_NAME,
            make_slot: Box::new(|| {
                Arc::new(TypedSlot::<R> {
                    core: Arc::new(TableCore::new(None)),
                })
            }),
        });
        self
    }

    /// Registers a table with a declared primary-key column.
    ///
    /// Such tables coalesce delete/insert pairs sharing a key value into
    /// updates and maintain a point-lookup index.
    #[must_use]
    pub fn table_with_primary_key<R: PrimaryKeyRow>(mut self) -> Self {
        self.tables.push(TableDef {
            name: R::TABLE_NAME,
            make_slot: Box::new(|| {
                Arc::new(TypedSlot::<R> {
                    core: Arc::new(TableCore::new(Some(Box::new(KeyIndex::<R>::default())))),
                })
            }),
        });
        self
    }

    /// Registers a reducer and its argument product type.
    #[must_use]
    pub fn reducer(mut self, name: &'static str, args: ProductType) -> Self {
        self.reducers.push((name, args));
        self
    }

    /// Finalizes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if a table or reducer name was registered
    /// twice.
    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        let mut seen = FxHashMap::default();
        for def in &self.tables {
            if seen.insert(def.name, ()).is_some() {
                return Err(SchemaError::DuplicateTable(def.name));
            }
        }

        let mut reducers = FxHashMap::default();
        for (name, args) in self.reducers {
            if reducers.insert(name, args).is_some() {
                return Err(SchemaError::DuplicateReducer(name));
            }
        }

        Ok(SchemaRegistry {
            tables: self.tables,
            reducers,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use eddy_codec::{AlgebraicType, DecodeError, Reader, Writer};

    #[derive(Debug, Clone)]
    struct Marker;

    impl Row for Marker {
        const TABLE_NAME: &'static str = "marker";

        fn write_bsatn(&self, _w: &mut Writer) {}

        fn read_bsatn(_r: &mut Reader<'_>) -> Result<Self, DecodeError> {
            Ok(Self)
        }
    }

    fn set_name_args() -> ProductType {
        ProductType::new([("name", AlgebraicType::String)])
    }

    #[test]
    fn test_build_and_lookup() {
        let registry = SchemaRegistry::builder()
            .table::<Marker>()
            .reducer("set_name", set_name_args())
            .build()
            .unwrap();

        assert_eq!(registry.table_names().collect::<Vec<_>>(), vec!["marker"]);
        assert_eq!(registry.reducer_args("set_name").unwrap().len(), 1);
        assert!(registry.reducer_args("no_such_reducer").is_none());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let err = SchemaRegistry::builder()
            .table::<Marker>()
            .table::<Marker>()
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateTable("marker"));
    }

    #[test]
    fn test_duplicate_reducer_rejected() {
        let err = SchemaRegistry::builder()
            .reducer("set_name", set_name_args())
            .reducer("set_name", set_name_args())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateReducer("set_name"));
    }

    #[test]
    fn test_instantiate_creates_independent_caches() {
        let registry = SchemaRegistry::builder().table::<Marker>().build().unwrap();
        let a = registry.instantiate();
        let b = registry.instantiate();
        assert!(a.slot("marker").is_some());
        assert!(b.slot("marker").is_some());
        assert!(!Arc::ptr_eq(a.slot("marker").unwrap(), b.slot("marker").unwrap()));
    }
}
