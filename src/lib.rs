//! memrel: an in-memory relational store. Tables hold typed records behind
//! one or more indexes; foreign-key relations (optionally cascading) tie
//! tables together; every mutating command runs under table-granular
//! two-phase locking with a per-command undo scope, so a failure at any
//! point leaves the store exactly as the command found it.

pub mod catalog;
pub mod config;
pub mod error;
pub mod exec;
pub mod query;
pub mod storage;
pub mod txn;

pub use crate::catalog::schema::{
    ColumnDef, Constraint, IndexDef, IndexKind, RelationDef, RelationOptions, TableSchema,
};
pub use crate::catalog::types::{ColumnType, Row, Value};
pub use crate::config::MemrelConfig;
pub use crate::error::{MemrelError, MemrelErrorCode, ResourceType};
pub use crate::exec::{RowUpdater, SetUpdater, UpdateExpr};
pub use crate::query::plan::{
    CountPlan, Expr, FilterPlan, Order, PlanView, ScalarPlan, SequencePlan,
};
pub use crate::storage::EntityId;
pub use crate::storage::table::{ColumnCloner, EntityCloner};
pub use crate::txn::{ExecutionContext, Transaction, TxnId};

use crate::catalog::Catalog;
use crate::storage::index::{TableIndex, extract_index_key, extract_index_key_encoded};
use crate::storage::table::{StoreState, TableData};
use crate::txn::locks::LockManager;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct DbInner {
    pub(crate) catalog: RwLock<Catalog>,
    pub(crate) state: RwLock<StoreState>,
    pub(crate) locks: Arc<LockManager>,
    pub(crate) config: MemrelConfig,
    txn_seq: AtomicU64,
}

/// Handle to one in-memory database. Cheap to clone; clones share the same
/// catalog, table state and lock manager.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DbInner>,
}

impl Database {
    pub fn new() -> Self {
        Self::with_config(MemrelConfig::default())
    }

    pub fn with_config(config: MemrelConfig) -> Self {
        let locks = Arc::new(LockManager::new(config.deadlock_detection));
        Self {
            inner: Arc::new(DbInner {
                catalog: RwLock::new(Catalog::default()),
                state: RwLock::new(StoreState::default()),
                locks,
                config,
                txn_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a table. A unique primary index over the primary key
    /// members is created along with it; rows are copied by the default
    /// whole-row cloner.
    pub fn create_table(&self, schema: TableSchema) -> Result<(), MemrelError> {
        self.create_table_with_cloner(schema, Arc::new(ColumnCloner))
    }

    /// Registers a table with a custom entity cloner, for types whose
    /// persisted members are a subset of the row.
    pub fn create_table_with_cloner(
        &self,
        schema: TableSchema,
        cloner: Arc<dyn EntityCloner>,
    ) -> Result<(), MemrelError> {
        let mut catalog = self.inner.catalog.write();
        let mut state = self.inner.state.write();
        let name = schema.table_name.clone();
        catalog.add_table(schema)?;
        let indexes = catalog
            .table_indexes(&name)
            .iter()
            .cloned()
            .map(TableIndex::new)
            .collect();
        state.tables.insert(name, TableData::new(indexes, cloner));
        Ok(())
    }

    /// Registers a secondary index and backfills it from the table's
    /// current rows. A unique index over rows that already collide is
    /// rejected and leaves no trace.
    pub fn create_index(&self, table: &str, def: IndexDef) -> Result<(), MemrelError> {
        let mut catalog = self.inner.catalog.write();
        let mut state = self.inner.state.write();
        let schema = catalog.table(table)?.clone();

        let mut index = TableIndex::new(def.clone());
        let data = state.table_mut(table)?;
        for (entity, row) in &data.rows {
            let key = extract_index_key_encoded(row, &schema, &def.columns)?;
            if index.insert(key, *entity).is_err() {
                let key_values = extract_index_key(row, &schema, &def.columns)?;
                return Err(MemrelError::UniqueViolation {
                    table: table.to_string(),
                    index: def.index_name,
                    key: format!("{key_values:?}"),
                });
            }
        }
        catalog.add_index(table, def)?;
        data.indexes.push(index);
        Ok(())
    }

    /// Registers a foreign-key relation. Existing foreign rows must already
    /// satisfy it; a violation rejects the registration and leaves no trace.
    pub fn create_relation(&self, def: RelationDef) -> Result<(), MemrelError> {
        let mut catalog = self.inner.catalog.write();
        let state = self.inner.state.read();
        catalog.add_relation(def.clone())?;

        let foreign_data = state.table(&def.foreign_table)?;
        let rows: Vec<&Row> = foreign_data.rows.iter().map(|(_, row)| row).collect();
        if let Err(err) = exec::fk::validate_flat(&catalog, &state, &[&def], &rows) {
            catalog.relations.pop();
            return Err(err);
        }
        Ok(())
    }

    /// Opens a transaction. Locks taken by its commands are released in one
    /// sweep at commit or rollback (dropping the handle rolls back).
    pub fn begin(&self) -> Transaction {
        let id = TxnId(self.inner.txn_seq.fetch_add(1, Ordering::SeqCst) + 1);
        Transaction::new(id, Arc::clone(&self.inner.locks))
    }

    /// Read-only sequence query: returns cloned rows of the plan's base
    /// table; mutating them does not touch the store.
    pub fn execute_query(
        &self,
        plan: &dyn SequencePlan,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Row>, MemrelError> {
        exec::query::run_sequence_rows(&self.inner, plan, ctx)
    }

    /// Read-only scalar query.
    pub fn execute_scalar(
        &self,
        plan: &dyn ScalarPlan,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Value, MemrelError> {
        exec::query::run_scalar(&self.inner, plan, ctx)
    }

    /// Inserts one row; returns it as stored, generated and defaulted
    /// members filled in.
    pub fn execute_insert(
        &self,
        table: &str,
        row: Row,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Row, MemrelError> {
        exec::insert::execute_insert(&self.inner, table, row, ctx)
    }

    /// Deletes the rows the plan selects, cascading where relations ask for
    /// it; returns snapshots of the directly targeted rows.
    pub fn execute_delete(
        &self,
        plan: &dyn SequencePlan,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Row>, MemrelError> {
        exec::delete::execute_delete(&self.inner, plan, ctx)
    }

    /// Updates the rows the plan selects through the updater; returns
    /// snapshots of the rows after update.
    pub fn execute_update(
        &self,
        plan: &dyn SequencePlan,
        updater: &dyn RowUpdater,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<Row>, MemrelError> {
        exec::update::execute_update(&self.inner, plan, updater, ctx)
    }

    pub fn table_names(&self) -> Vec<String> {
        let catalog = self.inner.catalog.read();
        let mut names: Vec<String> = catalog.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn row_count(&self, table: &str) -> Result<usize, MemrelError> {
        let state = self.inner.state.read();
        Ok(state.table(table)?.len())
    }

    /// Number of (key, entity) pointers an index currently holds. Intended
    /// for diagnostics and coherence assertions.
    pub fn index_entry_count(&self, table: &str, index_name: &str) -> Result<usize, MemrelError> {
        let state = self.inner.state.read();
        let data = state.table(table)?;
        data.index_by_name(index_name)
            .map(TableIndex::entry_count)
            .ok_or_else(|| MemrelError::NotFound {
                resource_type: ResourceType::Index,
                resource_id: index_name.to_string(),
            })
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
