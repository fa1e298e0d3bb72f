use crate::catalog::types::Row;
use crate::error::MemrelError;
use crate::storage::EntityId;
use crate::storage::encoded_key::EncodedKey;
use crate::storage::table::StoreState;
use tracing::{debug, warn};

/// One inverse action. Replaying a scope's records in LIFO order restores
/// the pre-scope state, provided no other transaction touched the same
/// tables — guaranteed because scopes open only under write locks on every
/// table they mutate.
#[derive(Debug)]
pub(crate) enum UndoRecord {
    /// A row was added to the table's row map; undo removes it.
    RowInsert { table: String, entity: EntityId },
    /// A row was removed from the table's row map; undo restores it.
    RowRemove {
        table: String,
        entity: EntityId,
        row: Row,
    },
    /// An index gained a pointer; undo deletes it.
    IndexInsert {
        table: String,
        index: usize,
        key: EncodedKey,
        entity: EntityId,
    },
    /// An index lost a pointer; undo re-inserts it.
    IndexDelete {
        table: String,
        index: usize,
        key: EncodedKey,
        entity: EntityId,
    },
    /// A live row was mutated in place; undo copies the snapshot back via
    /// the table's cloner.
    EntityUpdate {
        table: String,
        entity: EntityId,
        snapshot: Row,
    },
}

/// Per-command undo buffer. Records are appended after each successful
/// mutation; `complete()` discards them. Closing the scope without
/// completion replays the inverses newest-first, best-effort: a failure to
/// undo is logged and skipped so the original error is the one that
/// propagates.
#[derive(Debug, Default)]
pub(crate) struct AtomicLog {
    records: Vec<UndoRecord>,
    completed: bool,
}

impl AtomicLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn write_row_insert(&mut self, table: &str, entity: EntityId) {
        self.records.push(UndoRecord::RowInsert {
            table: table.to_string(),
            entity,
        });
    }

    pub(crate) fn write_row_remove(&mut self, table: &str, entity: EntityId, row: Row) {
        self.records.push(UndoRecord::RowRemove {
            table: table.to_string(),
            entity,
            row,
        });
    }

    pub(crate) fn write_index_insert(
        &mut self,
        table: &str,
        index: usize,
        key: EncodedKey,
        entity: EntityId,
    ) {
        self.records.push(UndoRecord::IndexInsert {
            table: table.to_string(),
            index,
            key,
            entity,
        });
    }

    pub(crate) fn write_index_delete(
        &mut self,
        table: &str,
        index: usize,
        key: EncodedKey,
        entity: EntityId,
    ) {
        self.records.push(UndoRecord::IndexDelete {
            table: table.to_string(),
            index,
            key,
            entity,
        });
    }

    pub(crate) fn write_entity_update(&mut self, table: &str, entity: EntityId, snapshot: Row) {
        self.records.push(UndoRecord::EntityUpdate {
            table: table.to_string(),
            entity,
            snapshot,
        });
    }

    pub(crate) fn complete(&mut self) {
        self.completed = true;
        self.records.clear();
    }

    pub(crate) fn rollback(&mut self, state: &mut StoreState) {
        let count = self.records.len();
        while let Some(record) = self.records.pop() {
            apply_undo(state, record);
        }
        self.completed = true;
        debug!(undone = count, "atomic log scope rolled back");
    }
}

impl Drop for AtomicLog {
    fn drop(&mut self) {
        // Scopes must end through complete() or rollback(); a silent drop
        // with pending records would leave a partial mutation in place.
        debug_assert!(
            self.completed || self.records.is_empty(),
            "atomic log scope dropped with pending undo records"
        );
    }
}

fn apply_undo(state: &mut StoreState, record: UndoRecord) {
    match record {
        UndoRecord::RowInsert { table, entity } => {
            let Some(data) = state.tables.get_mut(&table) else {
                warn!(%table, "rollback skipped: table missing");
                return;
            };
            data.rows.remove(&entity);
        }
        UndoRecord::RowRemove { table, entity, row } => {
            let Some(data) = state.tables.get_mut(&table) else {
                warn!(%table, "rollback skipped: table missing");
                return;
            };
            data.rows.insert(entity, row);
        }
        UndoRecord::IndexInsert {
            table,
            index,
            key,
            entity,
        } => {
            let Some(data) = state.tables.get_mut(&table) else {
                warn!(%table, "rollback skipped: table missing");
                return;
            };
            if let Some(idx) = data.indexes.get_mut(index) {
                idx.remove(&key, entity);
            }
        }
        UndoRecord::IndexDelete {
            table,
            index,
            key,
            entity,
        } => {
            let Some(data) = state.tables.get_mut(&table) else {
                warn!(%table, "rollback skipped: table missing");
                return;
            };
            if let Some(idx) = data.indexes.get_mut(index)
                && idx.insert(key, entity).is_err()
            {
                warn!(
                    %table,
                    index, "rollback re-insert conflicted; keeping original error"
                );
            }
        }
        UndoRecord::EntityUpdate {
            table,
            entity,
            snapshot,
        } => {
            let Some(data) = state.tables.get_mut(&table) else {
                warn!(%table, "rollback skipped: table missing");
                return;
            };
            let cloner = data.cloner.clone();
            match data.row_mut(entity) {
                Some(live) => cloner.copy(&snapshot, live),
                None => warn!(%table, "rollback skipped: row missing"),
            }
        }
    }
}

/// Runs a mutating closure under a fresh log scope: `Ok` completes the
/// scope, `Err` rolls it back and propagates the original error.
pub(crate) fn atomic_scope<T>(
    state: &mut StoreState,
    f: impl FnOnce(&mut StoreState, &mut AtomicLog) -> Result<T, MemrelError>,
) -> Result<T, MemrelError> {
    let mut log = AtomicLog::new();
    match f(state, &mut log) {
        Ok(value) => {
            log.complete();
            Ok(value)
        }
        Err(err) => {
            log.rollback(state);
            Err(err)
        }
    }
}
