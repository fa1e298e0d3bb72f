use crate::catalog::schema::TableSchema;
use crate::catalog::types::Row;
use crate::error::MemrelError;
use crate::exec::atomic_log::AtomicLog;
use crate::storage::EntityId;
use crate::storage::index::{extract_index_key, extract_index_key_encoded};
use crate::storage::table::TableData;

/// Inserts the entity into each listed index under its current key, logging
/// one inverse record per index. The log record is written after the
/// successful insert so a rollback replay always matches a real state; a
/// unique rejection surfaces as `UniqueViolation` and the scope undoes the
/// earlier inserts.
pub(crate) fn apply_index_inserts(
    table_name: &str,
    schema: &TableSchema,
    table: &mut TableData,
    positions: &[usize],
    entity: EntityId,
    row: &Row,
    log: &mut AtomicLog,
) -> Result<(), MemrelError> {
    for &pos in positions {
        let columns = table.indexes[pos].def.columns.clone();
        let key = extract_index_key_encoded(row, schema, &columns)?;
        if table.indexes[pos].insert(key.clone(), entity).is_err() {
            let key_values = extract_index_key(row, schema, &columns)?;
            return Err(MemrelError::UniqueViolation {
                table: table_name.to_string(),
                index: table.indexes[pos].def.index_name.clone(),
                key: format!("{key_values:?}"),
            });
        }
        log.write_index_insert(table_name, pos, key, entity);
    }
    Ok(())
}

/// Symmetric to `apply_index_inserts`: removes the entity from each listed
/// index under its current key, logging the re-insert inverse after each
/// successful removal.
pub(crate) fn apply_index_deletes(
    table_name: &str,
    schema: &TableSchema,
    table: &mut TableData,
    positions: &[usize],
    entity: EntityId,
    row: &Row,
    log: &mut AtomicLog,
) -> Result<(), MemrelError> {
    for &pos in positions {
        let columns = table.indexes[pos].def.columns.clone();
        let key = extract_index_key_encoded(row, schema, &columns)?;
        table.indexes[pos].remove(&key, entity);
        log.write_index_delete(table_name, pos, key, entity);
    }
    Ok(())
}
