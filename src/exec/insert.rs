use crate::DbInner;
use crate::catalog::types::Row;
use crate::error::MemrelError;
use crate::exec::atomic_log::atomic_scope;
use crate::exec::index_apply::apply_index_inserts;
use crate::exec::locking::{acquire_write, lock_related};
use crate::exec::relations::{find_relations, table_index_pairs};
use crate::exec::{constraints, fk};
use crate::txn::ExecutionContext;
use crate::txn::locks::LockMode;
use tracing::debug;

/// Insert one entity: constraint-apply, lock, FK-validate, index-insert
/// under a log scope. Returns the row as stored, with generated and default
/// members filled in. The base write lock is released at the end of the
/// command on success; related locks stay with the transaction.
pub(crate) fn execute_insert(
    inner: &DbInner,
    table_name: &str,
    mut row: Row,
    ctx: &ExecutionContext<'_>,
) -> Result<Row, MemrelError> {
    let catalog = inner.catalog.read();
    let schema = catalog.table(table_name)?;

    {
        let state = inner.state.read();
        let table = state.table(table_name)?;
        constraints::apply_insert(schema, table, &mut row)?;
    }

    let pairs = table_index_pairs(&catalog, table_name);
    let group = find_relations(&catalog, &pairs, false, true);

    acquire_write(inner, ctx, table_name)?;
    lock_related(inner, ctx, &group, &[table_name])?;

    let mut state = inner.state.write();
    fk::validate_flat(&catalog, &state, &group.referred, &[&row])?;

    let stored = atomic_scope(&mut state, |state, log| {
        let table = state.table_mut(table_name)?;
        let entity = table.allocate_entity();
        table.rows.insert(entity, row.clone());
        log.write_row_insert(table_name, entity);
        let positions: Vec<usize> = (0..table.indexes.len()).collect();
        apply_index_inserts(table_name, schema, table, &positions, entity, &row, log)?;
        debug!(table = table_name, entity = entity.0, "entity inserted");
        Ok(row.clone())
    })?;
    drop(state);

    // The command is complete and FK-consistent; only the related locks
    // outlive it, the base write lock does not.
    inner
        .locks
        .release(ctx.txn_id(), table_name, LockMode::Write);
    Ok(stored)
}
