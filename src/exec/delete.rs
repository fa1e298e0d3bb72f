use crate::DbInner;
use crate::catalog::Catalog;
use crate::catalog::types::Row;
use crate::error::MemrelError;
use crate::exec::atomic_log::{AtomicLog, atomic_scope};
use crate::exec::index_apply::apply_index_deletes;
use crate::exec::locking::{acquire_write, lock_related};
use crate::exec::query::run_sequence_ids;
use crate::exec::relations::{
    cascaded_tables, find_referring_entities, find_relations, table_index_pairs,
};
use crate::exec::{fk, tables};
use crate::query::plan::SequencePlan;
use crate::storage::EntityId;
use crate::storage::table::StoreState;
use crate::txn::ExecutionContext;
use tracing::debug;

/// Delete the entities a plan selects, cascading through cascade-delete
/// relations inside a single log scope, then validating that no remaining
/// referrer was orphaned. Returns cloned snapshots of the originally
/// targeted victims (cascade casualties are not reported).
pub(crate) fn execute_delete(
    inner: &DbInner,
    plan: &dyn SequencePlan,
    ctx: &ExecutionContext<'_>,
) -> Result<Vec<Row>, MemrelError> {
    let catalog = inner.catalog.read();
    let declared = plan.tables();
    let sources = tables::affected_tables(&catalog, &declared)?;
    let base = sources[0].clone();

    let cascaded = cascaded_tables(&catalog, &base);
    let mut all_tables: Vec<&str> = vec![base.as_str()];
    all_tables.extend(cascaded.iter().map(String::as_str));
    let pairs: Vec<_> = all_tables
        .iter()
        .flat_map(|t| table_index_pairs(&catalog, t))
        .collect();
    let group = find_relations(&catalog, &pairs, true, false);

    // Base write lock first, victims second: the materialising read of the
    // base table goes through the already-held write lock (reentrant), and
    // only the remaining join tables get drain-scoped read locks.
    acquire_write(inner, ctx, &base)?;
    let join_tables: Vec<String> = sources.iter().skip(1).cloned().collect();
    let victims = run_sequence_ids(inner, &catalog, plan, ctx, &join_tables)?;

    for table in &cascaded {
        acquire_write(inner, ctx, table)?;
    }
    lock_related(inner, ctx, &group, &all_tables)?;

    let mut state = inner.state.write();
    let deleted = atomic_scope(&mut state, |state, log| {
        delete_entities(&catalog, state, &base, &victims, log)
    })?;
    debug!(
        table = %base,
        victims = deleted.len(),
        cascaded = cascaded.len(),
        "delete completed"
    );
    Ok(deleted)
}

/// Recursive cascade entry point. Each level removes its victims from every
/// index and the row map, recurses into cascade buckets through the same
/// log scope (one atomic boundary for the whole fan-out), then validates
/// the remaining referrers. Entities already removed by an outer level are
/// skipped, which terminates cyclic cascades.
pub(crate) fn delete_entities(
    catalog: &Catalog,
    state: &mut StoreState,
    table_name: &str,
    victims: &[EntityId],
    log: &mut AtomicLog,
) -> Result<Vec<Row>, MemrelError> {
    let schema = catalog.table(table_name)?;
    let live: Vec<EntityId> = {
        let table = state.table(table_name)?;
        victims
            .iter()
            .copied()
            .filter(|id| table.row(*id).is_some())
            .collect()
    };
    if live.is_empty() {
        return Ok(Vec::new());
    }

    let pairs = table_index_pairs(catalog, table_name);
    let group = find_relations(catalog, &pairs, true, false);
    let mut buckets = find_referring_entities(catalog, state, table_name, &live, &group.referring)?;

    let table = state.table_mut(table_name)?;
    let snapshots: Vec<(EntityId, Row)> = live
        .iter()
        .filter_map(|id| table.row(*id).map(|row| (*id, row.clone())))
        .collect();
    let positions: Vec<usize> = (0..table.indexes.len()).collect();
    for (entity, row) in &snapshots {
        apply_index_deletes(table_name, schema, table, &positions, *entity, row, log)?;
        table.rows.remove(entity);
        log.write_row_remove(table_name, *entity, row.clone());
    }

    for (pos, relation) in group.referring.iter().enumerate() {
        if !relation.options.cascaded_deletion {
            continue;
        }
        let bucket = std::mem::take(&mut buckets[pos]);
        if bucket.is_empty() {
            continue;
        }
        debug!(
            relation = %relation.name,
            table = %relation.foreign_table,
            entities = bucket.len(),
            "cascading delete"
        );
        delete_entities(catalog, state, &relation.foreign_table, &bucket, log)?;
    }

    // Anything left in a bucket belongs to a non-cascading relation and
    // still points at a deleted victim unless its own row went away above.
    fk::validate_buckets(catalog, state, &group.referring, &buckets)?;

    Ok(snapshots.into_iter().map(|(_, row)| row).collect())
}
