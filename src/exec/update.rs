use crate::DbInner;
use crate::catalog::schema::TableSchema;
use crate::catalog::types::{Row, Value};
use crate::error::MemrelError;
use crate::exec::atomic_log::atomic_scope;
use crate::exec::index_apply::{apply_index_deletes, apply_index_inserts};
use crate::exec::locking::{acquire_write, lock_related};
use crate::exec::query::run_sequence_ids;
use crate::exec::relations::{find_referring_entities, find_relations};
use crate::exec::{constraints, fk, tables};
use crate::query::plan::SequencePlan;
use crate::storage::EntityId;
use crate::txn::ExecutionContext;
use tracing::debug;

/// Mutation applied per entity by the update path. `changes()` names the
/// members the mutation may touch; it decides which indexes are re-keyed
/// and which relations are re-validated. Errors raised from `update` abort
/// the command and roll the scope back.
pub trait RowUpdater: Send + Sync {
    fn changes(&self) -> &[String];

    fn update(&self, schema: &TableSchema, row: &mut Row) -> Result<(), MemrelError>;
}

/// Column assignment expressions, evaluated against the row's current state.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateExpr {
    Value(Value),
    CopyColumn(String),
    AddInteger(i64),
    Coalesce(Value),
}

/// Assignment-list updater: each listed column gets its expression's value.
#[derive(Debug, Clone)]
pub struct SetUpdater {
    sets: Vec<(String, UpdateExpr)>,
    changed: Vec<String>,
}

impl SetUpdater {
    pub fn new(sets: Vec<(String, UpdateExpr)>) -> Self {
        let changed = sets.iter().map(|(column, _)| column.clone()).collect();
        Self { sets, changed }
    }

    pub fn set(column: impl Into<String>, expr: UpdateExpr) -> Self {
        Self::new(vec![(column.into(), expr)])
    }

    pub fn and_set(mut self, column: impl Into<String>, expr: UpdateExpr) -> Self {
        let column = column.into();
        if !self.changed.contains(&column) {
            self.changed.push(column.clone());
        }
        self.sets.push((column, expr));
        self
    }
}

impl RowUpdater for SetUpdater {
    fn changes(&self) -> &[String] {
        &self.changed
    }

    fn update(&self, schema: &TableSchema, row: &mut Row) -> Result<(), MemrelError> {
        for (column, expr) in &self.sets {
            let pos = schema
                .column_position(column)
                .ok_or_else(|| MemrelError::UnknownColumn {
                    table: schema.table_name.clone(),
                    column: column.clone(),
                })?;
            let next = match expr {
                UpdateExpr::Value(value) => value.clone(),
                UpdateExpr::CopyColumn(source) => {
                    let source_pos = schema.column_position(source).ok_or_else(|| {
                        MemrelError::UnknownColumn {
                            table: schema.table_name.clone(),
                            column: source.clone(),
                        }
                    })?;
                    row.values[source_pos].clone()
                }
                UpdateExpr::AddInteger(delta) => match &row.values[pos] {
                    Value::Integer(current) => Value::Integer(current.saturating_add(*delta)),
                    other => other.clone(),
                },
                UpdateExpr::Coalesce(fallback) => {
                    if row.values[pos].is_null() {
                        fallback.clone()
                    } else {
                        row.values[pos].clone()
                    }
                }
            };
            row.values[pos] = next;
        }
        Ok(())
    }
}

/// Update the entities a plan selects: de-index under the old keys, mutate
/// in place behind a snapshot, re-validate constraints, re-index under the
/// new keys, then re-validate relations in both directions. Returns cloned
/// snapshots of the rows after update.
pub(crate) fn execute_update(
    inner: &DbInner,
    plan: &dyn SequencePlan,
    updater: &dyn RowUpdater,
    ctx: &ExecutionContext<'_>,
) -> Result<Vec<Row>, MemrelError> {
    let catalog = inner.catalog.read();
    let declared = plan.tables();
    let sources = tables::affected_tables(&catalog, &declared)?;
    let base = sources[0].clone();
    let schema = catalog.table(&base)?;

    // Only indexes whose key members intersect the change set get re-keyed;
    // relations are gathered from both sides because an update can break
    // foreign keys in either direction.
    let index_defs = catalog.table_indexes(&base);
    let affected: Vec<usize> = index_defs
        .iter()
        .enumerate()
        .filter(|(_, def)| def.overlaps(updater.changes()))
        .map(|(pos, _)| pos)
        .collect();
    let affected_pairs: Vec<_> = affected
        .iter()
        .map(|&pos| (base.as_str(), &index_defs[pos]))
        .collect();
    let group = find_relations(&catalog, &affected_pairs, true, true);

    acquire_write(inner, ctx, &base)?;
    let join_tables: Vec<String> = sources.iter().skip(1).cloned().collect();
    let victims = run_sequence_ids(inner, &catalog, plan, ctx, &join_tables)?;
    lock_related(inner, ctx, &group, &[base.as_str()])?;

    let mut state = inner.state.write();
    // Pre-image referrer membership: the referrers' own keys do not change
    // here, but the victims' primary keys might.
    let buckets = find_referring_entities(&catalog, &state, &base, &victims, &group.referring)?;

    let updated = atomic_scope(&mut state, |state, log| {
        let live: Vec<(EntityId, Row)> = {
            let table = state.table(&base)?;
            victims
                .iter()
                .filter_map(|id| table.row(*id).map(|row| (*id, row.clone())))
                .collect()
        };

        {
            let table = state.table_mut(&base)?;
            for (entity, old_row) in &live {
                apply_index_deletes(&base, schema, table, &affected, *entity, old_row, log)?;
            }
        }

        {
            let table = state.table_mut(&base)?;
            let cloner = table.cloner.clone();
            for (entity, _) in &live {
                let row = table.row_mut(*entity).ok_or_else(|| {
                    MemrelError::Validation(format!(
                        "entity vanished mid-update in table '{base}'"
                    ))
                })?;
                let mut backup = Row::from_values(Vec::new());
                cloner.copy(row, &mut backup);
                // The snapshot is logged before the updater touches the live
                // row: the updater mutates in place and may fail part-way.
                log.write_entity_update(&base, *entity, backup);
                updater.update(schema, row)?;
                constraints::apply_update(schema, row)?;
            }
        }

        {
            let table = state.table_mut(&base)?;
            for (entity, _) in &live {
                let new_row = table.row(*entity).cloned().ok_or_else(|| {
                    MemrelError::Validation(format!(
                        "entity vanished mid-update in table '{base}'"
                    ))
                })?;
                apply_index_inserts(&base, schema, table, &affected, *entity, &new_row, log)?;
            }
        }

        let new_rows: Vec<Row> = {
            let table = state.table(&base)?;
            live.iter()
                .filter_map(|(entity, _)| table.row(*entity).cloned())
                .collect()
        };
        let row_refs: Vec<&Row> = new_rows.iter().collect();
        fk::validate_flat(&catalog, state, &group.referred, &row_refs)?;
        fk::validate_buckets(&catalog, state, &group.referring, &buckets)?;
        debug!(table = %base, updated = new_rows.len(), "update completed");
        Ok(new_rows)
    })?;
    Ok(updated)
}
