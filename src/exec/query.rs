use crate::DbInner;
use crate::catalog::Catalog;
use crate::catalog::types::{Row, Value};
use crate::error::MemrelError;
use crate::exec::locking;
use crate::exec::tables::affected_tables;
use crate::query::plan::{PlanView, ScalarPlan, SequencePlan};
use crate::storage::EntityId;
use crate::txn::{ExecutionContext, TxnId};
use crate::txn::locks::LockMode;

/// Read locks held for the duration of one plan drain. Dropped (and thereby
/// released) as soon as the materialised result exists, including on every
/// error path; partially acquired sets unwind the same way.
pub(crate) struct ReadLockScope<'a> {
    inner: &'a DbInner,
    txn: TxnId,
    held: Vec<String>,
}

impl<'a> ReadLockScope<'a> {
    pub(crate) fn acquire(
        inner: &'a DbInner,
        ctx: &ExecutionContext<'_>,
        tables: &[String],
    ) -> Result<Self, MemrelError> {
        let mut scope = Self {
            inner,
            txn: ctx.txn_id(),
            held: Vec::new(),
        };
        for table in tables {
            locking::acquire_read(inner, ctx, table)?;
            scope.held.push(table.clone());
        }
        Ok(scope)
    }
}

impl Drop for ReadLockScope<'_> {
    fn drop(&mut self) {
        for table in &self.held {
            self.inner.locks.release(self.txn, table, LockMode::Read);
        }
    }
}

/// Read-only sequence execution: read-lock every source table, drain the
/// plan into a materialised list, clone each entity, release. The caller
/// receives a stable snapshot it may freely mutate.
pub(crate) fn run_sequence_rows(
    inner: &DbInner,
    plan: &dyn SequencePlan,
    ctx: &ExecutionContext<'_>,
) -> Result<Vec<Row>, MemrelError> {
    let catalog = inner.catalog.read();
    let declared = plan.tables();
    let tables = affected_tables(&catalog, &declared)?;
    let _scope = ReadLockScope::acquire(inner, ctx, &tables)?;
    let state = inner.state.read();
    let view = PlanView::new(&catalog, &state);
    let ids = plan.execute(&view)?;
    let base = &declared[0];
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(row) = view.row(base, id) {
            rows.push(row.clone());
        }
    }
    Ok(rows)
}

/// Read-only scalar execution under the same lock scope.
pub(crate) fn run_scalar(
    inner: &DbInner,
    plan: &dyn ScalarPlan,
    ctx: &ExecutionContext<'_>,
) -> Result<Value, MemrelError> {
    let catalog = inner.catalog.read();
    let tables = affected_tables(&catalog, &plan.tables())?;
    let _scope = ReadLockScope::acquire(inner, ctx, &tables)?;
    let state = inner.state.read();
    let view = PlanView::new(&catalog, &state);
    plan.execute(&view)
}

/// Internal variant for mutation paths. The caller already write-locks the
/// base table and passes only the remaining join tables here, so the drain
/// reads the base through its own write lock (reentrant) and the result is
/// live entity handles, not clones: the path mutates the same rows next.
pub(crate) fn run_sequence_ids(
    inner: &DbInner,
    catalog: &Catalog,
    plan: &dyn SequencePlan,
    ctx: &ExecutionContext<'_>,
    tables_to_lock: &[String],
) -> Result<Vec<EntityId>, MemrelError> {
    affected_tables(catalog, &plan.tables())?;
    let _scope = ReadLockScope::acquire(inner, ctx, tables_to_lock)?;
    let state = inner.state.read();
    let view = PlanView::new(catalog, &state);
    plan.execute(&view)
}
