use crate::DbInner;
use crate::error::MemrelError;
use crate::exec::relations::RelationGroup;
use crate::txn::ExecutionContext;
use crate::txn::locks::LockMode;

/// Lock-planner helpers. Every acquisition passes the context's transaction
/// and cancellation flag; acquisition failures leave already-held locks in
/// place for the surrounding transaction to release at commit/abort.
pub(crate) fn acquire_read(
    inner: &DbInner,
    ctx: &ExecutionContext<'_>,
    table: &str,
) -> Result<(), MemrelError> {
    acquire(inner, ctx, table, LockMode::Read)
}

pub(crate) fn acquire_write(
    inner: &DbInner,
    ctx: &ExecutionContext<'_>,
    table: &str,
) -> Result<(), MemrelError> {
    acquire(inner, ctx, table, LockMode::Write)
}

pub(crate) fn acquire_related(
    inner: &DbInner,
    ctx: &ExecutionContext<'_>,
    table: &str,
) -> Result<(), MemrelError> {
    acquire(inner, ctx, table, LockMode::Related)
}

fn acquire(
    inner: &DbInner,
    ctx: &ExecutionContext<'_>,
    table: &str,
    mode: LockMode,
) -> Result<(), MemrelError> {
    inner.locks.acquire(
        ctx.txn_id(),
        table,
        mode,
        inner.config.lock_timeout(),
        ctx.cancel_flag(),
    )
}

/// Related-locks every table structurally involved through the group's
/// relations: the foreign table of each referring relation and the primary
/// table of each referred one, minus `except`, deduplicated in discovery
/// order.
pub(crate) fn lock_related(
    inner: &DbInner,
    ctx: &ExecutionContext<'_>,
    group: &RelationGroup<'_>,
    except: &[&str],
) -> Result<(), MemrelError> {
    let mut tables: Vec<&str> = Vec::new();
    for relation in &group.referring {
        let table = relation.foreign_table.as_str();
        if !except.contains(&table) && !tables.contains(&table) {
            tables.push(table);
        }
    }
    for relation in &group.referred {
        let table = relation.primary_table.as_str();
        if !except.contains(&table) && !tables.contains(&table) {
            tables.push(table);
        }
    }
    for table in tables {
        acquire_related(inner, ctx, table)?;
    }
    Ok(())
}
