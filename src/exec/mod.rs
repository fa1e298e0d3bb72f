//! The command execution core: given a prepared plan and an execution
//! context, each path acquires table locks in a deterministic order, takes
//! its working set through the query runner, opens an undo log scope,
//! mutates indexes and rows, validates foreign keys, and completes the
//! scope — so that a failure at any step leaves the store in its
//! pre-command state.

pub(crate) mod atomic_log;
pub(crate) mod constraints;
pub(crate) mod delete;
pub(crate) mod fk;
pub(crate) mod index_apply;
pub(crate) mod insert;
pub(crate) mod locking;
pub(crate) mod query;
pub(crate) mod relations;
pub(crate) mod tables;
pub(crate) mod update;

pub use update::{RowUpdater, SetUpdater, UpdateExpr};
