pub mod locks;

use crate::txn::locks::LockManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Identity of a transaction for lock ownership and wait-for tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

/// A long-lived unit of isolation spanning any number of commands. The
/// transaction itself carries no undo state (each command is atomic on its
/// own); what it owns is the set of table locks accumulated by its commands,
/// released in one sweep at commit or rollback.
#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    locks: Arc<LockManager>,
    finished: AtomicBool,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, locks: Arc<LockManager>) -> Self {
        Self {
            id,
            locks,
            finished: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn commit(self) {
        self.finish();
    }

    pub fn rollback(self) {
        self.finish();
    }

    fn finish(&self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            self.locks.release_all(self.id);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            debug!(txn = self.id.0, "transaction dropped without commit; releasing locks");
            self.locks.release_all(self.id);
        }
    }
}

/// Call-scoped bundle handed to every command: the active transaction plus
/// an optional cancellation flag, observed at lock-acquisition suspension
/// points. Once a command's log scope is open, cancellation is no longer
/// polled; the command runs to completion or error.
pub struct ExecutionContext<'a> {
    txn: &'a Transaction,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(txn: &'a Transaction) -> Self {
        Self { txn, cancel: None }
    }

    pub fn with_cancellation(txn: &'a Transaction, cancel: Arc<AtomicBool>) -> Self {
        Self {
            txn,
            cancel: Some(cancel),
        }
    }

    pub fn txn(&self) -> &Transaction {
        self.txn
    }

    pub(crate) fn txn_id(&self) -> TxnId {
        self.txn.id
    }

    pub(crate) fn cancel_flag(&self) -> Option<&AtomicBool> {
        self.cancel.as_deref()
    }
}
