use crate::error::MemrelError;
use crate::txn::TxnId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared: any number of concurrent readers.
    Read,
    /// Exclusive against every foreign holder.
    Write,
    /// Shared-intent taken on structurally involved tables: compatible with
    /// read/related, blocked by (and blocking) a foreign writer.
    Related,
}

#[derive(Debug, Default)]
struct TableLockState {
    writer: Option<TxnId>,
    writer_count: usize,
    readers: HashMap<TxnId, usize>,
    related: HashMap<TxnId, usize>,
}

impl TableLockState {
    fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty() && self.related.is_empty()
    }

    /// Transactions currently preventing `txn` from acquiring `mode`.
    /// Empty means the request is grantable; re-acquisition by a holder is
    /// always grantable.
    fn blockers(&self, txn: TxnId, mode: LockMode) -> Vec<TxnId> {
        let mut out = Vec::new();
        if let Some(writer) = self.writer
            && writer != txn
        {
            out.push(writer);
        }
        if matches!(mode, LockMode::Write) {
            out.extend(self.readers.keys().copied().filter(|t| *t != txn));
            for holder in self.related.keys().copied() {
                if holder != txn && !out.contains(&holder) {
                    out.push(holder);
                }
            }
        }
        out
    }

    fn grant(&mut self, txn: TxnId, mode: LockMode) {
        match mode {
            LockMode::Read => *self.readers.entry(txn).or_insert(0) += 1,
            LockMode::Related => *self.related.entry(txn).or_insert(0) += 1,
            LockMode::Write => {
                self.writer = Some(txn);
                self.writer_count += 1;
            }
        }
    }

    fn release(&mut self, txn: TxnId, mode: LockMode) {
        match mode {
            LockMode::Read => {
                if let Some(count) = self.readers.get_mut(&txn) {
                    *count -= 1;
                    if *count == 0 {
                        self.readers.remove(&txn);
                    }
                }
            }
            LockMode::Related => {
                if let Some(count) = self.related.get_mut(&txn) {
                    *count -= 1;
                    if *count == 0 {
                        self.related.remove(&txn);
                    }
                }
            }
            LockMode::Write => {
                if self.writer == Some(txn) {
                    self.writer_count -= 1;
                    if self.writer_count == 0 {
                        self.writer = None;
                    }
                }
            }
        }
    }

    fn release_owner(&mut self, txn: TxnId) {
        self.readers.remove(&txn);
        self.related.remove(&txn);
        if self.writer == Some(txn) {
            self.writer = None;
            self.writer_count = 0;
        }
    }
}

#[derive(Debug, Default)]
struct LockTable {
    tables: HashMap<String, TableLockState>,
    /// Blocked transaction → the holders it currently waits on. Maintained
    /// only while a transaction sits in the wait loop.
    waits_for: HashMap<TxnId, HashSet<TxnId>>,
}

/// Blocking table-granular lock manager. Acquisitions are reentrant per
/// transaction and counted; a transaction already holding Write re-acquires
/// any mode on the same table without waiting. Read→Write upgrade waits until
/// the requester is the sole holder.
#[derive(Debug)]
pub struct LockManager {
    state: Mutex<LockTable>,
    cv: Condvar,
    /// Set to true if a thread panics while holding the lock, indicating
    /// invariants may be violated. After poisoning, all new operations are
    /// rejected.
    poisoned: AtomicBool,
    deadlock_detection: bool,
}

impl LockManager {
    pub fn new(deadlock_detection: bool) -> Self {
        Self {
            state: Mutex::new(LockTable::default()),
            cv: Condvar::new(),
            poisoned: AtomicBool::new(false),
            deadlock_detection,
        }
    }

    pub fn acquire(
        &self,
        txn: TxnId,
        table: &str,
        mode: LockMode,
        timeout: Duration,
        cancel: Option<&AtomicBool>,
    ) -> Result<(), MemrelError> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(MemrelError::Validation(
                "lock manager poisoned - system in fail-safe mode".into(),
            ));
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().map_err(|_| self.poison("acquire"))?;
        loop {
            let entry = state.tables.entry(table.to_string()).or_default();
            let blockers = entry.blockers(txn, mode);
            if blockers.is_empty() {
                entry.grant(txn, mode);
                state.waits_for.remove(&txn);
                return Ok(());
            }

            if let Some(flag) = cancel
                && flag.load(Ordering::Relaxed)
            {
                state.waits_for.remove(&txn);
                return Err(MemrelError::Cancelled);
            }

            if self.deadlock_detection {
                state
                    .waits_for
                    .insert(txn, blockers.iter().copied().collect());
                if waits_on_itself(&state.waits_for, txn) {
                    state.waits_for.remove(&txn);
                    return Err(MemrelError::Deadlock {
                        table: table.to_string(),
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                state.waits_for.remove(&txn);
                return Err(MemrelError::LockTimeout {
                    table: table.to_string(),
                });
            }
            let remaining = deadline.saturating_duration_since(now);
            let (new_state, wait_result) = self
                .cv
                .wait_timeout(state, remaining)
                .map_err(|_| self.poison("wait"))?;
            state = new_state;
            if wait_result.timed_out() {
                state.waits_for.remove(&txn);
                return Err(MemrelError::LockTimeout {
                    table: table.to_string(),
                });
            }
        }
    }

    pub fn release(&self, txn: TxnId, table: &str, mode: LockMode) {
        let Ok(mut state) = self.state.lock() else {
            self.poisoned.store(true, Ordering::Release);
            error!("lock manager poisoned during release - entering fail-safe mode");
            return;
        };
        if let Some(entry) = state.tables.get_mut(table) {
            entry.release(txn, mode);
            if entry.is_free() {
                state.tables.remove(table);
            }
        }
        drop(state);
        self.cv.notify_all();
    }

    /// Drops every lock the transaction still holds, in one sweep. Called at
    /// transaction commit/abort.
    pub fn release_all(&self, txn: TxnId) {
        let Ok(mut state) = self.state.lock() else {
            self.poisoned.store(true, Ordering::Release);
            error!("lock manager poisoned during release_all - entering fail-safe mode");
            return;
        };
        state.tables.retain(|_, entry| {
            entry.release_owner(txn);
            !entry.is_free()
        });
        state.waits_for.remove(&txn);
        drop(state);
        self.cv.notify_all();
    }

    /// True when `txn` holds the table's write lock. Used by reentrant read
    /// paths that must not double-count a scope release.
    pub fn holds_write(&self, txn: TxnId, table: &str) -> bool {
        self.state
            .lock()
            .map(|state| {
                state
                    .tables
                    .get(table)
                    .is_some_and(|entry| entry.writer == Some(txn))
            })
            .unwrap_or(false)
    }

    fn poison(&self, phase: &str) -> MemrelError {
        self.poisoned.store(true, Ordering::Release);
        error!("lock manager poisoned during {phase} - entering fail-safe mode");
        MemrelError::Validation("lock manager poisoned - entering fail-safe mode".into())
    }
}

/// Cycle probe over the wait-for graph: does any chain of waits starting at
/// `start` lead back to `start`?
fn waits_on_itself(waits_for: &HashMap<TxnId, HashSet<TxnId>>, start: TxnId) -> bool {
    let mut visited = HashSet::new();
    let mut stack: Vec<TxnId> = waits_for
        .get(&start)
        .map(|s| s.iter().copied().collect())
        .unwrap_or_default();
    while let Some(next) = stack.pop() {
        if next == start {
            return true;
        }
        if visited.insert(next)
            && let Some(further) = waits_for.get(&next)
        {
            stack.extend(further.iter().copied());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{LockManager, LockMode};
    use crate::error::MemrelError;
    use crate::txn::TxnId;
    use std::sync::Arc;
    use std::time::Duration;

    const T1: TxnId = TxnId(1);
    const T2: TxnId = TxnId(2);

    fn short() -> Duration {
        Duration::from_millis(50)
    }

    #[test]
    fn read_locks_are_shared() {
        let locks = LockManager::new(true);
        locks.acquire(T1, "users", LockMode::Read, short(), None).expect("t1");
        locks.acquire(T2, "users", LockMode::Read, short(), None).expect("t2");
        locks.release_all(T1);
        locks.release_all(T2);
    }

    #[test]
    fn write_excludes_foreign_readers() {
        let locks = LockManager::new(true);
        locks.acquire(T1, "users", LockMode::Read, short(), None).expect("read");
        let err = locks
            .acquire(T2, "users", LockMode::Write, short(), None)
            .unwrap_err();
        assert!(matches!(err, MemrelError::LockTimeout { .. }));
        locks.release_all(T1);
        locks
            .acquire(T2, "users", LockMode::Write, short(), None)
            .expect("after release");
    }

    #[test]
    fn reacquire_is_reentrant() {
        let locks = LockManager::new(true);
        locks.acquire(T1, "users", LockMode::Write, short(), None).expect("write");
        locks.acquire(T1, "users", LockMode::Write, short(), None).expect("again");
        locks.acquire(T1, "users", LockMode::Read, short(), None).expect("read under write");
        locks.acquire(T1, "users", LockMode::Related, short(), None).expect("related");
        assert!(locks.holds_write(T1, "users"));
        locks.release(T1, "users", LockMode::Write);
        assert!(locks.holds_write(T1, "users"));
        locks.release_all(T1);
        assert!(!locks.holds_write(T1, "users"));
    }

    #[test]
    fn upgrade_waits_for_sole_ownership() {
        let locks = LockManager::new(true);
        locks.acquire(T1, "users", LockMode::Read, short(), None).expect("t1 read");
        locks.acquire(T2, "users", LockMode::Read, short(), None).expect("t2 read");
        let err = locks
            .acquire(T1, "users", LockMode::Write, short(), None)
            .unwrap_err();
        assert!(matches!(err, MemrelError::LockTimeout { .. }));
        locks.release_all(T2);
        locks
            .acquire(T1, "users", LockMode::Write, short(), None)
            .expect("upgrade once sole holder");
    }

    #[test]
    fn crossed_upgrades_report_deadlock() {
        let locks = Arc::new(LockManager::new(true));
        locks.acquire(T1, "users", LockMode::Read, short(), None).expect("t1 read");
        locks.acquire(T2, "users", LockMode::Read, short(), None).expect("t2 read");

        let other = Arc::clone(&locks);
        let handle = std::thread::spawn(move || {
            other.acquire(T2, "users", LockMode::Write, Duration::from_secs(2), None)
        });
        // Wait for the peer upgrade to block, then request the crossing one.
        std::thread::sleep(Duration::from_millis(50));
        let mine = locks.acquire(T1, "users", LockMode::Write, Duration::from_secs(2), None);
        let theirs = {
            // Unblock whichever side survived.
            locks.release_all(T1);
            handle.join().expect("join")
        };
        let deadlocked = matches!(mine, Err(MemrelError::Deadlock { .. }))
            || matches!(theirs, Err(MemrelError::Deadlock { .. }));
        assert!(deadlocked, "one of the crossed upgrades must deadlock");
        locks.release_all(T2);
    }

    #[test]
    fn related_blocks_foreign_writer_only() {
        let locks = LockManager::new(true);
        locks.acquire(T1, "users", LockMode::Related, short(), None).expect("related");
        locks.acquire(T2, "users", LockMode::Read, short(), None).expect("read beside related");
        let err = locks
            .acquire(T2, "users", LockMode::Write, short(), None)
            .unwrap_err();
        assert!(matches!(err, MemrelError::LockTimeout { .. }));
    }
}
