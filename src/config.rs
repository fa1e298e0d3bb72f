use std::time::Duration;

/// Runtime configuration for a memrel database.
#[derive(Debug, Clone)]
pub struct MemrelConfig {
    /// How long a lock acquisition may block before failing with `LockTimeout`.
    pub lock_timeout_ms: u64,
    /// Whether blocking acquisitions probe the wait-for graph and fail fast
    /// with `Deadlock` instead of waiting out the timeout.
    pub deadlock_detection: bool,
}

impl Default for MemrelConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            deadlock_detection: true,
        }
    }
}

impl MemrelConfig {
    /// Profile for highly contended workloads: fail lock waits quickly so
    /// callers can retry rather than queue.
    pub fn contended() -> Self {
        Self {
            lock_timeout_ms: 250,
            ..Self::default()
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
