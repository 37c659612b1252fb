//! Named Locks
//!
//! Async mutexes keyed by name. The allocator takes the process-wide
//! advisory lock for number allocation first, then the row lock of the
//! install holding the candidate number. A database-backed deployment maps
//! these onto an advisory lock and `SELECT ... FOR UPDATE`.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Key of the advisory lock serializing scan-then-claim
pub const NUMBER_ALLOCATION_LOCK: &str = "network-number-allocation";

/// Key of the row lock for the install holding `install_number`
pub fn install_row_lock(install_number: u32) -> String {
    format!("install:{}", install_number)
}

/// Registry of named async mutexes
#[derive(Debug, Default)]
pub struct LockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait for and take the lock named `key`
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Whether somebody currently holds the lock named `key`
    pub fn is_held(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}
