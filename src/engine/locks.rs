//! Per-worker mutual exclusion.
//!
//! Claim and release are read-modify-write sequences over a worker and its
//! tickets; two of them on the same worker must never interleave. Different
//! workers never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

use crate::model::WorkerId;

/// Held for the duration of one lifecycle operation on a worker.
pub type WorkerGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct WorkerLocks {
    slots: Mutex<HashMap<WorkerId, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `worker`.
    pub async fn lock(&self, worker: WorkerId) -> WorkerGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Only the map holds a reference: nobody owns or awaits that slot.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(worker).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of workers currently locked or awaited.
    pub fn active(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| Arc::strong_count(slot) > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_worker_is_serialized() {
        let locks = Arc::new(WorkerLocks::new());
        let guard = locks.lock(WorkerId(1)).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(WorkerId(1)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_workers_do_not_contend() {
        let locks = WorkerLocks::new();
        let _a = locks.lock(WorkerId(1)).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.lock(WorkerId(2)))
            .await
            .expect("second worker should lock immediately");
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_slots_are_pruned() {
        let locks = WorkerLocks::new();
        drop(locks.lock(WorkerId(1)).await);
        drop(locks.lock(WorkerId(2)).await);
        assert_eq!(locks.active(), 0);
        let _c = locks.lock(WorkerId(3)).await;
        assert_eq!(locks.slots.lock().unwrap().len(), 1);
    }
}
