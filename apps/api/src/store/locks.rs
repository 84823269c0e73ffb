use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

/// Per-identity reader/writer locks. Distinct ids never contend.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<Uuid, Arc<RwLock<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: Uuid) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id).or_default().clone()
    }

    pub async fn read(&self, id: Uuid) -> OwnedRwLockReadGuard<()> {
        self.handle(id).read_owned().await
    }

    pub async fn write(&self, id: Uuid) -> OwnedRwLockWriteGuard<()> {
        self.handle(id).write_owned().await
    }

    /// Write-locks every id in ascending order so overlapping multi-record
    /// operations cannot deadlock.
    pub async fn write_many(
        &self,
        ids: impl IntoIterator<Item = Uuid>,
    ) -> Vec<OwnedRwLockWriteGuard<()>> {
        let ordered: BTreeSet<Uuid> = ids.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for id in ordered {
            guards.push(self.write(id).await);
        }
        guards
    }
}
