//! Registry of unresolved futures

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::types::{BodyId, FutureId};

use super::Future;

/// Registry of the futures a runtime is still waiting on.
///
/// Futures are registered when their request is sent and removed as soon as
/// they are resolved.
#[derive(Clone, Default)]
pub struct FuturePool {
    inner: Arc<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    next_seq: AtomicU64,
    awaited: Mutex<HashMap<FutureId, Future>>,
}

impl FuturePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a future for a call from `creator` to `updater`
    pub fn create(&self, creator: BodyId, updater: BodyId) -> Future {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = FutureId::new(creator, seq);
        let future = Future::new(id, updater);

        self.inner.awaited.lock().insert(id, future.clone());
        let pool: Weak<PoolInner> = Arc::downgrade(&self.inner);
        future.on_resolved(move |_| {
            if let Some(pool) = pool.upgrade() {
                pool.awaited.lock().remove(&id);
            }
        });
        future
    }

    /// Look up a pending future
    pub fn get(&self, id: &FutureId) -> Option<Future> {
        self.inner.awaited.lock().get(id).cloned()
    }

    /// Number of futures not yet resolved
    pub fn pending_count(&self) -> usize {
        self.inner.awaited.lock().len()
    }

    /// Pending futures whose result `updater` is expected to write
    pub fn pending_for(&self, updater: BodyId) -> Vec<Future> {
        self.inner
            .awaited
            .lock()
            .values()
            .filter(|f| f.updater() == updater)
            .cloned()
            .collect()
    }
}
