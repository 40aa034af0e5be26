//! Write-once futures and waiting on several of them

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::types::{BodyId, FutureId, FutureTimeout, Result, Value, WaitAnyError};

type Callback = Box<dyn FnOnce(&Result<Value>) + Send>;

struct FutureInner {
    id: FutureId,
    updater: BodyId,
    outcome: OnceLock<Result<Value>>,
    resolved: Notify,
    callbacks: Mutex<Vec<Callback>>,
}

/// Placeholder for the result of an asynchronous or synchronous call.
///
/// Created empty when the request is sent and resolved exactly once by the
/// body that executes it. Clones share the same slot, so any number of
/// readers can wait for it.
#[derive(Clone)]
pub struct Future {
    inner: Arc<FutureInner>,
}

impl Future {
    /// Create an unresolved future owned by `id.creator` and written by `updater`
    pub fn new(id: FutureId, updater: BodyId) -> Self {
        Self {
            inner: Arc::new(FutureInner {
                id,
                updater,
                outcome: OnceLock::new(),
                resolved: Notify::new(),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> FutureId {
        self.inner.id
    }

    /// Body that creates the call
    pub fn creator(&self) -> BodyId {
        self.inner.id.creator
    }

    /// Body responsible for resolving the future
    pub fn updater(&self) -> BodyId {
        self.inner.updater
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    /// Outcome if already resolved, without waiting
    pub fn try_outcome(&self) -> Option<Result<Value>> {
        self.inner.outcome.get().cloned()
    }

    /// Write the terminal outcome and wake every waiter.
    ///
    /// # Panics
    ///
    /// Panics if the future was already resolved.
    pub fn resolve(&self, outcome: Result<Value>) {
        if !self.try_resolve(outcome) {
            panic!("future {} resolved twice", self.inner.id);
        }
    }

    /// Write the outcome unless one is already set. Returns whether this call
    /// resolved the future; a lost race leaves the first outcome in place.
    pub fn try_resolve(&self, outcome: Result<Value>) -> bool {
        if self.inner.outcome.set(outcome).is_err() {
            return false;
        }
        let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
        if let Some(outcome) = self.inner.outcome.get() {
            for callback in callbacks {
                callback(outcome);
            }
        }
        self.inner.resolved.notify_waiters();
        true
    }

    /// Run `callback` once the future is resolved, immediately if it already is
    pub fn on_resolved<F>(&self, callback: F)
    where
        F: FnOnce(&Result<Value>) + Send + 'static,
    {
        {
            let mut callbacks = self.inner.callbacks.lock();
            if self.inner.outcome.get().is_none() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        if let Some(outcome) = self.inner.outcome.get() {
            callback(outcome);
        }
    }

    /// Wait until resolved, without reading the outcome
    pub async fn resolved(&self) {
        loop {
            let notified = self.inner.resolved.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_resolved() {
                return;
            }
            notified.await;
        }
    }

    /// Wait for the outcome
    pub async fn wait(&self) -> Result<Value> {
        self.resolved().await;
        match self.inner.outcome.get() {
            Some(outcome) => outcome.clone(),
            None => unreachable!("woken before resolution"),
        }
    }

    /// Wait for the outcome at most `timeout`.
    ///
    /// An elapsed timeout is reported as [`FutureTimeout`], distinct from a
    /// resolved failure.
    pub async fn wait_for(&self, timeout: Duration) -> std::result::Result<Result<Value>, FutureTimeout> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| FutureTimeout(self.inner.id))
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.inner.id)
            .field("updater", &self.inner.updater)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Wait until one of `futures` is resolved and return its index.
///
/// Already resolved futures are reported first, lowest index wins.
pub async fn wait_any(futures: &[Future], timeout: Duration) -> std::result::Result<usize, WaitAnyError> {
    if futures.is_empty() {
        return Err(WaitAnyError::Empty);
    }
    if let Some(index) = futures.iter().position(Future::is_resolved) {
        return Ok(index);
    }

    let waits = futures.iter().map(|f| Box::pin(f.resolved()));
    match tokio::time::timeout(timeout, futures::future::select_all(waits)).await {
        Ok((_, index, _)) => Ok(index),
        Err(_) => Err(WaitAnyError::Timeout),
    }
}
