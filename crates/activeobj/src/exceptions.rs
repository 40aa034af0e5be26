//! Out-of-band reporting of failures that have no future to carry them

use tokio::sync::broadcast;
use tracing::warn;

use crate::types::{ActiveError, BodyId};

/// A one-way call or a forget-on-send delivery failed
#[derive(Clone, Debug)]
pub struct OneWayFailure {
    /// Body that sent the call
    pub source: BodyId,
    /// Body the call was addressed to
    pub destination: BodyId,
    /// Method name
    pub method: String,
    pub error: ActiveError,
}

/// Broadcast channel for [`OneWayFailure`]s.
///
/// Publishing never waits and succeeds with no subscribers.
#[derive(Clone)]
pub struct ExceptionChannel {
    tx: broadcast::Sender<OneWayFailure>,
}

impl ExceptionChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Log and broadcast a failure
    pub fn publish(&self, failure: OneWayFailure) {
        warn!(
            source = %failure.source,
            destination = %failure.destination,
            method = %failure.method,
            "one-way call failed: {}",
            failure.error
        );
        let _ = self.tx.send(failure);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OneWayFailure> {
        self.tx.subscribe()
    }
}
