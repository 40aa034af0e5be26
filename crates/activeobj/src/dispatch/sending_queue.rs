//! Bounded forget-on-send queues, one delivery worker per destination

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use crate::types::{ActiveError, BodyId, Result};

use super::courier::{Courier, Undelivered};
use super::envelope::RequestEnvelope;

struct Queued {
    envelope: Box<RequestEnvelope>,
    /// Slot held until the destination acknowledges the envelope
    slot: OwnedSemaphorePermit,
}

/// Bounded forget-on-send queue towards one destination.
///
/// A worker task keeps at most one envelope in flight; its acknowledgement
/// frees a slot and promotes the next envelope. The capacity covers both the
/// queued envelopes and the one in flight.
pub struct SendingQueue {
    destination: BodyId,
    capacity: usize,
    slots: Arc<Semaphore>,
    tx: mpsc::UnboundedSender<Queued>,
    /// Envelopes put but not yet acknowledged
    outstanding: Arc<watch::Sender<usize>>,
    sending: Arc<AtomicBool>,
}

impl SendingQueue {
    /// Create the queue and start its delivery worker
    pub fn spawn(destination: BodyId, capacity: usize, courier: Courier) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0usize);
        let queue = Arc::new(Self {
            destination,
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            tx,
            outstanding: Arc::new(outstanding),
            sending: Arc::new(AtomicBool::new(false)),
        });

        tokio::spawn(drain(rx, courier, queue.outstanding.clone(), queue.sending.clone()));
        debug!(destination = %destination, capacity, "sending queue started");
        queue
    }

    pub fn destination(&self) -> BodyId {
        self.destination
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue an envelope, waiting while the queue is full
    pub async fn put(&self, envelope: Box<RequestEnvelope>) -> Result<()> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ActiveError::communication(self.destination, "sending queue closed"))?;

        self.outstanding.send_modify(|n| *n += 1);
        if self.tx.send(Queued { envelope, slot }).is_err() {
            self.outstanding.send_modify(|n| *n -= 1);
            return Err(ActiveError::communication(self.destination, "sending queue worker stopped"));
        }
        Ok(())
    }

    /// Wait until every envelope put so far has been acknowledged
    pub async fn wait_for_empty(&self) {
        let mut rx = self.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Envelopes put but not yet acknowledged
    pub fn len(&self) -> usize {
        *self.outstanding.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an envelope is in flight
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }
}

/// Delivery worker: one envelope in flight at a time
async fn drain(
    mut rx: mpsc::UnboundedReceiver<Queued>,
    courier: Courier,
    outstanding: Arc<watch::Sender<usize>>,
    sending: Arc<AtomicBool>,
) {
    while let Some(Queued { mut envelope, slot }) = rx.recv().await {
        sending.store(true, Ordering::SeqCst);
        if let Some(request) = envelope.take() {
            let undelivered = Undelivered::from(&request);
            if let Err(error) = courier.deliver(request).await {
                courier.report_failure(undelivered, error);
            }
        }
        sending_ack(&courier, envelope, slot, &outstanding, &sending);
    }
}

/// The in-flight envelope was acknowledged (or given up on): recycle it and
/// promote the next one, or clear the in-progress marker when none is left.
fn sending_ack(
    courier: &Courier,
    envelope: Box<RequestEnvelope>,
    slot: OwnedSemaphorePermit,
    outstanding: &watch::Sender<usize>,
    sending: &AtomicBool,
) {
    courier.envelopes().release(envelope);
    drop(slot);
    outstanding.send_modify(|n| *n -= 1);
    if *outstanding.borrow() == 0 {
        sending.store(false, Ordering::SeqCst);
        trace!("sending queue drained");
    }
}
