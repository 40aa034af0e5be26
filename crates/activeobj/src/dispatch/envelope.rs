//! Reusable request envelopes
//!
//! Queued requests travel in boxed envelopes taken from a free list and
//! returned once the destination acknowledges them.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::body::Request;
use crate::types::BodyId;

/// Reusable carrier for one request on its way through a sending queue
#[derive(Debug, Default)]
pub struct RequestEnvelope {
    request: Option<Request>,
    destination: Option<BodyId>,
}

impl RequestEnvelope {
    fn fill(&mut self, request: Request) {
        self.destination = Some(request.destination);
        self.request = Some(request);
    }

    fn clear(&mut self) {
        self.request = None;
        self.destination = None;
    }

    /// Take the request out for delivery, leaving an empty shell
    pub fn take(&mut self) -> Option<Request> {
        self.request.take()
    }

    pub fn destination(&self) -> Option<BodyId> {
        self.destination
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_none()
    }
}

/// Bounded free list of envelope shells
pub struct EnvelopePool {
    free: Mutex<Vec<Box<RequestEnvelope>>>,
    capacity: usize,
    allocated: AtomicU64,
}

impl EnvelopePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            allocated: AtomicU64::new(0),
        }
    }

    /// Wrap `request` in a pooled envelope, allocating if the pool is empty
    pub fn acquire(&self, request: Request) -> Box<RequestEnvelope> {
        let mut envelope = match self.free.lock().pop() {
            Some(envelope) => envelope,
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Box::default()
            }
        };
        envelope.fill(request);
        envelope
    }

    /// Return a delivered envelope; dropped if the pool is full
    pub fn release(&self, mut envelope: Box<RequestEnvelope>) {
        envelope.clear();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(envelope);
        }
    }

    /// Shells ready for reuse
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Shells allocated over the pool's lifetime
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }
}
