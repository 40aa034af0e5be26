//! Per-strategy routing of outgoing requests

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::body::{BodyEndpoint, ExecContext, Request};
use crate::types::{ActiveError, BodyId, Result};

use super::courier::Courier;
use super::sending_queue::SendingQueue;
use super::strategy::{BarrierScope, SendStrategy, StrategyMap};

/// Routes outgoing requests according to the strategy of their method.
///
/// Order is preserved per (source, destination, strategy). Standard sends
/// also wait for forget-on-send traffic to drain, so a Standard request never
/// overtakes one sent earlier under ForgetOnSend.
pub struct Dispatcher {
    strategies: StrategyMap,
    queues: RwLock<HashMap<BodyId, Arc<SendingQueue>>>,
    queue_capacity: usize,
    barrier_scope: BarrierScope,
    courier: Courier,
}

impl Dispatcher {
    pub fn new(courier: Courier, queue_capacity: usize, barrier_scope: BarrierScope) -> Self {
        Self {
            strategies: StrategyMap::new(),
            queues: RwLock::new(HashMap::new()),
            queue_capacity,
            barrier_scope,
            courier,
        }
    }

    pub fn strategies(&self) -> &StrategyMap {
        &self.strategies
    }

    /// Send a request. Returns once the destination has acknowledged it
    /// (Standard) or once it is queued (ForgetOnSend).
    ///
    /// `route` is the sender's cached endpoint for the destination. Standard
    /// sends use it directly; queued sends resolve the destination when the
    /// envelope is delivered.
    pub async fn send(&self, mut request: Request, route: Arc<dyn BodyEndpoint>) -> Result<()> {
        if let Some(ctx) = ExecContext::current() {
            if !ctx.may_send_to(request.destination) {
                return Err(ActiveError::SterileViolation {
                    source_body: ctx.body,
                    destination: request.destination,
                });
            }
        }

        match self.strategies.strategy_for(request.call.name()) {
            SendStrategy::Standard => self.send_standard(request, route).await,
            SendStrategy::ForgetOnSend => {
                request.call.mark_sterile();
                let queue = self.queue_for(request.destination);
                let envelope = self.courier.envelopes().acquire(request);
                queue.put(envelope).await
            }
        }
    }

    async fn send_standard(&self, request: Request, route: Arc<dyn BodyEndpoint>) -> Result<()> {
        let destination = request.destination;
        self.rendezvous(destination).await;

        match self.courier.deliver_to(&route, request.clone()).await {
            Err(error) if error.is_communication() => {
                warn!(destination = %destination, "delivery failed, retrying once: {}", error);
                self.rendezvous(destination).await;
                let route = self.courier.locate(destination)?;
                self.courier.deliver_to(&route, request).await
            }
            other => other,
        }
    }

    /// Wait for the forget-on-send queues in the barrier's scope to drain
    async fn rendezvous(&self, destination: BodyId) {
        let pending: Vec<Arc<SendingQueue>> = {
            let queues = self.queues.read();
            match self.barrier_scope {
                BarrierScope::AllQueues => queues.values().filter(|q| !q.is_empty()).cloned().collect(),
                BarrierScope::Destination => queues
                    .get(&destination)
                    .filter(|q| !q.is_empty())
                    .cloned()
                    .into_iter()
                    .collect(),
            }
        };
        if pending.is_empty() {
            return;
        }
        for queue in pending {
            trace!(destination = %queue.destination(), "waiting for sending queue to drain");
            queue.wait_for_empty().await;
        }
        self.prune_departed();
    }

    fn queue_for(&self, destination: BodyId) -> Arc<SendingQueue> {
        if let Some(queue) = self.queues.read().get(&destination) {
            return queue.clone();
        }
        self.queues
            .write()
            .entry(destination)
            .or_insert_with(|| SendingQueue::spawn(destination, self.queue_capacity, self.courier.clone()))
            .clone()
    }

    /// Wait until every forget-on-send queue is empty
    pub async fn wait_for_empty(&self) {
        let queues: Vec<Arc<SendingQueue>> = self.queues.read().values().cloned().collect();
        for queue in queues {
            queue.wait_for_empty().await;
        }
        self.prune_departed();
    }

    /// Drop drained queues whose destination has left the location table.
    ///
    /// A send racing with the removal keeps its own handle on the queue, so
    /// its envelope is still delivered (or reported) by the worker.
    fn prune_departed(&self) {
        self.queues.write().retain(|destination, queue| {
            let keep = !queue.is_empty() || self.courier.locate(*destination).is_ok();
            if !keep {
                trace!(destination = %destination, "dropping sending queue of departed body");
            }
            keep
        });
    }

    /// Number of destinations with a sending queue
    pub fn queue_count(&self) -> usize {
        self.queues.read().len()
    }

    /// Envelopes outstanding towards `destination`
    pub fn queue_len(&self, destination: BodyId) -> usize {
        self.queues.read().get(&destination).map(|q| q.len()).unwrap_or(0)
    }

    /// Drop the queue towards a body that no longer exists
    pub fn forget_destination(&self, destination: BodyId) {
        self.queues.write().remove(&destination);
    }
}
