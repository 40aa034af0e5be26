//! Send strategies and which methods use them

use std::collections::HashMap;

use parking_lot::RwLock;

/// How requests for a method are sent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SendStrategy {
    /// Rendezvous: wait for pending forget-on-send traffic, then deliver directly
    #[default]
    Standard,
    /// Enqueue on the destination's bounded queue and return; the call becomes sterile
    ForgetOnSend,
}

/// Which sending queues a Standard send waits for before delivering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BarrierScope {
    /// Every forget-on-send queue of the dispatcher
    #[default]
    AllQueues,
    /// Only the queue towards the request's destination
    Destination,
}

/// Method name to strategy; unregistered methods are Standard
#[derive(Default)]
pub struct StrategyMap {
    entries: RwLock<HashMap<String, SendStrategy>>,
}

impl StrategyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, method: impl Into<String>, strategy: SendStrategy) {
        self.entries.write().insert(method.into(), strategy);
    }

    pub fn remove(&self, method: &str) {
        self.entries.write().remove(method);
    }

    pub fn strategy_for(&self, method: &str) -> SendStrategy {
        self.entries.read().get(method).copied().unwrap_or_default()
    }
}
