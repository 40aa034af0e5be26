//! Runtime configuration

use crate::dispatch::BarrierScope;

/// Default capacity of a body's mailbox
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Default capacity of a forget-on-send queue, in-flight envelope included
pub const DEFAULT_FORGET_ON_SEND_CAPACITY: usize = 8;

/// Configuration for a [`Runtime`](crate::Runtime)
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Requests a body can hold before senders wait
    pub mailbox_capacity: usize,
    /// Envelopes per forget-on-send destination, counting the one in flight
    pub forget_on_send_capacity: usize,
    /// Envelope shells kept for reuse
    pub envelope_pool_size: usize,
    /// Buffered one-way failures per exception subscriber
    pub exception_channel_capacity: usize,
    /// Queues a Standard send waits for
    pub barrier_scope: BarrierScope,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            forget_on_send_capacity: DEFAULT_FORGET_ON_SEND_CAPACITY,
            envelope_pool_size: 64,
            exception_channel_capacity: 256,
            barrier_scope: BarrierScope::AllQueues,
        }
    }
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }
}

/// Builder for [`RuntimeConfig`]
#[derive(Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Set the mailbox capacity
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.mailbox_capacity = capacity;
        self
    }

    /// Set the forget-on-send queue capacity
    pub fn forget_on_send_capacity(mut self, capacity: usize) -> Self {
        self.config.forget_on_send_capacity = capacity;
        self
    }

    /// Set the envelope pool size
    pub fn envelope_pool_size(mut self, size: usize) -> Self {
        self.config.envelope_pool_size = size;
        self
    }

    pub fn exception_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.exception_channel_capacity = capacity;
        self
    }

    /// Set which queues the Standard rendezvous waits for
    pub fn barrier_scope(mut self, scope: BarrierScope) -> Self {
        self.config.barrier_scope = scope;
        self
    }

    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}
