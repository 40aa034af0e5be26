//! The runtime context: every table an active-object system needs, owned by
//! one handle instead of process globals

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::body::{ActiveObject, BodyState, ExecContext, ExecutionBody};
use crate::call::Interface;
use crate::config::RuntimeConfig;
use crate::dispatch::{Courier, Directory, Dispatcher, EnvelopePool, SendStrategy};
use crate::exceptions::{ExceptionChannel, OneWayFailure};
use crate::future::FuturePool;
use crate::proxy::Proxy;
use crate::types::{ActiveError, BodyId, Result};

struct BodyEntry {
    body: ExecutionBody,
    interface: Arc<Interface>,
}

struct RuntimeInner {
    /// Identity used as the source of calls made outside any body
    id: BodyId,
    config: RuntimeConfig,
    directory: Arc<Directory>,
    dispatcher: Dispatcher,
    futures: FuturePool,
    envelopes: Arc<EnvelopePool>,
    exceptions: ExceptionChannel,
    bodies: RwLock<HashMap<BodyId, BodyEntry>>,
    running: AtomicBool,
}

/// Shared handle to a set of active objects and their dispatch machinery.
///
/// Cloning is cheap; all clones address the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the given configuration
    pub fn new(config: RuntimeConfig) -> Self {
        let directory = Arc::new(Directory::new());
        let envelopes = Arc::new(EnvelopePool::new(config.envelope_pool_size));
        let exceptions = ExceptionChannel::new(config.exception_channel_capacity);
        let courier = Courier::new(directory.clone(), envelopes.clone(), exceptions.clone());
        let dispatcher = Dispatcher::new(courier, config.forget_on_send_capacity, config.barrier_scope);

        Self {
            inner: Arc::new(RuntimeInner {
                id: BodyId::generate(),
                config,
                directory,
                dispatcher,
                futures: FuturePool::new(),
                envelopes,
                exceptions,
                bodies: RwLock::new(HashMap::new()),
                running: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> BodyId {
        self.inner.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn futures(&self) -> &FuturePool {
        &self.inner.futures
    }

    pub fn envelopes(&self) -> &EnvelopePool {
        &self.inner.envelopes
    }

    pub fn exceptions(&self) -> &ExceptionChannel {
        &self.inner.exceptions
    }

    /// Receive failures of calls that had no future to report them
    pub fn subscribe_exceptions(&self) -> broadcast::Receiver<OneWayFailure> {
        self.inner.exceptions.subscribe()
    }

    /// Send every call to `method` with `strategy`
    pub fn register_strategy(&self, method: impl Into<String>, strategy: SendStrategy) {
        self.inner.dispatcher.strategies().register(method, strategy);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Turn `object` into an active object served by a new body.
    ///
    /// Called from inside a body, that body becomes the new one's parent.
    pub fn activate<O: ActiveObject>(&self, object: O) -> Result<Proxy> {
        let parent = ExecContext::current().map(|ctx| ctx.body);
        self.activate_with_parent(object, parent)
    }

    /// Activate with an explicit parent
    pub fn activate_with_parent<O: ActiveObject>(&self, object: O, parent: Option<BodyId>) -> Result<Proxy> {
        let id = BodyId::generate();
        if !self.is_running() {
            return Err(ActiveError::BodyTerminated(id));
        }

        let interface = object.interface();
        let body = ExecutionBody::spawn(id, parent, Box::new(object), self.clone());
        let endpoint = body.endpoint();
        self.inner.directory.register(endpoint.clone());
        self.inner.bodies.write().insert(
            id,
            BodyEntry {
                body,
                interface: interface.clone(),
            },
        );

        debug!(body = %id, interface = interface.name(), "activated");
        Ok(Proxy::new(id, interface, endpoint, self.clone()))
    }

    /// New proxy to an existing body
    pub fn proxy_for(&self, id: BodyId) -> Result<Proxy> {
        let interface = self
            .inner
            .bodies
            .read()
            .get(&id)
            .map(|entry| entry.interface.clone())
            .ok_or(ActiveError::BodyNotFound(id))?;
        let endpoint = self.inner.directory.lookup(id)?;
        Ok(Proxy::new(id, interface, endpoint, self.clone()))
    }

    fn body(&self, id: BodyId) -> Result<ExecutionBody> {
        self.inner
            .bodies
            .read()
            .get(&id)
            .map(|entry| entry.body.clone())
            .ok_or(ActiveError::BodyNotFound(id))
    }

    pub fn body_state(&self, id: BodyId) -> Option<BodyState> {
        self.body(id).ok().map(|body| body.state())
    }

    pub fn is_alive(&self, id: BodyId) -> bool {
        self.body(id).map(|body| body.is_running()).unwrap_or(false)
    }

    pub fn body_count(&self) -> usize {
        self.inner.bodies.read().len()
    }

    /// Relocate a body. Its identity is kept, requests sent before the move
    /// are served before any sent after it, and existing proxies keep working.
    pub async fn migrate(&self, id: BodyId) -> Result<()> {
        let body = self.body(id)?;
        let successor = body.migrate(self).await?;
        let replaced = match self.inner.bodies.write().get_mut(&id) {
            Some(entry) => {
                entry.body = successor.clone();
                self.inner.directory.register(successor.endpoint());
                true
            }
            None => false,
        };
        if !replaced {
            // Terminated while the object was moving
            successor.terminate().await;
            return Err(ActiveError::BodyTerminated(id));
        }
        info!(body = %id, "body relocated");
        Ok(())
    }

    /// Stop a body. Queued and later calls to it fail with `BodyTerminated`
    pub async fn terminate(&self, id: BodyId) -> Result<()> {
        let entry = self
            .inner
            .bodies
            .write()
            .remove(&id)
            .ok_or(ActiveError::BodyNotFound(id))?;
        entry.body.terminate().await;
        self.inner.directory.remove(id);
        self.inner.dispatcher.forget_destination(id);
        debug!(body = %id, "terminated");
        Ok(())
    }

    /// Terminate every body and refuse further activations
    pub async fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let bodies: Vec<ExecutionBody> = self
            .inner
            .bodies
            .write()
            .drain()
            .map(|(_, entry)| entry.body)
            .collect();
        info!(bodies = bodies.len(), "runtime shutting down");
        for body in bodies {
            body.terminate().await;
            self.inner.directory.remove(body.id());
            self.inner.dispatcher.forget_destination(body.id());
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
