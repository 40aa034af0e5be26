//! The served-object trait and what a request sees while it runs

use std::sync::Arc;

use async_trait::async_trait;

use crate::call::{Interface, MethodCall};
use crate::proxy::Proxy;
use crate::runtime::Runtime;
use crate::types::{BodyId, Result, Value};

tokio::task_local! {
    static CURRENT: ExecContext;
}

/// An object served by an execution body.
///
/// `serve` takes `&mut self`: a body runs one request at a time, so the
/// object needs no internal synchronization.
#[async_trait]
pub trait ActiveObject: Send + 'static {
    /// Methods this object serves
    fn interface(&self) -> Arc<Interface>;

    /// Execute one call
    async fn serve(&mut self, ctx: &BodyContext, call: &MethodCall) -> Result<Value>;
}

/// What a served object can see of the body running it
pub struct BodyContext {
    id: BodyId,
    parent: Option<BodyId>,
    runtime: Runtime,
}

impl BodyContext {
    pub(crate) fn new(id: BodyId, parent: Option<BodyId>, runtime: Runtime) -> Self {
        Self { id, parent, runtime }
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Body that activated this one, if any
    pub fn parent(&self) -> Option<BodyId> {
        self.parent
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Proxy to this body
    pub fn this(&self) -> Result<Proxy> {
        self.runtime.proxy_for(self.id)
    }

    /// Proxy to the parent body
    pub fn parent_proxy(&self) -> Option<Result<Proxy>> {
        self.parent.map(|id| self.runtime.proxy_for(id))
    }
}

/// Execution context of the request currently being served on this task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecContext {
    pub body: BodyId,
    pub parent: Option<BodyId>,
    /// The request being served may only call its own body or its parent
    pub sterile: bool,
}

impl ExecContext {
    /// Context of the calling task, if it is serving a request
    pub fn current() -> Option<ExecContext> {
        CURRENT.try_with(|ctx| *ctx).ok()
    }

    /// Run `fut` with `self` installed as the current context
    pub(crate) async fn scope<F: std::future::Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// Whether a request served under this context may be sent to `destination`
    pub fn may_send_to(&self, destination: BodyId) -> bool {
        !self.sterile || destination == self.body || Some(destination) == self.parent
    }
}
