//! Client-side stand-in for an active object

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::body::{BodyEndpoint, ExecContext, Request};
use crate::call::{CallKind, Interface, MethodCall, EQUALS};
use crate::future::Future;
use crate::runtime::Runtime;
use crate::types::{BodyId, Result, Value};

/// What an invocation hands back to its caller
#[derive(Debug)]
pub enum Reply {
    /// One-way call, nothing to wait for
    Void,
    /// Synchronous result, or a locally answered identity method
    Value(Value),
    /// Asynchronous result, resolved later by the destination body
    Future(Future),
}

impl Reply {
    /// The value, waiting for it if necessary
    pub async fn value(self) -> Result<Value> {
        match self {
            Reply::Void => Ok(Value::Unit),
            Reply::Value(value) => Ok(value),
            Reply::Future(future) => future.wait().await,
        }
    }

    pub fn into_future(self) -> Option<Future> {
        match self {
            Reply::Future(future) => Some(future),
            _ => None,
        }
    }
}

/// Proxy turning method invocations into requests for one body.
///
/// Proxies to the same body are equal and hash alike regardless of which
/// route each one has cached.
#[derive(Clone)]
pub struct Proxy {
    target: BodyId,
    interface: Arc<Interface>,
    route: Arc<Mutex<Arc<dyn BodyEndpoint>>>,
    runtime: Runtime,
}

impl Proxy {
    pub(crate) fn new(
        target: BodyId,
        interface: Arc<Interface>,
        route: Arc<dyn BodyEndpoint>,
        runtime: Runtime,
    ) -> Self {
        Self {
            target,
            interface,
            route: Arc::new(Mutex::new(route)),
            runtime,
        }
    }

    /// Identity of the body behind this proxy
    pub fn id(&self) -> BodyId {
        self.target
    }

    pub fn interface(&self) -> &Arc<Interface> {
        &self.interface
    }

    /// Reference to pass this object as an argument
    pub fn as_value(&self) -> Value {
        Value::Ref(self.target)
    }

    /// Build a call to `method`, checking the arguments
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<MethodCall> {
        MethodCall::new(self.interface.method(method)?, args)
    }

    /// Build and invoke a call
    pub async fn submit(&self, method: &str, args: Vec<Value>) -> Result<Reply> {
        let call = self.call(method, args)?;
        self.invoke(call).await
    }

    /// Send `call` to the body, waiting only as much as its kind requires.
    ///
    /// Send failures are returned to one-way and synchronous callers; an
    /// asynchronous caller finds them in the returned future.
    pub async fn invoke(&self, call: MethodCall) -> Result<Reply> {
        if call.is_identity_shortcut() {
            return Ok(Reply::Value(self.answer_locally(&call)));
        }

        let kind = call.kind();
        let source = ExecContext::current()
            .map(|ctx| ctx.body)
            .unwrap_or_else(|| self.runtime.id());
        let route = self.current_route();
        let future = match kind {
            CallKind::OneWay => None,
            CallKind::Asynchronous | CallKind::Synchronous => {
                Some(self.runtime.futures().create(source, self.target))
            }
        };

        let request = Request {
            call,
            future: future.clone(),
            source,
            destination: self.target,
            is_local: route.is_local(),
        };
        let sent = self.runtime.dispatcher().send(request, route).await;

        let Some(future) = future else {
            return sent.map(|_| Reply::Void);
        };
        if let Err(error) = sent {
            future.try_resolve(Err(error.clone()));
            if kind == CallKind::Synchronous {
                return Err(error);
            }
        }
        match kind {
            CallKind::Synchronous => future.wait().await.map(Reply::Value),
            _ => Ok(Reply::Future(future)),
        }
    }

    fn answer_locally(&self, call: &MethodCall) -> Value {
        if call.name() == EQUALS {
            Value::Bool(call.arg(0).as_ref_id() == Some(self.target))
        } else {
            Value::Int(self.target.hash_code())
        }
    }

    /// Cached route, refreshed from the location table if the body moved
    fn current_route(&self) -> Arc<dyn BodyEndpoint> {
        let mut route = self.route.lock();
        if route.has_moved() {
            if let Ok(fresh) = self.runtime.directory().lookup(self.target) {
                debug!(body = %self.target, "refreshed route after migration");
                *route = fresh;
            }
        }
        route.clone()
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("target", &self.target)
            .field("interface", &self.interface.name())
            .finish()
    }
}
