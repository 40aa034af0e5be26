//! The execution body: a task owning one object and serving its mailbox

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, warn};

use crate::exceptions::OneWayFailure;
use crate::runtime::Runtime;
use crate::types::{ActiveError, BodyId, Result};

use super::active::{ActiveObject, BodyContext, ExecContext};
use super::endpoint::{BodyEndpoint, BodyMessage, LocalEndpoint, Route};
use super::request::Request;

/// Exception kind carried by the future of a request whose method panicked
pub const PANIC_KIND: &str = "Panic";

/// What a body is doing right now
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyState {
    Idle,
    Executing,
    /// Terminated, or handed over to a successor
    Stopped,
}

#[derive(Default)]
struct BodyStatus {
    executing: AtomicBool,
    stopped: AtomicBool,
    served: AtomicU64,
    halted: AtomicBool,
    /// Termination signal, checked ahead of the mailbox
    halt: Notify,
}

impl BodyStatus {
    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.halt.notify_one();
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}

/// Handle to a running execution body.
///
/// The body's task owns the object and serves its mailbox strictly one
/// request at a time.
#[derive(Clone)]
pub struct ExecutionBody {
    id: BodyId,
    parent: Option<BodyId>,
    endpoint: Arc<LocalEndpoint>,
    status: Arc<BodyStatus>,
}

impl ExecutionBody {
    /// Start a body serving `object` (starts the message loop)
    pub fn spawn(
        id: BodyId,
        parent: Option<BodyId>,
        object: Box<dyn ActiveObject>,
        runtime: Runtime,
    ) -> Self {
        let (body, rx) = Self::open(id, parent, runtime.config().mailbox_capacity);
        let ctx = BodyContext::new(id, parent, runtime);
        tokio::spawn(run(
            object,
            rx,
            ctx,
            Arc::downgrade(&body.endpoint),
            body.status.clone(),
        ));
        debug!(body = %id, "body started");
        body
    }

    /// Body with an open mailbox and no task serving it yet
    fn open(id: BodyId, parent: Option<BodyId>, capacity: usize) -> (Self, mpsc::Receiver<BodyMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let body = Self {
            id,
            parent,
            endpoint: Arc::new(LocalEndpoint::new(id, tx)),
            status: Arc::new(BodyStatus::default()),
        };
        (body, rx)
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn parent(&self) -> Option<BodyId> {
        self.parent
    }

    pub fn endpoint(&self) -> Arc<dyn BodyEndpoint> {
        self.endpoint.clone()
    }

    pub fn state(&self) -> BodyState {
        if self.status.stopped.load(Ordering::SeqCst) {
            BodyState::Stopped
        } else if self.status.executing.load(Ordering::SeqCst) {
            BodyState::Executing
        } else {
            BodyState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        !self.status.stopped.load(Ordering::SeqCst)
    }

    /// Number of requests served so far by this body instance
    pub fn served_count(&self) -> u64 {
        self.status.served.load(Ordering::SeqCst)
    }

    /// Move the object to a fresh body with the same identity.
    ///
    /// The route switches to the successor before the object is handed over:
    /// requests already in the mailbox are served here first, everything sent
    /// afterwards queues in the successor's mailbox until the object arrives.
    /// No lock is held while waiting, so the body may call itself meanwhile.
    pub async fn migrate(&self, runtime: &Runtime) -> Result<ExecutionBody> {
        let mailbox = match &*self.endpoint.route().read().await {
            Route::Live(mailbox) => mailbox.clone(),
            Route::Forward(_) | Route::Closed => return Err(self.migration_failed("body is not running here")),
        };
        // Room for the handover marker, reserved before the route is locked
        let slot = mailbox
            .clone()
            .reserve_owned()
            .await
            .map_err(|_| self.migration_failed("mailbox closed"))?;

        let (successor, rx) = Self::open(self.id, self.parent, runtime.config().mailbox_capacity);
        let (handover_tx, handover_rx) = oneshot::channel();
        {
            let mut route = self.endpoint.route().write().await;
            match &*route {
                Route::Live(current) if current.same_channel(&mailbox) => {}
                _ => return Err(self.migration_failed("body stopped while migrating")),
            }
            slot.send(BodyMessage::Migrate(handover_tx));
            *route = Route::Forward(successor.endpoint());
            self.endpoint.mark_moved();
        }

        let (started_tx, started_rx) = oneshot::channel();
        let ctx = BodyContext::new(self.id, self.parent, runtime.clone());
        tokio::spawn(resume(
            handover_rx,
            started_tx,
            rx,
            ctx,
            Arc::downgrade(&successor.endpoint),
            successor.status.clone(),
        ));

        match started_rx.await {
            Ok(true) => {
                debug!(body = %self.id, "body migrated");
                Ok(successor)
            }
            _ => Err(self.migration_failed("body stopped before handing over")),
        }
    }

    /// Stop the body. The request being served completes; requests still
    /// queued fail with `BodyTerminated`, and so does every later call.
    pub async fn terminate(&self) {
        self.status.halt();
        *self.endpoint.route().write().await = Route::Closed;
    }

    fn migration_failed(&self, reason: &str) -> ActiveError {
        ActiveError::MigrationFailed {
            body: self.id,
            reason: reason.to_string(),
        }
    }
}

/// Body message loop
async fn run(
    mut object: Box<dyn ActiveObject>,
    mut rx: mpsc::Receiver<BodyMessage>,
    ctx: BodyContext,
    endpoint: Weak<LocalEndpoint>,
    status: Arc<BodyStatus>,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = status.halt.notified() => None,
            msg = rx.recv() => msg,
        };
        let Some(msg) = msg else { break };
        if status.is_halted() {
            refuse(msg, &ctx);
            break;
        }

        match msg {
            BodyMessage::Request(request) => {
                if serve(object.as_mut(), &ctx, &status, request).await == Served::Panicked {
                    break;
                }
            }
            BodyMessage::Migrate(handover) => {
                if handover.send(object).is_err() {
                    warn!(body = %ctx.id(), "successor gone, object dropped");
                }
                status.stopped.store(true, Ordering::SeqCst);
                debug!(body = %ctx.id(), "object handed over");
                return;
            }
        }
    }
    close_out(rx, &ctx, &endpoint, &status).await;
}

/// Successor task: waits for the object, then serves the mailbox that has
/// been filling up since the route switched
async fn resume(
    handover: oneshot::Receiver<Box<dyn ActiveObject>>,
    started: oneshot::Sender<bool>,
    rx: mpsc::Receiver<BodyMessage>,
    ctx: BodyContext,
    endpoint: Weak<LocalEndpoint>,
    status: Arc<BodyStatus>,
) {
    match handover.await {
        Ok(object) => {
            let _ = started.send(true);
            run(object, rx, ctx, endpoint, status).await;
        }
        Err(_) => {
            let _ = started.send(false);
            close_out(rx, &ctx, &endpoint, &status).await;
        }
    }
}

/// Stop for good: fail whatever is still queued and close the route
async fn close_out(
    mut rx: mpsc::Receiver<BodyMessage>,
    ctx: &BodyContext,
    endpoint: &Weak<LocalEndpoint>,
    status: &BodyStatus,
) {
    rx.close();
    if let Some(endpoint) = endpoint.upgrade() {
        *endpoint.route().write().await = Route::Closed;
    }
    let mut refused = 0usize;
    while let Ok(msg) = rx.try_recv() {
        refuse(msg, ctx);
        refused += 1;
    }
    status.stopped.store(true, Ordering::SeqCst);
    debug!(body = %ctx.id(), refused, "body terminated");
}

fn refuse(msg: BodyMessage, ctx: &BodyContext) {
    // A dropped handover sender tells the successor to stand down
    let BodyMessage::Request(request) = msg else { return };
    let (source, destination) = (request.source, request.destination);
    let method = request.call.name().to_string();
    if let Some(error) = request.fail(ActiveError::BodyTerminated(ctx.id())) {
        ctx.runtime().exceptions().publish(OneWayFailure {
            source,
            destination,
            method,
            error,
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Served {
    Done,
    Panicked,
}

async fn serve(
    object: &mut dyn ActiveObject,
    ctx: &BodyContext,
    status: &BodyStatus,
    request: Request,
) -> Served {
    let Request {
        mut call,
        future,
        source,
        destination,
        is_local,
    } = request;

    if is_local {
        call.deep_copy_arguments();
    }

    let exec = ExecContext {
        body: ctx.id(),
        parent: ctx.parent(),
        sterile: call.is_sterile(),
    };

    status.executing.store(true, Ordering::SeqCst);
    let caught = AssertUnwindSafe(exec.scope(object.serve(ctx, &call)))
        .catch_unwind()
        .await;
    status.executing.store(false, Ordering::SeqCst);
    status.served.fetch_add(1, Ordering::SeqCst);

    let (outcome, served) = match caught {
        Ok(outcome) => (outcome, Served::Done),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(body = %ctx.id(), method = call.name(), "object panicked: {}", message);
            (Err(ActiveError::raised(PANIC_KIND, message)), Served::Panicked)
        }
    };

    match future {
        Some(future) => {
            if !future.try_resolve(outcome) {
                warn!(body = %ctx.id(), future = %future.id(), "future already resolved");
            }
        }
        None => {
            if let Err(error) = outcome {
                ctx.runtime().exceptions().publish(OneWayFailure {
                    source,
                    destination,
                    method: call.name().to_string(),
                    error,
                });
            }
        }
    }
    served
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
