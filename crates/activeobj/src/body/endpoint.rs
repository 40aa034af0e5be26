//! Where senders hand requests to a body, and how a moved body forwards them

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::types::{ActiveError, BodyId, Result};

use super::active::ActiveObject;
use super::request::Request;

/// Receiving side of a body, as seen by senders.
///
/// `receive_request` returning `Ok` is the receipt acknowledgement. This is
/// the seam where a network transport would plug in.
#[async_trait]
pub trait BodyEndpoint: Send + Sync {
    fn body_id(&self) -> BodyId;

    /// Whether the body shares memory with its callers
    fn is_local(&self) -> bool;

    /// The body has been relocated; callers should refresh their route
    fn has_moved(&self) -> bool {
        false
    }

    async fn receive_request(&self, request: Request) -> Result<()>;
}

pub(crate) enum BodyMessage {
    Request(Request),
    /// Hand the object over and stop
    Migrate(oneshot::Sender<Box<dyn ActiveObject>>),
}

pub(crate) enum Route {
    Live(mpsc::Sender<BodyMessage>),
    Forward(Arc<dyn BodyEndpoint>),
    Closed,
}

/// In-process endpoint feeding a body's mailbox.
///
/// After a migration it forwards to the successor, so senders holding a
/// stale route still reach the body.
pub struct LocalEndpoint {
    id: BodyId,
    route: RwLock<Route>,
    moved: AtomicBool,
}

impl LocalEndpoint {
    pub(crate) fn new(id: BodyId, mailbox: mpsc::Sender<BodyMessage>) -> Self {
        Self {
            id,
            route: RwLock::new(Route::Live(mailbox)),
            moved: AtomicBool::new(false),
        }
    }

    /// Senders hold the read lock while enqueueing; switching the route takes
    /// the write lock, so no request lands in a mailbox after its switch.
    pub(crate) fn route(&self) -> &RwLock<Route> {
        &self.route
    }

    pub(crate) fn mark_moved(&self) {
        self.moved.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BodyEndpoint for LocalEndpoint {
    fn body_id(&self) -> BodyId {
        self.id
    }

    fn is_local(&self) -> bool {
        true
    }

    fn has_moved(&self) -> bool {
        self.moved.load(Ordering::SeqCst)
    }

    async fn receive_request(&self, request: Request) -> Result<()> {
        let route = self.route.read().await;
        match &*route {
            Route::Live(mailbox) => mailbox
                .send(BodyMessage::Request(request))
                .await
                .map_err(|_| ActiveError::communication(self.id, "mailbox closed")),
            Route::Forward(next) => next.receive_request(request).await,
            Route::Closed => Err(ActiveError::BodyTerminated(self.id)),
        }
    }
}
