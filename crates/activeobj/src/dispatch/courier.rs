//! Last hop of a send and reporting of failed deliveries

use std::sync::Arc;

use crate::body::{BodyEndpoint, Request};
use crate::exceptions::{ExceptionChannel, OneWayFailure};
use crate::future::Future;
use crate::types::{ActiveError, BodyId, Result};

use super::directory::Directory;
use super::envelope::EnvelopePool;

/// Final hop of every send: resolves the destination and hands the request over
#[derive(Clone)]
pub struct Courier {
    directory: Arc<Directory>,
    envelopes: Arc<EnvelopePool>,
    exceptions: ExceptionChannel,
}

impl Courier {
    pub fn new(directory: Arc<Directory>, envelopes: Arc<EnvelopePool>, exceptions: ExceptionChannel) -> Self {
        Self {
            directory,
            envelopes,
            exceptions,
        }
    }

    pub fn envelopes(&self) -> &EnvelopePool {
        &self.envelopes
    }

    /// Current endpoint of a body according to the location table
    pub fn locate(&self, id: BodyId) -> Result<Arc<dyn BodyEndpoint>> {
        self.directory.lookup(id)
    }

    /// Deliver `request` to the current location of its destination.
    /// `Ok` means the destination acknowledged receipt.
    pub async fn deliver(&self, request: Request) -> Result<()> {
        let endpoint = self.locate(request.destination)?;
        endpoint.receive_request(request).await
    }

    /// Deliver through a route the caller already holds
    pub async fn deliver_to(&self, endpoint: &Arc<dyn BodyEndpoint>, request: Request) -> Result<()> {
        endpoint.receive_request(request).await
    }

    /// Report a delivery failure nobody is waiting to observe synchronously
    pub fn report_failure(&self, undelivered: Undelivered, error: ActiveError) {
        match undelivered.future {
            Some(future) => {
                future.try_resolve(Err(error));
            }
            None => self.exceptions.publish(OneWayFailure {
                source: undelivered.source,
                destination: undelivered.destination,
                method: undelivered.method,
                error,
            }),
        }
    }
}

/// What is left to notify once a request has been handed to a transport that failed
#[derive(Debug)]
pub struct Undelivered {
    future: Option<Future>,
    source: BodyId,
    destination: BodyId,
    method: String,
}

impl From<&Request> for Undelivered {
    fn from(request: &Request) -> Self {
        Self {
            future: request.future.clone(),
            source: request.source,
            destination: request.destination,
            method: request.call.name().to_string(),
        }
    }
}
