//! Requests: a method call addressed from one body to another

use crate::call::MethodCall;
use crate::future::Future;
use crate::types::{ActiveError, BodyId};

/// A call in transit from a source body to a destination body
#[derive(Clone, Debug)]
pub struct Request {
    pub call: MethodCall,
    /// Absent for one-way calls
    pub future: Option<Future>,
    pub source: BodyId,
    pub destination: BodyId,
    /// Sender and receiver share memory; arguments are deep-copied on receipt
    pub is_local: bool,
}

impl Request {
    /// Fail the request. Returns the error back when there is no future to carry it.
    pub fn fail(self, error: ActiveError) -> Option<ActiveError> {
        match self.future {
            Some(future) => {
                future.try_resolve(Err(error));
                None
            }
            None => Some(error),
        }
    }
}
