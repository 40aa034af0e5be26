//! Execution bodies: the single-threaded servers behind active objects
//!
//! Each body owns its object inside a dedicated task and serves requests
//! from its mailbox one at a time, in arrival order. The object never needs
//! to be `Sync`.

mod active;
mod endpoint;
mod execution;
mod request;

pub use active::{ActiveObject, BodyContext, ExecContext};
pub use endpoint::{BodyEndpoint, LocalEndpoint};
pub use execution::{BodyState, ExecutionBody, PANIC_KIND};
pub use request::Request;
