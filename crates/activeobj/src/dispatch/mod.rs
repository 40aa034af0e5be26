//! Outgoing request dispatch
//!
//! ```text
//!   Proxy ──send──▶ Dispatcher ──Standard──────────────▶ BodyEndpoint
//!                       │      (after queues drain)          ▲
//!                       └──ForgetOnSend──▶ SendingQueue ─────┘
//!                                        (one in flight per destination)
//! ```

mod courier;
mod directory;
mod dispatcher;
mod envelope;
mod sending_queue;
mod strategy;

pub use courier::{Courier, Undelivered};
pub use directory::Directory;
pub use dispatcher::Dispatcher;
pub use envelope::{EnvelopePool, RequestEnvelope};
pub use sending_queue::SendingQueue;
pub use strategy::{BarrierScope, SendStrategy, StrategyMap};
