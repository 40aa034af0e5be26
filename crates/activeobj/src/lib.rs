//! Active-object request dispatch
//!
//! Objects are served by execution bodies that run one request at a time.
//! Callers talk to them through proxies that reify each invocation as a
//! request and, depending on the method's signature, hand back nothing, a
//! value, or a future resolved later by the body.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  caller ── Proxy ── MethodCall (OneWay / Async / Sync)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Dispatcher                                                  │
//! │  - Standard: rendezvous, then direct delivery                │
//! │  - ForgetOnSend: bounded SendingQueue per destination,       │
//! │    one envelope in flight, sterile calls                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Directory (location table) ── BodyEndpoint                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ExecutionBody: mailbox ── serve one request ── resolve      │
//! │  the Future (write-once)                                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`]: values, identities and errors
//! - [`call`]: method signatures, call classification, interfaces
//! - [`future`]: write-once futures and the future pool
//! - [`dispatch`]: strategies, envelopes, sending queues, dispatcher
//! - [`body`]: active objects and the bodies serving them
//! - [`runtime`]: the context tying it all together

pub mod body;
pub mod call;
pub mod config;
pub mod dispatch;
pub mod exceptions;
pub mod future;
pub mod proxy;
pub mod runtime;
pub mod types;

pub use body::{ActiveObject, BodyContext, BodyState, ExecContext};
pub use call::{CallKind, Interface, MethodCall, MethodSignature, ReturnType};
pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use dispatch::{BarrierScope, SendStrategy};
pub use exceptions::OneWayFailure;
pub use future::{wait_any, Future, FuturePool};
pub use proxy::{Proxy, Reply};
pub use runtime::Runtime;
pub use types::{ActiveError, BodyId, FutureId, FutureTimeout, Result, Value, ValueType, WaitAnyError};
