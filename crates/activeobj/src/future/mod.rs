//! Write-once futures standing in for results of asynchronous calls

#[allow(clippy::module_inception)]
mod future;
mod pool;

pub use future::{wait_any, Future};
pub use pool::FuturePool;
