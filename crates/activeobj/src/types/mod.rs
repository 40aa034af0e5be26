//! Core data types shared by every layer of the dispatch engine

mod error;
mod identifiers;
mod value;

pub use error::{ActiveError, FutureTimeout, Result, WaitAnyError};
pub use identifiers::{BodyId, FutureId};
pub use value::{Value, ValueType};
