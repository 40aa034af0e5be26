//! Method call descriptors and their classification
//!
//! A call's [`CallKind`] is derived once from its signature's static
//! metadata and decides how the proxy handles it:
//!
//! | Signature                                        | Kind         |
//! |--------------------------------------------------|--------------|
//! | `Void`, no declared errors                       | OneWay       |
//! | reifiable return, no declared errors, no opt-out | Asynchronous |
//! | anything else                                    | Synchronous  |

mod method_call;
mod signature;

pub use method_call::MethodCall;
pub use signature::{CallKind, Interface, InterfaceBuilder, MethodSignature, ReturnType};

/// Name of the identity comparison answered by the proxy itself
pub const EQUALS: &str = "equals";

/// Name of the identity hash answered by the proxy itself
pub const HASH_CODE: &str = "hash_code";
