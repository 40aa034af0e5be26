//! Reified method invocations and their classification

use std::sync::Arc;

use crate::types::{ActiveError, Result, Value};

use super::signature::{CallKind, MethodSignature};
use super::{EQUALS, HASH_CODE};

/// A method invocation reified as data: signature, arguments and sterility
#[derive(Clone, Debug)]
pub struct MethodCall {
    signature: Arc<MethodSignature>,
    args: Vec<Value>,
    sterile: bool,
}

impl MethodCall {
    /// Build a call, checking arity and argument types against the signature
    pub fn new(signature: Arc<MethodSignature>, args: Vec<Value>) -> Result<Self> {
        let params = signature.params();
        if params.len() != args.len() {
            return Err(ActiveError::ArityMismatch {
                method: signature.name().to_string(),
                expected: params.len(),
                got: args.len(),
            });
        }
        for (index, (ty, arg)) in params.iter().zip(&args).enumerate() {
            if !ty.accepts(arg) {
                return Err(ActiveError::TypeMismatch {
                    method: signature.name().to_string(),
                    index,
                    expected: ty.to_string(),
                    got: arg.type_name().to_string(),
                });
            }
        }
        Ok(Self {
            signature,
            args,
            sterile: false,
        })
    }

    pub fn name(&self) -> &str {
        self.signature.name()
    }

    pub fn signature(&self) -> &Arc<MethodSignature> {
        &self.signature
    }

    pub fn kind(&self) -> CallKind {
        self.signature.kind()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Argument at `index`; `Unit` if out of range
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&Value::Unit)
    }

    /// Whether this is one of the identity methods answered by the proxy
    pub fn is_identity_shortcut(&self) -> bool {
        matches!(self.name(), EQUALS | HASH_CODE)
    }

    pub fn is_sterile(&self) -> bool {
        self.sterile
    }

    /// Forbid the executing body from sending anywhere but itself or its parent
    pub fn mark_sterile(&mut self) {
        self.sterile = true;
    }

    /// Replace every argument with a copy that shares no buffers with the caller's
    pub fn deep_copy_arguments(&mut self) {
        for arg in &mut self.args {
            *arg = arg.deep_copy();
        }
    }
}
