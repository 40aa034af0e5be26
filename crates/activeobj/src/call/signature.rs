//! Method signatures and object interfaces

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::{ActiveError, Result, ValueType};

use super::{EQUALS, HASH_CODE};

/// Declared return type of a method
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReturnType {
    Void,
    Value(ValueType),
}

/// How a call is sent and how its caller waits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Fire-and-forget; no future is created
    OneWay,
    /// A future is handed back immediately
    Asynchronous,
    /// The caller blocks until the result is available
    Synchronous,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Static description of one method of an active object
#[derive(Clone, Debug, PartialEq)]
pub struct MethodSignature {
    name: String,
    params: Vec<ValueType>,
    returns: ReturnType,
    throws: bool,
    force_sync: bool,
    kind: CallKind,
}

impl MethodSignature {
    /// New signature with no parameters returning `Void`
    pub fn new(name: impl Into<String>) -> Self {
        let mut sig = Self {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnType::Void,
            throws: false,
            force_sync: false,
            kind: CallKind::OneWay,
        };
        sig.kind = sig.classify();
        sig
    }

    /// Append a parameter
    pub fn param(mut self, ty: ValueType) -> Self {
        self.params.push(ty);
        self
    }

    /// Set the return type
    pub fn returns(mut self, ty: ValueType) -> Self {
        self.returns = ReturnType::Value(ty);
        self.kind = self.classify();
        self
    }

    /// Declare that the method reports checked errors to its caller
    pub fn throws(mut self) -> Self {
        self.throws = true;
        self.kind = self.classify();
        self
    }

    /// Opt out of asynchronous handling
    pub fn synchronous(mut self) -> Self {
        self.force_sync = true;
        self.kind = self.classify();
        self
    }

    fn classify(&self) -> CallKind {
        match self.returns {
            ReturnType::Void if !self.throws => CallKind::OneWay,
            ReturnType::Value(ty) if ty.is_reifiable() && !self.throws && !self.force_sync => {
                CallKind::Asynchronous
            }
            _ => CallKind::Synchronous,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn return_type(&self) -> ReturnType {
        self.returns
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }
}

/// The set of methods an active object serves
#[derive(Debug)]
pub struct Interface {
    name: String,
    methods: HashMap<String, Arc<MethodSignature>>,
}

impl Interface {
    /// Start building an interface
    pub fn builder(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a method by name
    pub fn method(&self, name: &str) -> Result<Arc<MethodSignature>> {
        self.methods
            .get(name)
            .cloned()
            .ok_or_else(|| ActiveError::MethodNotFound {
                interface: self.name.clone(),
                method: name.to_string(),
            })
    }

    /// Names of all methods, sorted
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Builder for [`Interface`]
pub struct InterfaceBuilder {
    name: String,
    methods: HashMap<String, Arc<MethodSignature>>,
}

impl InterfaceBuilder {
    /// Add a method; a later method with the same name replaces the earlier one
    pub fn method(mut self, sig: MethodSignature) -> Self {
        self.methods.insert(sig.name.clone(), Arc::new(sig));
        self
    }

    /// Build the interface, adding the identity methods answered by proxies
    pub fn build(mut self) -> Arc<Interface> {
        self.methods.insert(
            EQUALS.to_string(),
            Arc::new(MethodSignature::new(EQUALS).param(ValueType::Ref).returns(ValueType::Bool)),
        );
        self.methods.insert(
            HASH_CODE.to_string(),
            Arc::new(MethodSignature::new(HASH_CODE).returns(ValueType::Int)),
        );
        Arc::new(Interface {
            name: self.name,
            methods: self.methods,
        })
    }
}
