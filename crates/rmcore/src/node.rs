//! Nodes as seen by the resource core

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use activeobj::Future;
use async_trait::async_trait;

use crate::error::Result;
use crate::script::{ScriptStatus, SelectionScript};

/// Allocation state of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    Free,
    Busy,
    /// Busy, and to be released as soon as it is given back
    ToRelease,
    /// Unreachable; terminal until removed
    Down,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identity reported by a live node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub url: String,
    pub name: String,
    pub host: String,
}

/// Remote control of a computing node
#[async_trait]
pub trait NodeHandle: Send + Sync {
    fn url(&self) -> &str;

    /// Query the node; fails if it cannot be reached
    async fn identity(&self) -> Result<NodeInfo>;

    /// Kill any residual work left by a previous user
    async fn clean(&self) -> Result<()>;

    /// Start evaluating `script` on the node. The future resolves to
    /// `Value::Bool` with the verdict.
    async fn execute_script(&self, script: &SelectionScript) -> Result<Future>;
}

/// A registered node and its bookkeeping
pub struct RmNode {
    handle: Arc<dyn NodeHandle>,
    source: String,
    state: NodeState,
    scripts: HashMap<SelectionScript, ScriptStatus>,
}

impl RmNode {
    pub(crate) fn new(handle: Arc<dyn NodeHandle>, source: impl Into<String>) -> Self {
        Self {
            handle,
            source: source.into(),
            state: NodeState::Free,
            scripts: HashMap::new(),
        }
    }

    pub fn url(&self) -> &str {
        self.handle.url()
    }

    pub fn handle(&self) -> &Arc<dyn NodeHandle> {
        &self.handle
    }

    /// Name of the node source owning this node
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    pub fn script_status(&self, script: &SelectionScript) -> Option<ScriptStatus> {
        self.scripts.get(script).copied()
    }

    pub(crate) fn set_script_status(&mut self, script: &SelectionScript, status: ScriptStatus) {
        self.scripts.insert(script.clone(), status);
    }

    /// Results of dynamic scripts only hold for the allocation that ran them
    pub(crate) fn expire_dynamic_verifications(&mut self) {
        for (script, status) in self.scripts.iter_mut() {
            if script.is_dynamic() && *status == ScriptStatus::Verified {
                *status = ScriptStatus::AlreadyVerified;
            }
        }
    }
}

impl fmt::Debug for RmNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RmNode")
            .field("url", &self.url())
            .field("source", &self.source)
            .field("state", &self.state)
            .finish()
    }
}
