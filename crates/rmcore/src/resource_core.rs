//! The resource core: node state machine and allocation

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use activeobj::{wait_any, ActiveError, Future, Value, WaitAnyError};
use tracing::{debug, info, warn};

use crate::error::{Result, RmError};
use crate::event::{RmEvent, RmMonitor};
use crate::node::{NodeHandle, NodeState, RmNode};
use crate::script::{compare_status, ScriptStatus, SelectionScript};
use crate::source::{NodeSource, DEFAULT_SOURCE};

/// How long one selection pass waits for any pending script verdict
pub const SCRIPT_VERIFICATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for a [`ResourceCore`]
#[derive(Clone, Debug)]
pub struct RmConfig {
    /// Events buffered per monitor subscriber
    pub event_capacity: usize,
}

impl Default for RmConfig {
    fn default() -> Self {
        Self { event_capacity: 256 }
    }
}

/// Nodes handed out by one allocation
#[derive(Clone, Default)]
pub struct NodeSet {
    nodes: Vec<Arc<dyn NodeHandle>>,
}

impl NodeSet {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn urls(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.url().to_string()).collect()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.nodes.iter().any(|n| n.url() == url)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn NodeHandle>> {
        self.nodes.iter()
    }

    fn push(&mut self, node: Arc<dyn NodeHandle>) {
        self.nodes.push(node);
    }
}

impl std::fmt::Debug for NodeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.urls()).finish()
    }
}

/// Snapshot of the core for monitors that connect late
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RmState {
    pub free: Vec<String>,
    pub busy: Vec<String>,
    pub to_release: Vec<String>,
    pub down: Vec<String>,
    pub sources: Vec<String>,
}

/// Tracks every node in exactly one of four lists and hands free nodes out.
///
/// Not synchronized: the core is meant to be owned by a single task, such
/// as the body of the hosting [`ResourceManager`](crate::ResourceManager).
pub struct ResourceCore {
    nodes: HashMap<String, RmNode>,
    free: Vec<String>,
    busy: Vec<String>,
    to_release: Vec<String>,
    down: Vec<String>,
    sources: HashMap<String, NodeSource>,
    monitor: RmMonitor,
    shutting_down: bool,
}

impl ResourceCore {
    pub fn new(config: RmConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            free: Vec::new(),
            busy: Vec::new(),
            to_release: Vec::new(),
            down: Vec::new(),
            sources: HashMap::new(),
            monitor: RmMonitor::new(config.event_capacity),
            shutting_down: false,
        }
    }

    pub fn monitor(&self) -> &RmMonitor {
        &self.monitor
    }

    fn node(&self, url: &str) -> Result<&RmNode> {
        self.nodes.get(url).ok_or_else(|| RmError::UnknownNode(url.to_string()))
    }

    fn list_mut(&mut self, state: NodeState) -> &mut Vec<String> {
        match state {
            NodeState::Free => &mut self.free,
            NodeState::Busy => &mut self.busy,
            NodeState::ToRelease => &mut self.to_release,
            NodeState::Down => &mut self.down,
        }
    }

    /// Move a node to `to`, keeping the lists and its state consistent
    fn move_to(&mut self, url: &str, to: NodeState) {
        let Some(from) = self.nodes.get(url).map(RmNode::state) else {
            return;
        };
        self.list_mut(from).retain(|u| u != url);
        self.list_mut(to).push(url.to_string());
        if let Some(node) = self.nodes.get_mut(url) {
            node.set_state(to);
        }
    }

    fn require(&self, url: &str, allowed: &[NodeState], operation: &'static str) -> Result<()> {
        let from = self.node(url)?.state();
        if allowed.contains(&from) {
            Ok(())
        } else {
            Err(RmError::IllegalTransition {
                url: url.to_string(),
                from,
                operation,
            })
        }
    }

    async fn clean(&self, url: &str) {
        let Ok(node) = self.node(url) else { return };
        let handle = node.handle().clone();
        if let Err(e) = handle.clean().await {
            warn!(url, "failed to clean node: {}", e);
        }
    }

    /// Free to Busy
    pub async fn set_busy(&mut self, url: &str) -> Result<()> {
        self.require(url, &[NodeState::Free], "set busy")?;
        self.clean(url).await;
        self.move_to(url, NodeState::Busy);
        self.monitor.emit(RmEvent::NodeBusy { url: url.to_string() });
        Ok(())
    }

    /// Busy to Free; results of dynamic scripts expire
    pub async fn set_free(&mut self, url: &str) -> Result<()> {
        self.require(url, &[NodeState::Busy], "set free")?;
        self.clean(url).await;
        if let Some(node) = self.nodes.get_mut(url) {
            node.expire_dynamic_verifications();
        }
        self.move_to(url, NodeState::Free);
        self.monitor.emit(RmEvent::NodeFree { url: url.to_string() });
        Ok(())
    }

    /// Busy to ToRelease
    pub fn set_to_release(&mut self, url: &str) -> Result<()> {
        self.require(url, &[NodeState::Busy], "set to release")?;
        self.move_to(url, NodeState::ToRelease);
        self.monitor.emit(RmEvent::NodeToRelease { url: url.to_string() });
        Ok(())
    }

    /// Any live state to Down
    pub fn set_down(&mut self, url: &str) -> Result<()> {
        self.require(
            url,
            &[NodeState::Free, NodeState::Busy, NodeState::ToRelease],
            "set down",
        )?;
        self.move_to(url, NodeState::Down);
        warn!(url, "node is down");
        self.monitor.emit(RmEvent::NodeDown { url: url.to_string() });
        Ok(())
    }

    /// Release a node now if it is free, or once it is given back if busy
    pub async fn release_node(&mut self, url: &str) -> Result<()> {
        match self.node(url)?.state() {
            NodeState::Free => self.do_release(url).await,
            NodeState::Busy => self.set_to_release(url),
            from => Err(RmError::IllegalTransition {
                url: url.to_string(),
                from,
                operation: "release",
            }),
        }
    }

    /// Clean a Free or ToRelease node and drop it from the core
    pub async fn do_release(&mut self, url: &str) -> Result<()> {
        self.require(url, &[NodeState::Free, NodeState::ToRelease], "release")?;
        self.clean(url).await;
        self.remove_entry(url);
        Ok(())
    }

    fn remove_entry(&mut self, url: &str) {
        let Some(node) = self.nodes.get(url) else { return };
        let state = node.state();
        let source_name = node.source().to_string();
        self.list_mut(state).retain(|u| u != url);
        self.nodes.remove(url);
        debug!(url, "node removed");
        self.monitor.emit(RmEvent::NodeRemoved { url: url.to_string() });

        let finished = match self.sources.get_mut(&source_name) {
            Some(source) => {
                source.remove(url);
                source.is_removing() && source.is_empty()
            }
            None => false,
        };
        if finished {
            self.sources.remove(&source_name);
            info!(source = %source_name, "node source removed");
            self.monitor.emit(RmEvent::SourceRemoved { name: source_name });
        }
    }

    /// Register a new node source
    pub fn create_node_source(&mut self, name: &str) -> Result<()> {
        if self.shutting_down {
            return Err(RmError::ShuttingDown);
        }
        if self.sources.contains_key(name) {
            return Err(RmError::SourceExists(name.to_string()));
        }
        self.sources.insert(name.to_string(), NodeSource::new(name));
        info!(source = name, "node source created");
        self.monitor.emit(RmEvent::SourceAdded { name: name.to_string() });
        Ok(())
    }

    /// Add a node to a source; `None` means the default source
    pub async fn add_node(&mut self, handle: Arc<dyn NodeHandle>, source: Option<&str>) -> Result<()> {
        if self.shutting_down {
            return Err(RmError::ShuttingDown);
        }
        let url = handle.url().to_string();
        if self.nodes.contains_key(&url) {
            return Err(RmError::DuplicateNode(url));
        }

        let source_name = source.unwrap_or(DEFAULT_SOURCE);
        if source_name == DEFAULT_SOURCE && !self.sources.contains_key(DEFAULT_SOURCE) {
            self.create_node_source(DEFAULT_SOURCE)?;
        }
        match self.sources.get(source_name) {
            Some(s) if !s.is_removing() => {}
            _ => return Err(RmError::UnknownSource(source_name.to_string())),
        }

        handle.identity().await?;
        if let Err(e) = handle.clean().await {
            warn!(url = %url, "failed to clean new node: {}", e);
        }

        if let Some(source) = self.sources.get_mut(source_name) {
            source.add(&url);
        }
        self.nodes.insert(url.clone(), RmNode::new(handle, source_name));
        self.free.push(url.clone());
        info!(url = %url, source = source_name, "node added");
        self.monitor.emit(RmEvent::NodeAdded {
            url,
            source: source_name.to_string(),
        });
        Ok(())
    }

    /// Remove a node. Without `preempt`, a busy node is removed once given back.
    pub async fn remove_node(&mut self, url: &str, preempt: bool) -> Result<()> {
        match self.node(url)?.state() {
            NodeState::Down => self.remove_entry(url),
            NodeState::Free => self.do_release(url).await?,
            NodeState::Busy | NodeState::ToRelease if preempt => {
                self.clean(url).await;
                self.remove_entry(url);
            }
            NodeState::Busy => self.set_to_release(url)?,
            NodeState::ToRelease => {}
        }
        Ok(())
    }

    /// Remove a node source and, eventually, all its nodes
    pub async fn remove_source(&mut self, name: &str, preempt: bool) -> Result<()> {
        if name == DEFAULT_SOURCE {
            return Err(RmError::DefaultSourceRemoval);
        }
        let source = self
            .sources
            .get_mut(name)
            .ok_or_else(|| RmError::UnknownSource(name.to_string()))?;
        source.mark_removing();
        let urls: Vec<String> = source.nodes().map(str::to_string).collect();

        if urls.is_empty() {
            self.sources.remove(name);
            self.monitor.emit(RmEvent::SourceRemoved { name: name.to_string() });
            return Ok(());
        }
        for url in urls {
            self.remove_node(&url, preempt).await?;
        }
        Ok(())
    }

    /// Take back a node handed out earlier
    pub async fn free_node(&mut self, url: &str) -> Result<()> {
        let Some(node) = self.nodes.get(url) else {
            warn!(url, "cannot free unknown node");
            return Ok(());
        };
        match node.state() {
            NodeState::Busy => self.set_free(url).await,
            NodeState::ToRelease => self.do_release(url).await,
            NodeState::Free => {
                warn!(url, "node is already free");
                Ok(())
            }
            NodeState::Down => {
                debug!(url, "ignoring free of a down node");
                Ok(())
            }
        }
    }

    pub async fn free_nodes<I, S>(&mut self, urls: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            self.free_node(url.as_ref()).await?;
        }
        Ok(())
    }

    /// Mark a node unreachable
    pub fn set_down_node(&mut self, url: &str) -> Result<()> {
        if self.node(url)?.state() == NodeState::Down {
            return Ok(());
        }
        self.set_down(url)
    }

    /// Hand out up to `nb` free nodes passing `script`, skipping `exclusion`.
    ///
    /// Returns fewer nodes, possibly none, when not enough qualify. Empty
    /// while shutting down.
    pub async fn get_at_most_nodes(
        &mut self,
        nb: usize,
        script: Option<&SelectionScript>,
        exclusion: &HashSet<String>,
    ) -> NodeSet {
        if self.shutting_down || nb == 0 {
            return NodeSet::default();
        }

        let mut candidates: Vec<String> = self
            .free
            .iter()
            .filter(|url| !exclusion.contains(*url))
            .cloned()
            .collect();

        let found = match script {
            None => self.select_without_script(nb, candidates).await,
            Some(script) => {
                if !script.is_dynamic() {
                    candidates.sort_by(|a, b| {
                        compare_status(self.cached_status(a, script), self.cached_status(b, script))
                    });
                }
                self.select_with_script(nb, script, candidates.into()).await
            }
        };
        info!(requested = nb, granted = found.len(), "allocation done");
        found
    }

    fn cached_status(&self, url: &str, script: &SelectionScript) -> Option<ScriptStatus> {
        self.nodes.get(url).and_then(|n| n.script_status(script))
    }

    async fn select_without_script(&mut self, nb: usize, candidates: Vec<String>) -> NodeSet {
        let mut found = NodeSet::default();
        for url in candidates {
            if found.len() >= nb {
                break;
            }
            if let Some(handle) = self.acquire(&url).await {
                found.push(handle);
            }
        }
        found
    }

    async fn select_with_script(
        &mut self,
        nb: usize,
        script: &SelectionScript,
        mut candidates: VecDeque<String>,
    ) -> NodeSet {
        let mut found = NodeSet::default();

        if !script.is_dynamic() {
            while found.len() < nb {
                let verified = candidates
                    .front()
                    .map(|url| self.cached_status(url, script) == Some(ScriptStatus::Verified))
                    .unwrap_or(false);
                if !verified {
                    break;
                }
                if let Some(url) = candidates.pop_front() {
                    if let Some(handle) = self.acquire(&url).await {
                        debug!(url = %url, "reusing cached script verdict");
                        found.push(handle);
                    }
                }
            }
        }

        let mut pending: Vec<(String, Future)> = Vec::new();
        loop {
            while found.len() + pending.len() < nb && !candidates.is_empty() {
                self.launch(script, &mut candidates, &mut pending).await;
            }
            if found.len() >= nb || pending.is_empty() {
                break;
            }

            let futures: Vec<Future> = pending.iter().map(|(_, f)| f.clone()).collect();
            let index = match wait_any(&futures, SCRIPT_VERIFICATION_TIMEOUT).await {
                Ok(index) => index,
                Err(WaitAnyError::Timeout) | Err(WaitAnyError::Empty) => {
                    warn!(
                        pending = pending.len(),
                        "no selection script answered in time, abandoning pending verifications"
                    );
                    break;
                }
            };

            let (url, future) = pending.remove(index);
            match future.try_outcome() {
                Some(Ok(Value::Bool(true))) => {
                    if let Some(handle) = self.acquire(&url).await {
                        if let Some(node) = self.nodes.get_mut(&url) {
                            node.set_script_status(script, ScriptStatus::Verified);
                        }
                        found.push(handle);
                    }
                }
                Some(Ok(Value::Bool(false))) => {
                    if !script.is_dynamic() {
                        if let Some(node) = self.nodes.get_mut(&url) {
                            node.set_script_status(script, ScriptStatus::NotVerified);
                        }
                    }
                }
                Some(Err(ActiveError::BodyTerminated(_)))
                | Some(Err(ActiveError::BodyNotFound(_)))
                | Some(Err(ActiveError::Communication { .. })) => {
                    warn!(url = %url, "node lost while running selection script");
                    let _ = self.set_down(&url);
                }
                Some(Err(e)) => warn!(url = %url, "selection script raised: {}", e),
                Some(Ok(other)) => warn!(url = %url, "selection script returned {:?}, expected a boolean", other),
                None => warn!(url = %url, "selection script future reported without a result"),
            }
        }
        found
    }

    /// Start the script on the next candidate
    async fn launch(
        &mut self,
        script: &SelectionScript,
        candidates: &mut VecDeque<String>,
        pending: &mut Vec<(String, Future)>,
    ) {
        let Some(url) = candidates.pop_front() else { return };
        let Ok(node) = self.node(&url) else { return };
        let handle = node.handle().clone();
        match handle.execute_script(script).await {
            Ok(future) => pending.push((url, future)),
            Err(RmError::NodeUnreachable { reason, .. }) => {
                warn!(url = %url, "cannot run selection script: {}", reason);
                let _ = self.set_down(&url);
            }
            Err(e) => warn!(url = %url, "cannot run selection script: {}", e),
        }
    }

    /// Check the node answers, then mark it busy. An unreachable node goes down.
    async fn acquire(&mut self, url: &str) -> Option<Arc<dyn NodeHandle>> {
        let handle = self.node(url).ok()?.handle().clone();
        match handle.identity().await {
            Ok(_) => match self.set_busy(url).await {
                Ok(()) => Some(handle),
                Err(e) => {
                    warn!(url, "cannot allocate node: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!(url, "node unreachable: {}", e);
                let _ = self.set_down(url);
                None
            }
        }
    }

    /// Stop handing out nodes and remove all of them
    pub async fn shutdown(&mut self, preempt: bool) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!(nodes = self.nodes.len(), preempt, "resource core shutting down");
        self.monitor.emit(RmEvent::ShuttingDown);

        let urls: Vec<String> = self.nodes.keys().cloned().collect();
        for url in urls {
            if let Err(e) = self.remove_node(&url, preempt).await {
                warn!(url = %url, "failed to remove node during shutdown: {}", e);
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn node_state(&self, url: &str) -> Option<NodeState> {
        self.nodes.get(url).map(RmNode::state)
    }

    pub fn script_status(&self, url: &str, script: &SelectionScript) -> Option<ScriptStatus> {
        self.cached_status(url, script)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn busy_count(&self) -> usize {
        self.busy.len()
    }

    pub fn down_count(&self) -> usize {
        self.down.len()
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn snapshot(&self) -> RmState {
        let mut sources: Vec<String> = self.sources.keys().cloned().collect();
        sources.sort();
        RmState {
            free: self.free.clone(),
            busy: self.busy.clone(),
            to_release: self.to_release.clone(),
            down: self.down.clone(),
            sources,
        }
    }
}

impl Default for ResourceCore {
    fn default() -> Self {
        Self::new(RmConfig::default())
    }
}
