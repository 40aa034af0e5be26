//! The resource core hosted as an active object
//!
//! Hosting gives the core the single-threaded isolation it relies on:
//! every request is served by one body, in order. Scripts still run on the
//! nodes in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use activeobj::{
    ActiveError, ActiveObject, BodyContext, Future, Interface, MethodCall, MethodSignature, Proxy,
    Runtime, Value, ValueType,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::resource_core::{ResourceCore, RmState};
use crate::error::{Result, RmError};
use crate::event::{RmEvent, RmMonitor};
use crate::node::NodeHandle;
use crate::script::SelectionScript;

/// Node handles waiting to be picked up by url
#[derive(Clone, Default)]
pub struct NodeRegistry {
    handles: Arc<Mutex<HashMap<String, Arc<dyn NodeHandle>>>>,
}

impl NodeRegistry {
    pub fn insert(&self, handle: Arc<dyn NodeHandle>) {
        self.handles.lock().insert(handle.url().to_string(), handle);
    }

    pub fn take(&self, url: &str) -> Option<Arc<dyn NodeHandle>> {
        self.handles.lock().remove(url)
    }
}

impl From<RmError> for ActiveError {
    fn from(error: RmError) -> Self {
        match error {
            RmError::Active(inner) => inner,
            other => ActiveError::raised("RmError", other.to_string()),
        }
    }
}

fn encode_script(script: Option<&SelectionScript>) -> Value {
    match script {
        Some(s) => Value::List(vec![s.source().into(), s.is_dynamic().into()]),
        None => Value::List(vec![]),
    }
}

fn decode_script(value: &Value) -> Option<SelectionScript> {
    match value.as_list()? {
        [Value::Str(source), Value::Bool(true)] => Some(SelectionScript::new_dynamic(source)),
        [Value::Str(source), Value::Bool(false)] => Some(SelectionScript::new_static(source)),
        _ => None,
    }
}

fn encode_urls<S: AsRef<str>>(urls: &[S]) -> Value {
    Value::List(urls.iter().map(|u| Value::Str(u.as_ref().to_string())).collect())
}

fn decode_urls(value: &Value) -> Vec<String> {
    value
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

struct HostedCore {
    core: ResourceCore,
    registry: NodeRegistry,
}

#[async_trait]
impl ActiveObject for HostedCore {
    fn interface(&self) -> Arc<Interface> {
        Interface::builder("ResourceManager")
            .method(
                MethodSignature::new("add_node")
                    .param(ValueType::Str)
                    .param(ValueType::Str)
                    .returns(ValueType::Bool),
            )
            .method(MethodSignature::new("create_node_source").param(ValueType::Str).returns(ValueType::Bool))
            .method(
                MethodSignature::new("remove_source")
                    .param(ValueType::Str)
                    .param(ValueType::Bool)
                    .returns(ValueType::Bool),
            )
            .method(
                MethodSignature::new("get_at_most_nodes")
                    .param(ValueType::Int)
                    .param(ValueType::List)
                    .param(ValueType::List)
                    .returns(ValueType::List),
            )
            .method(MethodSignature::new("free_nodes").param(ValueType::List))
            .method(MethodSignature::new("set_down_node").param(ValueType::Str))
            .method(MethodSignature::new("remove_node").param(ValueType::Str).param(ValueType::Bool))
            .method(MethodSignature::new("free_node_count").returns(ValueType::Int))
            .method(MethodSignature::new("snapshot").returns(ValueType::List).synchronous())
            .method(MethodSignature::new("shutdown").param(ValueType::Bool).returns(ValueType::Bool))
            .build()
    }

    async fn serve(&mut self, _ctx: &BodyContext, call: &MethodCall) -> activeobj::Result<Value> {
        let core = &mut self.core;
        match call.name() {
            "add_node" => {
                let url = call.arg(0).as_str().unwrap_or_default();
                let handle = self
                    .registry
                    .take(url)
                    .ok_or_else(|| RmError::UnknownNode(url.to_string()))?;
                let source = call.arg(1).as_str().filter(|s| !s.is_empty());
                core.add_node(handle, source).await?;
                Ok(Value::Bool(true))
            }
            "create_node_source" => {
                core.create_node_source(call.arg(0).as_str().unwrap_or_default())?;
                Ok(Value::Bool(true))
            }
            "remove_source" => {
                let name = call.arg(0).as_str().unwrap_or_default();
                let preempt = call.arg(1).as_bool().unwrap_or(false);
                core.remove_source(name, preempt).await?;
                Ok(Value::Bool(true))
            }
            "get_at_most_nodes" => {
                let nb = call.arg(0).as_int().unwrap_or(0).max(0) as usize;
                let script = decode_script(call.arg(1));
                let exclusion: HashSet<String> = decode_urls(call.arg(2)).into_iter().collect();
                let found = core.get_at_most_nodes(nb, script.as_ref(), &exclusion).await;
                Ok(encode_urls(&found.urls()))
            }
            "free_nodes" => {
                core.free_nodes(decode_urls(call.arg(0))).await?;
                Ok(Value::Unit)
            }
            "set_down_node" => {
                core.set_down_node(call.arg(0).as_str().unwrap_or_default())?;
                Ok(Value::Unit)
            }
            "remove_node" => {
                let url = call.arg(0).as_str().unwrap_or_default();
                core.remove_node(url, call.arg(1).as_bool().unwrap_or(false)).await?;
                Ok(Value::Unit)
            }
            "free_node_count" => Ok(Value::Int(core.free_count() as i64)),
            "snapshot" => {
                let state = core.snapshot();
                Ok(Value::List(vec![
                    encode_urls(&state.free),
                    encode_urls(&state.busy),
                    encode_urls(&state.to_release),
                    encode_urls(&state.down),
                    encode_urls(&state.sources),
                ]))
            }
            "shutdown" => {
                core.shutdown(call.arg(0).as_bool().unwrap_or(false)).await;
                Ok(Value::Bool(true))
            }
            other => Err(ActiveError::raised("NoSuchMethod", other)),
        }
    }
}

/// Starts resource managers
pub struct ResourceManager;

impl ResourceManager {
    /// Host `core` in its own body and return a client for it
    pub fn start(runtime: &Runtime, core: ResourceCore) -> Result<RmClient> {
        let monitor = core.monitor().clone();
        let registry = NodeRegistry::default();
        let proxy = runtime.activate(HostedCore {
            core,
            registry: registry.clone(),
        })?;
        Ok(RmClient {
            proxy,
            registry,
            monitor,
        })
    }
}

/// Typed client of a hosted resource manager
#[derive(Clone)]
pub struct RmClient {
    proxy: Proxy,
    registry: NodeRegistry,
    monitor: RmMonitor,
}

impl RmClient {
    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RmEvent> {
        self.monitor.subscribe()
    }

    /// Register a node; `None` puts it in the default source
    pub async fn add_node(&self, handle: Arc<dyn NodeHandle>, source: Option<&str>) -> Result<()> {
        let url = handle.url().to_string();
        self.registry.insert(handle);
        let reply = self
            .proxy
            .submit("add_node", vec![url.clone().into(), source.unwrap_or_default().into()])
            .await;
        if reply.is_err() {
            self.registry.take(&url);
        }
        reply?.value().await?;
        Ok(())
    }

    pub async fn create_node_source(&self, name: &str) -> Result<()> {
        self.proxy.submit("create_node_source", vec![name.into()]).await?;
        Ok(())
    }

    pub async fn remove_source(&self, name: &str, preempt: bool) -> Result<()> {
        self.proxy
            .submit("remove_source", vec![name.into(), preempt.into()])
            .await?;
        Ok(())
    }

    /// Ask for up to `nb` nodes; the future resolves to the granted urls
    pub async fn request_nodes(
        &self,
        nb: usize,
        script: Option<&SelectionScript>,
        exclusion: &[String],
    ) -> Result<Future> {
        let reply = self
            .proxy
            .submit(
                "get_at_most_nodes",
                vec![Value::Int(nb as i64), encode_script(script), encode_urls(exclusion)],
            )
            .await?;
        reply.into_future().ok_or_else(|| RmError::Script {
            url: String::new(),
            reason: "allocation did not return a future".to_string(),
        })
    }

    /// Ask for up to `nb` nodes and wait for the answer
    pub async fn get_at_most_nodes(
        &self,
        nb: usize,
        script: Option<&SelectionScript>,
        exclusion: &[String],
    ) -> Result<Vec<String>> {
        let value = self.request_nodes(nb, script, exclusion).await?.wait().await?;
        Ok(decode_urls(&value))
    }

    /// Give nodes back
    pub async fn free_nodes<S: AsRef<str>>(&self, urls: &[S]) -> Result<()> {
        self.proxy.submit("free_nodes", vec![encode_urls(urls)]).await?;
        Ok(())
    }

    pub async fn set_down_node(&self, url: &str) -> Result<()> {
        self.proxy.submit("set_down_node", vec![url.into()]).await?;
        Ok(())
    }

    pub async fn remove_node(&self, url: &str, preempt: bool) -> Result<()> {
        self.proxy
            .submit("remove_node", vec![url.into(), preempt.into()])
            .await?;
        Ok(())
    }

    pub async fn free_node_count(&self) -> Result<usize> {
        let value = self.proxy.submit("free_node_count", vec![]).await?.value().await?;
        Ok(value.as_int().unwrap_or_default().max(0) as usize)
    }

    pub async fn snapshot(&self) -> Result<RmState> {
        let value = self.proxy.submit("snapshot", vec![]).await?.value().await?;
        let lists: Vec<Vec<String>> = value.as_list().unwrap_or_default().iter().map(decode_urls).collect();
        let mut lists = lists.into_iter();
        Ok(RmState {
            free: lists.next().unwrap_or_default(),
            busy: lists.next().unwrap_or_default(),
            to_release: lists.next().unwrap_or_default(),
            down: lists.next().unwrap_or_default(),
            sources: lists.next().unwrap_or_default(),
        })
    }

    pub async fn shutdown(&self, preempt: bool) -> Result<()> {
        self.proxy.submit("shutdown", vec![preempt.into()]).await?;
        Ok(())
    }
}
