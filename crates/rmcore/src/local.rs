//! In-process nodes backed by active objects
//!
//! Each [`LocalNode`] drives a `NodeAgent` active object. Script evaluation
//! is an asynchronous call, so the resource core gets a future per node and
//! can race them.

use std::collections::HashMap;
use std::sync::Arc;

use activeobj::{
    ActiveError, ActiveObject, BodyContext, Interface, MethodCall, MethodSignature, Proxy, Reply,
    Runtime, Value, ValueType,
};
use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, RmError};
use crate::node::{NodeHandle, NodeInfo};
use crate::script::SelectionScript;

/// Node-side state: attributes matched by scripts and the work left running
struct NodeAgent {
    name: String,
    attributes: HashMap<String, String>,
    residual_work: i64,
}

impl NodeAgent {
    /// Evaluate `&&`-joined clauses: `key` (present), `!key` (absent), `key=value`
    fn matches(&self, source: &str) -> bool {
        source
            .split("&&")
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .all(|clause| {
                if let Some(key) = clause.strip_prefix('!') {
                    !self.attributes.contains_key(key.trim())
                } else if let Some((key, value)) = clause.split_once('=') {
                    self.attributes.get(key.trim()).map(String::as_str) == Some(value.trim())
                } else {
                    self.attributes.contains_key(clause)
                }
            })
    }
}

#[async_trait]
impl ActiveObject for NodeAgent {
    fn interface(&self) -> Arc<Interface> {
        Interface::builder("NodeAgent")
            .method(MethodSignature::new("identity").returns(ValueType::Str))
            .method(
                MethodSignature::new("execute_script")
                    .param(ValueType::Str)
                    .param(ValueType::Bool)
                    .returns(ValueType::Any),
            )
            .method(MethodSignature::new("clean"))
            .method(MethodSignature::new("start_work"))
            .method(
                MethodSignature::new("set_attribute")
                    .param(ValueType::Str)
                    .param(ValueType::Str),
            )
            .method(MethodSignature::new("residual_work").returns(ValueType::Int))
            .build()
    }

    async fn serve(&mut self, _ctx: &BodyContext, call: &MethodCall) -> activeobj::Result<Value> {
        match call.name() {
            "identity" => Ok(Value::Str(self.name.clone())),
            "execute_script" => {
                let source = call.arg(0).as_str().unwrap_or_default();
                Ok(Value::Bool(self.matches(source)))
            }
            "clean" => {
                if self.residual_work > 0 {
                    debug!(node = %self.name, killed = self.residual_work, "cleaned node");
                }
                self.residual_work = 0;
                Ok(Value::Unit)
            }
            "start_work" => {
                self.residual_work += 1;
                Ok(Value::Unit)
            }
            "set_attribute" => {
                let key = call.arg(0).as_str().unwrap_or_default().to_string();
                let value = call.arg(1).as_str().unwrap_or_default().to_string();
                self.attributes.insert(key, value);
                Ok(Value::Unit)
            }
            "residual_work" => Ok(Value::Int(self.residual_work)),
            other => Err(ActiveError::raised("NoSuchMethod", other)),
        }
    }
}

/// A node running in this process
pub struct LocalNode {
    url: String,
    host: String,
    agent: Proxy,
    runtime: Runtime,
}

impl LocalNode {
    /// Start a node named `name` with the given attributes
    pub fn start(runtime: &Runtime, name: &str, attributes: HashMap<String, String>) -> Result<Arc<Self>> {
        let agent = runtime.activate(NodeAgent {
            name: name.to_string(),
            attributes,
            residual_work: 0,
        })?;
        Ok(Arc::new(Self {
            url: format!("local://{}", name),
            host: "localhost".to_string(),
            agent,
            runtime: runtime.clone(),
        }))
    }

    pub fn agent(&self) -> &Proxy {
        &self.agent
    }

    /// Stop the node; it becomes unreachable
    pub async fn kill(&self) -> Result<()> {
        self.runtime.terminate(self.agent.id()).await?;
        Ok(())
    }

    /// Simulate a task left running by the node's last user
    pub async fn start_work(&self) -> Result<()> {
        self.agent
            .submit("start_work", vec![])
            .await
            .map_err(|e| self.unreachable(e))?;
        Ok(())
    }

    pub async fn residual_work(&self) -> Result<i64> {
        let value = self
            .agent
            .submit("residual_work", vec![])
            .await
            .map_err(|e| self.unreachable(e))?
            .value()
            .await?;
        Ok(value.as_int().unwrap_or_default())
    }

    pub async fn set_attribute(&self, key: &str, value: &str) -> Result<()> {
        self.agent
            .submit("set_attribute", vec![key.into(), value.into()])
            .await
            .map_err(|e| self.unreachable(e))?;
        Ok(())
    }

    fn unreachable(&self, error: ActiveError) -> RmError {
        match error {
            ActiveError::BodyTerminated(_) | ActiveError::BodyNotFound(_) | ActiveError::Communication { .. } => {
                RmError::NodeUnreachable {
                    url: self.url.clone(),
                    reason: error.to_string(),
                }
            }
            other => RmError::Active(other),
        }
    }
}

#[async_trait]
impl NodeHandle for LocalNode {
    fn url(&self) -> &str {
        &self.url
    }

    async fn identity(&self) -> Result<NodeInfo> {
        if !self.runtime.is_alive(self.agent.id()) {
            return Err(RmError::NodeUnreachable {
                url: self.url.clone(),
                reason: "node agent stopped".to_string(),
            });
        }
        let name = self
            .agent
            .submit("identity", vec![])
            .await
            .map_err(|e| self.unreachable(e))?
            .value()
            .await?;
        Ok(NodeInfo {
            url: self.url.clone(),
            name: name.as_str().unwrap_or_default().to_string(),
            host: self.host.clone(),
        })
    }

    async fn clean(&self) -> Result<()> {
        self.agent
            .submit("clean", vec![])
            .await
            .map_err(|e| self.unreachable(e))?;
        Ok(())
    }

    async fn execute_script(&self, script: &SelectionScript) -> Result<activeobj::Future> {
        let reply = self
            .agent
            .submit(
                "execute_script",
                vec![script.source().into(), script.is_dynamic().into()],
            )
            .await
            .map_err(|e| self.unreachable(e))?;
        match reply {
            Reply::Future(future) => Ok(future),
            other => Err(RmError::Script {
                url: self.url.clone(),
                reason: format!("expected a future, got {:?}", other),
            }),
        }
    }
}
