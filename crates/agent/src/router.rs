//! Tool dispatch across the local executor and remote servers.

use async_trait::async_trait;
use coralclaw_core::provider::ToolDefinition;
use coralclaw_core::tool::{ToolInvoker, not_found_message};

/// Routes a tool call to the local executor or to remote servers.
///
/// The local executor, when present, wins name clashes. Without it every
/// name goes to the remote side.
#[derive(Default, Clone, Copy)]
pub struct ToolRouter<'a> {
    local: Option<&'a dyn ToolInvoker>,
    remote: Option<&'a dyn ToolInvoker>,
}

impl<'a> ToolRouter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(mut self, local: &'a dyn ToolInvoker) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_remote(mut self, remote: &'a dyn ToolInvoker) -> Self {
        self.remote = Some(remote);
        self
    }

    fn resolve(&self, name: &str) -> Option<&'a dyn ToolInvoker> {
        self.local
            .filter(|local| local.has_tool(name))
            .or_else(|| self.remote.filter(|remote| remote.has_tool(name)))
    }
}

#[async_trait]
impl<'a> ToolInvoker for ToolRouter<'a> {
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.local.map(|l| l.definitions()).unwrap_or_default();
        if let Some(remote) = self.remote {
            let visible: Vec<ToolDefinition> = remote
                .definitions()
                .into_iter()
                .filter(|def| !self.local.is_some_and(|l| l.has_tool(&def.name)))
                .collect();
            definitions.extend(visible);
        }
        definitions
    }

    fn has_tool(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    async fn invoke(&self, name: &str, arguments: serde_json::Value) -> String {
        match self.resolve(name) {
            Some(invoker) => invoker.invoke(name, arguments).await,
            None => not_found_message(name),
        }
    }
}
