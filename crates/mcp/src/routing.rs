//! Tool name → owning server.
//!
//! Names are unique per server but not across servers. The last server to
//! register a name owns it; every takeover is recorded as a
//! [`RoutingConflict`].

use std::collections::HashMap;

/// A tool name that moved from one server to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConflict {
    pub tool: String,
    pub previous: String,
    pub replacement: String,
}

impl std::fmt::Display for RoutingConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tool '{}' from '{}' shadows the one from '{}'",
            self.tool, self.replacement, self.previous
        )
    }
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: HashMap<String, String>,
    conflicts: Vec<RoutingConflict>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `tools` to `server`, returning the conflicts this caused.
    pub fn register<'a>(
        &mut self,
        server: &str,
        tools: impl IntoIterator<Item = &'a str>,
    ) -> Vec<RoutingConflict> {
        let mut created = Vec::new();
        for tool in tools {
            match self.routes.insert(tool.to_string(), server.to_string()) {
                Some(previous) if previous != server => created.push(RoutingConflict {
                    tool: tool.to_string(),
                    previous,
                    replacement: server.to_string(),
                }),
                _ => {}
            }
        }
        self.conflicts.extend(created.iter().cloned());
        created
    }

    /// The server that owns `tool`.
    pub fn owner(&self, tool: &str) -> Option<&str> {
        self.routes.get(tool).map(String::as_str)
    }

    /// Every conflict recorded so far, oldest first.
    pub fn conflicts(&self) -> &[RoutingConflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.routes.clear();
    }
}
