use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::contract::ToolDescriptor;

/// Tools known from imported toolboxes, keyed by `(toolbox alias, tool name)`.
///
/// Populated when a toolbox is imported; geoprocessing entries look their tool
/// up here instead of building a callable name at runtime.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<(String, String), ToolDescriptor>,
    toolboxes: HashMap<String, PathBuf>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `alias` has already been imported from `toolbox_path`.
    pub fn is_imported(&self, alias: &str, toolbox_path: &Path) -> bool {
        self.toolboxes
            .get(alias)
            .map(|p| p == toolbox_path)
            .unwrap_or(false)
    }

    /// Record the tools of a toolbox. Re-importing an alias replaces its tools.
    pub fn register_toolbox<I, S>(&mut self, toolbox_path: &Path, alias: &str, tool_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.retain(|(a, _), _| a != alias);
        for name in tool_names {
            let tool_name = name.into();
            debug!(alias, tool = %tool_name, "Registered tool");
            self.tools.insert(
                (alias.to_string(), tool_name.clone()),
                ToolDescriptor {
                    toolbox_path: toolbox_path.to_path_buf(),
                    toolbox_alias: alias.to_string(),
                    tool_name,
                },
            );
        }
        self.toolboxes
            .insert(alias.to_string(), toolbox_path.to_path_buf());
    }

    pub fn lookup(&self, alias: &str, tool: &str) -> Option<&ToolDescriptor> {
        self.tools.get(&(alias.to_string(), tool.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
