//! Plugin trait — the abstraction over capability providers.
//!
//! Plugins are what give the worker the ability to act in the world:
//! run shell commands, read/write files, etc. Each plugin exposes one or
//! more named operations, each with a JSON-Schema parameter description
//! consumed by the engine's validation phase and by the planner's tool
//! manifest.
//!
//! Discovery is an explicit registration table of constructors supplied
//! at startup — no runtime module scanning. A constructor that errors is
//! logged and skipped; it never aborts the load of the remaining
//! providers.

use crate::error::PluginError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Category tag for a plugin. Names are unique within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Acts on the outside world (files, processes, network).
    Tool,
    /// Reasoning helpers layered on the LLM capability.
    Cognitive,
    /// Storage-backed capabilities.
    Memory,
}

/// One operation a plugin exposes.
///
/// `parameters` is an object-typed JSON-Schema subset:
/// `{"type": "object", "properties": {...}, "required": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The result of a plugin operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginOutput {
    /// Whether the operation succeeded.
    pub success: bool,

    /// Human-readable output text.
    pub output: String,

    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl PluginOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }
}

/// An entry in the tool manifest handed to the planner: one operation of
/// one plugin, flattened for LLM consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolManifestEntry {
    pub tool_name: String,
    pub operation: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The core Plugin trait.
///
/// Each provider (filesystem, shell, ...) implements this trait and is
/// registered in the `PluginRegistry` at startup.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique name within this plugin's kind (e.g., "filesystem").
    fn name(&self) -> &str;

    /// Category tag.
    fn kind(&self) -> PluginKind;

    /// Semantic version string.
    fn version(&self) -> &str;

    /// The operations this plugin exposes, with parameter schemas.
    fn operations(&self) -> Vec<OperationSpec>;

    /// Execute a named operation with validated arguments.
    async fn execute(
        &self,
        operation: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<PluginOutput, PluginError>;
}

/// A provider constructor for the init-time registration table.
pub type PluginConstructor = fn() -> std::result::Result<Box<dyn Plugin>, PluginError>;

/// A registry of loaded plugins, bucketed by kind.
///
/// The engine uses this to:
/// 1. Build the tool manifest sent to the planner
/// 2. Look up operation schemas during validation
/// 3. Dispatch validated steps to the owning plugin
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    by_kind: HashMap<PluginKind, Vec<Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            by_kind: HashMap::new(),
        }
    }

    /// Load plugins from a registration table.
    ///
    /// A constructor that errors, or a duplicate name within a kind, is
    /// logged and skipped — the remaining providers still load. Returns
    /// the errors encountered so callers can surface them in diagnostics.
    pub fn load(constructors: &[PluginConstructor]) -> (Self, Vec<PluginError>) {
        let mut registry = Self::new();
        let mut errors = Vec::new();

        for construct in constructors {
            match construct() {
                Ok(plugin) => {
                    if let Err(e) = registry.register(plugin.into()) {
                        warn!(error = %e, "Skipping plugin");
                        errors.push(e);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Plugin constructor failed, skipping");
                    errors.push(e);
                }
            }
        }

        info!(count = registry.plugins.len(), "Plugin registry loaded");
        (registry, errors)
    }

    /// Register a single plugin. Rejects duplicate names within a kind.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> std::result::Result<(), PluginError> {
        let kind = plugin.kind();
        let name = plugin.name().to_string();

        if self
            .by_kind
            .get(&kind)
            .is_some_and(|v| v.iter().any(|p| p.name() == name))
        {
            return Err(PluginError::DuplicateName(name));
        }

        info!(name = %name, version = %plugin.version(), ?kind, "Registered plugin");
        self.by_kind.entry(kind).or_default().push(plugin.clone());
        self.plugins.push(plugin);
        Ok(())
    }

    /// Get a plugin by name, searching across all kinds in registration order.
    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// All plugins of the given kind.
    pub fn get_by_kind(&self, kind: PluginKind) -> Vec<&dyn Plugin> {
        self.by_kind
            .get(&kind)
            .map(|v| v.iter().map(|p| p.as_ref()).collect())
            .unwrap_or_default()
    }

    /// Resolve one operation of one plugin, or `None` if either is unknown.
    pub fn find_operation(&self, tool_name: &str, operation: &str) -> Option<OperationSpec> {
        self.get(tool_name)?
            .operations()
            .into_iter()
            .find(|op| op.name == operation)
    }

    /// The flattened operation manifest for the planner.
    pub fn manifest(&self) -> Vec<ToolManifestEntry> {
        self.plugins
            .iter()
            .flat_map(|p| {
                let tool_name = p.name().to_string();
                p.operations().into_iter().map(move |op| ToolManifestEntry {
                    tool_name: tool_name.clone(),
                    operation: op.name,
                    description: op.description,
                    parameters: op.parameters,
                })
            })
            .collect()
    }

    /// List all registered plugin names.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
