//! Filesystem plugin — read and write files with path screening.

use async_trait::async_trait;
use forgeloop_core::error::PluginError;
use forgeloop_core::plugin::{OperationSpec, Plugin, PluginKind, PluginOutput};
use tracing::debug;

/// File access with forbidden path prefixes.
pub struct FilesystemPlugin {
    /// Paths starting with any of these prefixes are refused.
    forbidden_prefixes: Vec<String>,
}

impl FilesystemPlugin {
    /// Unrestricted access.
    pub fn new() -> Self {
        Self {
            forbidden_prefixes: Vec::new(),
        }
    }

    pub fn with_forbidden_prefixes(forbidden_prefixes: Vec<String>) -> Self {
        Self { forbidden_prefixes }
    }

    fn check_path(&self, path: &str) -> Result<(), PluginError> {
        if let Some(prefix) = self
            .forbidden_prefixes
            .iter()
            .find(|p| path.starts_with(p.as_str()))
        {
            return Err(PluginError::Execution {
                plugin: "filesystem".into(),
                operation: "path check".into(),
                reason: format!("path '{path}' is under forbidden prefix '{prefix}'"),
            });
        }
        Ok(())
    }

    fn string_arg(arguments: &serde_json::Value, name: &str) -> Result<String, PluginError> {
        arguments[name]
            .as_str()
            .map(String::from)
            .ok_or_else(|| PluginError::InvalidArguments(format!("Missing '{name}' argument")))
    }
}

impl Default for FilesystemPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for FilesystemPlugin {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Tool
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec {
                name: "read_file".into(),
                description: "Read the contents of a file at the given path.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "The file path to read"
                        }
                    },
                    "required": ["path"]
                }),
            },
            OperationSpec {
                name: "write_file".into(),
                description: "Write content to a file, creating parent directories.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "The file path to write"
                        },
                        "content": {
                            "type": "string",
                            "description": "The content to write"
                        }
                    },
                    "required": ["path", "content"]
                }),
            },
        ]
    }

    async fn execute(
        &self,
        operation: &str,
        arguments: serde_json::Value,
    ) -> Result<PluginOutput, PluginError> {
        match operation {
            "read_file" => {
                let path = Self::string_arg(&arguments, "path")?;
                self.check_path(&path)?;
                debug!(path = %path, "Reading file");

                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => Ok(PluginOutput::text(content)),
                    Err(e) => Ok(PluginOutput {
                        success: false,
                        output: format!("Failed to read file: {e}"),
                        data: None,
                    }),
                }
            }
            "write_file" => {
                let path = Self::string_arg(&arguments, "path")?;
                let content = Self::string_arg(&arguments, "content")?;
                self.check_path(&path)?;
                debug!(path = %path, bytes = content.len(), "Writing file");

                if let Some(parent) = std::path::Path::new(&path).parent() {
                    if !parent.as_os_str().is_empty() {
                        if let Err(e) = tokio::fs::create_dir_all(parent).await {
                            return Ok(PluginOutput {
                                success: false,
                                output: format!("Failed to create parent directory: {e}"),
                                data: None,
                            });
                        }
                    }
                }

                match tokio::fs::write(&path, &content).await {
                    Ok(()) => Ok(PluginOutput::text(format!(
                        "Wrote {} bytes to {path}",
                        content.len()
                    ))),
                    Err(e) => Ok(PluginOutput {
                        success: false,
                        output: format!("Failed to write file: {e}"),
                        data: None,
                    }),
                }
            }
            other => Err(PluginError::OperationNotFound {
                plugin: "filesystem".into(),
                operation: other.into(),
            }),
        }
    }
}
