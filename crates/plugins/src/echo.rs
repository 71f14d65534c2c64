//! Echo plugin — a trivial diagnostic capability.
//!
//! Useful for smoke-testing the full enqueue→plan→execute path without
//! touching the filesystem or a shell.

use async_trait::async_trait;
use forgeloop_core::error::PluginError;
use forgeloop_core::plugin::{OperationSpec, Plugin, PluginKind, PluginOutput};

pub struct EchoPlugin;

#[async_trait]
impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        "echo"
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Tool
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![OperationSpec {
            name: "say".into(),
            description: "Echo the given text back.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "The text to echo"
                    }
                },
                "required": ["text"]
            }),
        }]
    }

    async fn execute(
        &self,
        operation: &str,
        arguments: serde_json::Value,
    ) -> Result<PluginOutput, PluginError> {
        if operation != "say" {
            return Err(PluginError::OperationNotFound {
                plugin: "echo".into(),
                operation: operation.into(),
            });
        }

        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| PluginError::InvalidArguments("Missing 'text' argument".into()))?;

        Ok(PluginOutput::text(text))
    }
}
