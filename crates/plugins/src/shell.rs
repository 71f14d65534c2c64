//! Shell plugin — run system commands under an allowlist.

use async_trait::async_trait;
use forgeloop_core::error::PluginError;
use forgeloop_core::plugin::{OperationSpec, Plugin, PluginKind, PluginOutput};
use tokio::process::Command;
use tracing::{debug, warn};

/// Execute shell commands with an optional command allowlist.
pub struct ShellPlugin {
    /// If non-empty, only these base commands are allowed.
    allowed_commands: Vec<String>,
}

impl ShellPlugin {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self { allowed_commands }
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }
        let base = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base)
    }
}

#[async_trait]
impl Plugin for ShellPlugin {
    fn name(&self) -> &str {
        "shell"
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Tool
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![OperationSpec {
            name: "run_command".into(),
            description:
                "Execute a shell command and return stdout/stderr. Use for running programs, \
                 checking files, git operations, etc."
                    .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    }
                },
                "required": ["command"]
            }),
        }]
    }

    async fn execute(
        &self,
        operation: &str,
        arguments: serde_json::Value,
    ) -> Result<PluginOutput, PluginError> {
        if operation != "run_command" {
            return Err(PluginError::OperationNotFound {
                plugin: "shell".into(),
                operation: operation.into(),
            });
        }

        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| PluginError::InvalidArguments("Missing 'command' argument".into()))?;

        if !self.is_command_allowed(command) {
            return Err(PluginError::Execution {
                plugin: "shell".into(),
                operation: "run_command".into(),
                reason: format!(
                    "command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %command, "Executing shell command");

        let output = if cfg!(target_os = "windows") {
            Command::new("cmd").args(["/C", command]).output().await
        } else {
            Command::new("sh").args(["-c", command]).output().await
        };

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let success = output.status.success();

                let text = if success {
                    if stderr.is_empty() {
                        stdout
                    } else {
                        format!("{stdout}\n[stderr]: {stderr}")
                    }
                } else {
                    let code = output.status.code().unwrap_or(-1);
                    warn!(command = %command, exit_code = code, "Command failed");
                    format!("[exit code: {code}]\n{stdout}\n{stderr}")
                };

                Ok(PluginOutput {
                    success,
                    output: text.trim().to_string(),
                    data: None,
                })
            }
            Err(e) => Err(PluginError::Execution {
                plugin: "shell".into(),
                operation: "run_command".into(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_check() {
        let plugin = ShellPlugin::new(vec!["ls".into(), "cat".into(), "git".into()]);
        assert!(plugin.is_command_allowed("ls -la"));
        assert!(plugin.is_command_allowed("git status"));
        assert!(!plugin.is_command_allowed("rm -rf /"));
        assert!(!plugin.is_command_allowed("sudo anything"));
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let plugin = ShellPlugin::new(vec![]);
        assert!(plugin.is_command_allowed("anything goes"));
    }

    #[tokio::test]
    async fn run_echo() {
        let plugin = ShellPlugin::new(vec![]);
        let result = plugin
            .execute("run_command", serde_json::json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("hello"));
    }

    #[tokio::test]
    async fn blocked_command() {
        let plugin = ShellPlugin::new(vec!["ls".into()]);
        let result = plugin
            .execute("run_command", serde_json::json!({"command": "rm -rf /"}))
            .await;
        assert!(matches!(result, Err(PluginError::Execution { .. })));
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let plugin = ShellPlugin::new(vec![]);
        let result = plugin
            .execute("run_command", serde_json::json!({"command": "exit 3"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("exit code: 3"));
    }
}
