//! OpenAI-compatible planner implementation.
//!
//! Works with any endpoint exposing `/v1/chat/completions`: OpenAI,
//! OpenRouter, Ollama, vLLM, and friends. The planner asks for a strict
//! JSON plan over the registry's operation manifest; repairs send the
//! offending arguments, the validation error, and the operation schema
//! and expect a corrected arguments object back.

use crate::parse::extract_json_object;
use async_trait::async_trait;
use forgeloop_core::error::PlannerError;
use forgeloop_core::planner::{PlanStep, Planner, RepairRequest};
use forgeloop_core::plugin::ToolManifestEntry;
use serde::Deserialize;
use tracing::{debug, warn};

/// A planner backed by an OpenAI-compatible chat completion endpoint.
pub struct OpenAiCompatPlanner {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatPlanner {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.2,
            client,
        }
    }

    /// Create an Ollama planner (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Self {
        Self::new(
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            model,
        )
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn planning_prompt(instruction: &str, manifest: &[ToolManifestEntry]) -> String {
        let manifest_json =
            serde_json::to_string_pretty(manifest).unwrap_or_else(|_| "[]".into());
        format!(
            "You are a task planner. Break the instruction into an ordered list \
             of tool invocations chosen from the available operations.\n\
             \n\
             INSTRUCTION:\n{instruction}\n\
             \n\
             AVAILABLE OPERATIONS:\n{manifest_json}\n\
             \n\
             REQUIREMENTS:\n\
             1. Each step must be one atomic invocation of a listed operation.\n\
             2. Use `tool_name` and `method_name` exactly as listed.\n\
             3. `arguments` must satisfy the operation's parameter schema.\n\
             4. Answer with ONLY this JSON, no markdown:\n\
             {{\"steps\": [{{\"tool_name\": \"...\", \"method_name\": \"...\", \"arguments\": {{}}}}]}}\n"
        )
    }

    fn repair_prompt(request: &RepairRequest) -> String {
        format!(
            "The arguments for a tool invocation failed validation. Produce a \
             corrected arguments object.\n\
             \n\
             INSTRUCTION:\n{instruction}\n\
             \n\
             TOOL: {tool}.{method}\n\
             PARAMETER SCHEMA:\n{schema}\n\
             \n\
             REJECTED ARGUMENTS:\n{arguments}\n\
             \n\
             VALIDATION ERROR:\n{error}\n\
             \n\
             Answer with ONLY this JSON, no markdown:\n\
             {{\"arguments\": {{...}}}}\n",
            instruction = request.instruction,
            tool = request.tool_name,
            method = request.method_name,
            schema = request.parameters_schema,
            arguments = request.arguments,
            error = request.error,
        )
    }

    /// One user-prompt chat completion, returning the reply text.
    async fn chat(&self, prompt: &str) -> Result<String, PlannerError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "stream": false,
        });

        debug!(model = %self.model, "Sending planner request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PlannerError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(PlannerError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(PlannerError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Planner endpoint returned error");
            return Err(PlannerError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| PlannerError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PlannerError::InvalidResponse("no choices in response".into()))?;

        Ok(content)
    }
}

#[async_trait]
impl Planner for OpenAiCompatPlanner {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn plan(
        &self,
        instruction: &str,
        manifest: &[ToolManifestEntry],
    ) -> Result<Vec<PlanStep>, PlannerError> {
        let prompt = Self::planning_prompt(instruction, manifest);
        let reply = self.chat(&prompt).await?;
        steps_from_reply(&reply)
    }

    async fn repair(&self, request: RepairRequest) -> Result<serde_json::Value, PlannerError> {
        let prompt = Self::repair_prompt(&request);
        let reply = self.chat(&prompt).await?;
        arguments_from_reply(&reply)
    }
}

/// Parse a plan reply into steps.
fn steps_from_reply(reply: &str) -> Result<Vec<PlanStep>, PlannerError> {
    let value = extract_json_object(reply).ok_or_else(|| {
        PlannerError::InvalidResponse(format!(
            "no JSON object in plan reply: {}",
            truncate(reply, 200)
        ))
    })?;

    let steps = value
        .get("steps")
        .and_then(|s| s.as_array())
        .ok_or_else(|| PlannerError::InvalidResponse("plan reply missing 'steps' array".into()))?;

    steps
        .iter()
        .map(|raw| {
            let tool_name = raw
                .get("tool_name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    PlannerError::InvalidResponse("plan step missing 'tool_name'".into())
                })?;
            let method_name = raw
                .get("method_name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    PlannerError::InvalidResponse("plan step missing 'method_name'".into())
                })?;
            let arguments = raw
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));
            Ok(PlanStep::new(tool_name, method_name, arguments))
        })
        .collect()
}

/// Parse a repair reply into a corrected arguments object.
///
/// Accepts `{"arguments": {...}}` as requested, or a bare arguments
/// object when the model skips the wrapper.
fn arguments_from_reply(reply: &str) -> Result<serde_json::Value, PlannerError> {
    let value = extract_json_object(reply).ok_or_else(|| {
        PlannerError::InvalidResponse(format!(
            "no JSON object in repair reply: {}",
            truncate(reply, 200)
        ))
    })?;

    match value.get("arguments") {
        Some(arguments) if arguments.is_object() => Ok(arguments.clone()),
        Some(_) => Err(PlannerError::InvalidResponse(
            "repair reply 'arguments' is not an object".into(),
        )),
        None => Ok(value),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// --- Wire types ---

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn steps_parse_from_clean_reply() {
        let reply = r#"{"steps": [
            {"tool_name": "filesystem", "method_name": "read_file", "arguments": {"path": "/etc/hosts"}},
            {"tool_name": "shell", "method_name": "run_command", "arguments": {"command": "ls"}}
        ]}"#;
        let steps = steps_from_reply(reply).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].tool_name, "filesystem");
        assert_eq!(steps[1].arguments["command"], "ls");
    }

    #[test]
    fn steps_parse_from_fenced_reply() {
        let reply = "Plan below.\n```json\n{\"steps\": [{\"tool_name\": \"echo\", \"method_name\": \"say\", \"arguments\": {\"text\": \"hi\"}}]}\n```";
        let steps = steps_from_reply(reply).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].method_name, "say");
    }

    #[test]
    fn step_without_arguments_defaults_to_empty_object() {
        let reply = r#"{"steps": [{"tool_name": "echo", "method_name": "say"}]}"#;
        let steps = steps_from_reply(reply).unwrap();
        assert_eq!(steps[0].arguments, json!({}));
    }

    #[test]
    fn missing_steps_array_rejected() {
        let err = steps_from_reply(r#"{"plan": []}"#).unwrap_err();
        assert!(matches!(err, PlannerError::InvalidResponse(_)));
    }

    #[test]
    fn prose_only_reply_rejected() {
        let err = steps_from_reply("I am unable to plan this.").unwrap_err();
        assert!(err.to_string().contains("no JSON object"));
    }

    #[test]
    fn step_missing_tool_name_rejected() {
        let err =
            steps_from_reply(r#"{"steps": [{"method_name": "say", "arguments": {}}]}"#).unwrap_err();
        assert!(err.to_string().contains("tool_name"));
    }

    #[test]
    fn repair_reply_with_wrapper() {
        let args = arguments_from_reply(r#"{"arguments": {"path": "/"}}"#).unwrap();
        assert_eq!(args, json!({"path": "/"}));
    }

    #[test]
    fn repair_reply_bare_object() {
        let args = arguments_from_reply(r#"{"path": "/corrected"}"#).unwrap();
        assert_eq!(args, json!({"path": "/corrected"}));
    }

    #[test]
    fn repair_reply_non_object_arguments_rejected() {
        let err = arguments_from_reply(r#"{"arguments": "not an object"}"#).unwrap_err();
        assert!(matches!(err, PlannerError::InvalidResponse(_)));
    }

    #[test]
    fn planning_prompt_mentions_operations() {
        let manifest = vec![ToolManifestEntry {
            tool_name: "filesystem".into(),
            operation: "read_file".into(),
            description: "Read a file".into(),
            parameters: json!({"type": "object"}),
        }];
        let prompt = OpenAiCompatPlanner::planning_prompt("read the config", &manifest);
        assert!(prompt.contains("read the config"));
        assert!(prompt.contains("read_file"));
        assert!(prompt.contains("\"steps\""));
    }

    #[test]
    fn repair_prompt_carries_error_and_schema() {
        let prompt = OpenAiCompatPlanner::repair_prompt(&RepairRequest {
            tool_name: "filesystem".into(),
            method_name: "read_file".into(),
            arguments: json!({"path": 123}),
            error: "field 'path' expected string, got number".into(),
            parameters_schema: json!({"type": "object", "required": ["path"]}),
            instruction: "read the config".into(),
        });
        assert!(prompt.contains("filesystem.read_file"));
        assert!(prompt.contains("expected string"));
        assert!(prompt.contains("required"));
    }
}
