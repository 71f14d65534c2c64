//! Planner trait — the abstraction over the LLM planning capability.
//!
//! A Planner turns an instruction plus the registry's operation manifest
//! into an ordered list of plan steps, and repairs a step's arguments
//! when they fail validation. The repair is a bounded, pure
//! arguments-for-arguments transformation: the engine issues at most one
//! repair per step and re-validates the result once.
//!
//! Implementations: OpenAI-compatible HTTP endpoints, deterministic stubs
//! for tests and offline runs.

use crate::error::PlannerError;
use crate::plugin::ToolManifestEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where a step currently stands in the validation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationState {
    /// Fresh from the planner, not yet checked.
    Unvalidated,
    /// Passed schema checks on the first attempt.
    Valid,
    /// Passed schema checks after the single repair.
    Repaired,
    /// Still invalid after repair; the plan fails here.
    Rejected,
}

/// One tool invocation in a plan.
///
/// Scoped to a single engine run; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Name of the plugin to invoke.
    pub tool_name: String,

    /// Name of the operation on that plugin.
    pub method_name: String,

    /// Arguments as a JSON object.
    #[serde(default)]
    pub arguments: serde_json::Value,

    #[serde(default = "default_validation_state")]
    pub validation_state: ValidationState,
}

fn default_validation_state() -> ValidationState {
    ValidationState::Unvalidated
}

impl PlanStep {
    pub fn new(
        tool_name: impl Into<String>,
        method_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            method_name: method_name.into(),
            arguments,
            validation_state: ValidationState::Unvalidated,
        }
    }
}

/// A structured repair request: the offending step plus the validation
/// error, everything the planner needs to produce corrected arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairRequest {
    pub tool_name: String,
    pub method_name: String,

    /// The arguments that failed validation.
    pub arguments: serde_json::Value,

    /// The validation error text.
    pub error: String,

    /// The operation's parameter schema.
    pub parameters_schema: serde_json::Value,

    /// The original instruction, for context.
    pub instruction: String,
}

/// The core Planner trait.
///
/// The engine calls `plan()` once per task and `repair()` at most once
/// per step, without knowing which backend is answering.
#[async_trait]
pub trait Planner: Send + Sync {
    /// A human-readable name for this planner (e.g., "openai-compat").
    fn name(&self) -> &str;

    /// Produce an ordered list of steps for the instruction, choosing
    /// from the operations in the manifest.
    async fn plan(
        &self,
        instruction: &str,
        manifest: &[ToolManifestEntry],
    ) -> std::result::Result<Vec<PlanStep>, PlannerError>;

    /// Produce corrected arguments for a step that failed validation.
    ///
    /// Returns the replacement arguments object only; the engine owns
    /// re-validation and the one-repair bound.
    async fn repair(
        &self,
        request: RepairRequest,
    ) -> std::result::Result<serde_json::Value, PlannerError>;
}
