//! The plan-execute engine.
//!
//! Drives one task through `Received → Planning → Validating →
//! (Repairing) → Executing → {Completed, Failed}`:
//!
//! 1. **Planning** — the planner turns the instruction and the registry's
//!    operation manifest into an ordered list of steps.
//! 2. **Validating** — each step's arguments are checked against the
//!    target operation's parameter schema, in order. An unknown
//!    tool/operation is a terminal validation error: tool identity is
//!    never something a repair should guess.
//! 3. **Repairing** — a step that fails validation gets exactly one
//!    repair request; the corrected arguments are re-validated once.
//!    Still invalid means the whole plan fails with the validation
//!    detail. The one-repair bound is an invariant, not a tunable.
//! 4. **Executing** — the validated step is dispatched to its plugin and
//!    the output appended to an ordered result log. An execution error
//!    aborts the remaining steps and fails the plan, carrying the
//!    partial log.

pub mod validate;

use forgeloop_core::error::EngineError;
use forgeloop_core::planner::{Planner, RepairRequest, ValidationState};
use forgeloop_core::plugin::PluginRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validate::validate_arguments;

/// The engine's pipeline states, for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Received,
    Planning,
    Validating,
    Repairing,
    Executing,
    Completed,
    Failed,
}

/// Per-task execution state, created fresh for each claimed task and
/// passed by reference — never a process-global.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub task_id: i64,
    pub session_id: String,
    pub instruction: String,
}

impl ExecutionContext {
    /// Build a context with a fresh session identifier.
    pub fn new(task_id: i64, instruction: impl Into<String>) -> Self {
        Self {
            task_id,
            session_id: Uuid::new_v4().to_string(),
            instruction: instruction.into(),
        }
    }
}

/// One executed (or attempted) step in the result log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Zero-based position in the plan.
    pub step: usize,

    pub tool_name: String,
    pub method_name: String,

    /// The arguments that were actually executed.
    pub arguments: serde_json::Value,

    pub validation_state: ValidationState,

    /// The original arguments, present only when a repair replaced them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_arguments: Option<serde_json::Value>,

    /// The validation error that triggered the repair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,

    /// The plugin's output text.
    pub output: String,
}

/// The explicit outcome of one engine run. Both arms carry the ordered
/// result log, so a failure still exposes the partially executed steps.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    Completed { results: Vec<StepRecord> },
    Failed {
        error: EngineError,
        results: Vec<StepRecord>,
    },
}

impl EngineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, EngineOutcome::Completed { .. })
    }

    pub fn results(&self) -> &[StepRecord] {
        match self {
            EngineOutcome::Completed { results } | EngineOutcome::Failed { results, .. } => results,
        }
    }
}

/// The plan-execute engine. Stateless across tasks: all per-task state
/// lives in the `ExecutionContext` and run-local variables.
pub struct Engine {
    registry: Arc<PluginRegistry>,
    planner: Arc<dyn Planner>,
}

impl Engine {
    pub fn new(registry: Arc<PluginRegistry>, planner: Arc<dyn Planner>) -> Self {
        Self { registry, planner }
    }

    /// Run one task through the pipeline.
    pub async fn run(&self, ctx: &ExecutionContext) -> EngineOutcome {
        info!(
            task_id = ctx.task_id,
            session_id = %ctx.session_id,
            "Engine run started"
        );

        debug!(task_id = ctx.task_id, state = ?EngineState::Planning, "State transition");
        let manifest = self.registry.manifest();
        let steps = match self.planner.plan(&ctx.instruction, &manifest).await {
            Ok(steps) => steps,
            Err(e) => {
                warn!(task_id = ctx.task_id, error = %e, "Planning failed");
                return EngineOutcome::Failed {
                    error: EngineError::Planning(e.to_string()),
                    results: Vec::new(),
                };
            }
        };

        debug!(
            task_id = ctx.task_id,
            step_count = steps.len(),
            "Plan received"
        );

        let mut results: Vec<StepRecord> = Vec::with_capacity(steps.len());

        for (index, mut step) in steps.into_iter().enumerate() {
            debug!(
                task_id = ctx.task_id,
                step = index,
                tool = %step.tool_name,
                method = %step.method_name,
                state = ?EngineState::Validating,
                "State transition"
            );

            let Some(spec) = self
                .registry
                .find_operation(&step.tool_name, &step.method_name)
            else {
                warn!(
                    task_id = ctx.task_id,
                    step = index,
                    tool = %step.tool_name,
                    method = %step.method_name,
                    "Unknown operation, plan failed"
                );
                return EngineOutcome::Failed {
                    error: EngineError::UnknownOperation {
                        step: index,
                        tool: step.tool_name,
                        method: step.method_name,
                    },
                    results,
                };
            };

            let mut rejected_arguments = None;
            let mut validation_error = None;

            match validate_arguments(&step.arguments, &spec.parameters) {
                Ok(()) => step.validation_state = ValidationState::Valid,
                Err(detail) => {
                    debug!(
                        task_id = ctx.task_id,
                        step = index,
                        state = ?EngineState::Repairing,
                        "State transition"
                    );
                    warn!(
                        task_id = ctx.task_id,
                        step = index,
                        error = %detail,
                        "Validation failed, issuing single repair request"
                    );

                    let request = RepairRequest {
                        tool_name: step.tool_name.clone(),
                        method_name: step.method_name.clone(),
                        arguments: step.arguments.clone(),
                        error: detail.clone(),
                        parameters_schema: spec.parameters.clone(),
                        instruction: ctx.instruction.clone(),
                    };

                    let repaired = match self.planner.repair(request).await {
                        Ok(args) => args,
                        Err(e) => {
                            return EngineOutcome::Failed {
                                error: EngineError::Validation {
                                    step: index,
                                    detail: format!("{detail} (repair request failed: {e})"),
                                },
                                results,
                            };
                        }
                    };

                    // Re-validate once. No second repair attempt, ever.
                    match validate_arguments(&repaired, &spec.parameters) {
                        Ok(()) => {
                            rejected_arguments =
                                Some(std::mem::replace(&mut step.arguments, repaired));
                            validation_error = Some(detail);
                            step.validation_state = ValidationState::Repaired;
                            info!(
                                task_id = ctx.task_id,
                                step = index,
                                "Repair accepted, proceeding with corrected arguments"
                            );
                        }
                        Err(second_detail) => {
                            warn!(
                                task_id = ctx.task_id,
                                step = index,
                                error = %second_detail,
                                "Repair still invalid, plan failed"
                            );
                            return EngineOutcome::Failed {
                                error: EngineError::Validation {
                                    step: index,
                                    detail: second_detail,
                                },
                                results,
                            };
                        }
                    }
                }
            }

            debug!(
                task_id = ctx.task_id,
                step = index,
                state = ?EngineState::Executing,
                "State transition"
            );

            // The plugin must exist: find_operation resolved through it.
            let Some(plugin) = self.registry.get(&step.tool_name) else {
                return EngineOutcome::Failed {
                    error: EngineError::UnknownOperation {
                        step: index,
                        tool: step.tool_name,
                        method: step.method_name,
                    },
                    results,
                };
            };

            match plugin.execute(&step.method_name, step.arguments.clone()).await {
                Ok(output) => {
                    debug!(
                        task_id = ctx.task_id,
                        step = index,
                        success = output.success,
                        "Step executed"
                    );
                    results.push(StepRecord {
                        step: index,
                        tool_name: step.tool_name,
                        method_name: step.method_name,
                        arguments: step.arguments,
                        validation_state: step.validation_state,
                        rejected_arguments,
                        validation_error,
                        output: output.output,
                    });
                }
                Err(e) => {
                    warn!(
                        task_id = ctx.task_id,
                        step = index,
                        error = %e,
                        "Execution error, aborting remaining steps"
                    );
                    return EngineOutcome::Failed {
                        error: EngineError::Execution {
                            step: index,
                            reason: e.to_string(),
                        },
                        results,
                    };
                }
            }
        }

        info!(
            task_id = ctx.task_id,
            steps = results.len(),
            state = ?EngineState::Completed,
            "Engine run completed"
        );
        EngineOutcome::Completed { results }
    }
}
