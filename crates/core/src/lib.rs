//! # Forgeloop Core
//!
//! Domain types, traits, and error definitions for the Forgeloop
//! task-execution runtime. This crate defines the domain model that all
//! other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem boundary is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Testing every state machine against deterministic stubs
//! - A clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod planner;
pub mod plugin;
pub mod task;

// Re-export key types at crate root for ergonomics
pub use error::{EngineError, Error, PlannerError, PluginError, Result, StorageError};
pub use planner::{PlanStep, Planner, RepairRequest, ValidationState};
pub use plugin::{
    OperationSpec, Plugin, PluginConstructor, PluginKind, PluginOutput, PluginRegistry,
    ToolManifestEntry,
};
pub use task::{Task, TaskError, TaskStatus};
