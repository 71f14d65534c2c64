//! Planner implementations for Forgeloop.
//!
//! The engine talks to the `Planner` trait from `forgeloop-core`; this
//! crate provides the real backends.

pub mod openai_compat;
pub mod parse;

pub use openai_compat::OpenAiCompatPlanner;
pub use parse::extract_json_object;
