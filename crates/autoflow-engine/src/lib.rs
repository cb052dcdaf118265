//! # Autoflow Engine
//! Trigger matching, enrollment, and action dispatch.
//!
//! ```text
//! event ──▶ triggers ──▶ WorkflowEngine ──▶ steps interpreter
//!                             │                   │
//!                             │             HandlerRegistry
//!                             └──▶ DelayQueue (delayed leaves)
//! ```
//!
//! The condition evaluator and step interpreter are pure; the engine owns
//! the store and handler registry and is wired to the delay queue by the
//! host process.

pub mod conditions;
pub mod context;
pub mod engine;
pub mod handlers;
pub mod steps;
pub mod triggers;

pub use context::TriggerContext;
pub use engine::WorkflowEngine;
pub use handlers::{ActionHandler, HandlerRegistry};
pub use steps::{ActionStep, FailurePolicy};
