//! # Autoflow DB
//! Durable persistence for workflows, enrollments, scheduled executions,
//! jobs, and job logs.
//!
//! The engine, queue, and orchestrator all talk to `Arc<dyn WorkflowStore>`;
//! `SqliteStore` is the bundled backend (file-based or in-memory for tests).

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteStore;
pub use store::WorkflowStore;
