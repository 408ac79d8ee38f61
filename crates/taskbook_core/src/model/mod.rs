//! Domain model for the task document review pipeline.
//!
//! # Responsibility
//! - Define the canonical records used by workflow orchestration.
//! - Keep the composite review state (two flags + admin status) explicit.
//!
//! # Invariants
//! - Every task document belongs to exactly one project.
//! - Documents are reset, never hard-deleted.

pub mod actor;
pub mod task_document;
