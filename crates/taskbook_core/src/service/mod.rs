//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository, registry and artifact store calls into the task
//!   document workflow.
//! - Keep HTTP/CLI layers decoupled from storage details.

pub mod error;
pub mod snapshot;
pub mod workflow;
