//! Core types and error definitions for the Standor orchestration system.
//!
//! This crate provides the foundational vocabulary shared by the agent,
//! recovery, and orchestrator crates: error handling, capability tags for
//! agents and tasks, the flattened task descriptor handed to workers, and
//! the message envelope used for agent ↔ orchestrator communication.
//!
//! # Main types
//!
//! - [`StandorError`] — Unified error enum for all Standor subsystems.
//! - [`StandorResult`] — Convenience alias for `Result<T, StandorError>`.
//! - [`AgentKind`] / [`TaskKind`] — Capability tags plus the static
//!   compatibility table between them.
//! - [`AgentStatus`] — The agent lifecycle state machine.
//! - [`TaskDescriptor`] — The flattened work item an agent executes.
//! - [`AgentMessage`] / [`MessagePayload`] — The communication envelope and
//!   its closed set of payloads.

/// Capability tags and agent lifecycle states.
pub mod kinds;
/// Agent ↔ orchestrator message envelope.
pub mod message;
/// Flattened task descriptors and task-ID generation.
pub mod task;

pub use kinds::{AgentKind, AgentStatus, TaskKind};
pub use message::{AgentMessage, MessagePayload};
pub use task::{generate_task_id, TaskDescriptor};

/// Top-level error type for the Standor system.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum StandorError {
    /// An error originating from an agent's worker loop or lifecycle.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from the orchestrator engine or scheduler.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// An error from checkpointing or state recovery.
    #[error("Recovery error: {0}")]
    Recovery(String),

    /// An error in task bookkeeping (unknown ID, illegal transition).
    #[error("Task error: {0}")]
    Task(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`StandorError`].
pub type StandorResult<T> = Result<T, StandorError>;
