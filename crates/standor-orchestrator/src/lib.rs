//! Multi-agent orchestration engine for standards processing.
//!
//! The orchestrator provisions a fleet of typed worker agents for a set of
//! categories, maintains the canonical prioritized task queue, assigns
//! pending tasks to the best-matching idle agent once per tick, watches
//! agent heartbeats and restarts unhealthy agents (bounded by a retry
//! ceiling), and checkpoints its state through
//! [`standor_recovery::RecoveryManager`].
//!
//! # Main types
//!
//! - [`Orchestrator`] — Top-level coordinator and main loop.
//! - [`TaskBoard`] — Canonical task records and their lifecycle.
//! - [`AgentRegistry`] — The live agent roster.
//! - [`HealthMonitor`] — Heartbeat-staleness detection and restart policy.
//! - [`OrchestratorConfig`] — Tick cadence, fleet sizing, retry knobs.
//! - [`SystemStatus`] — The aggregate status snapshot.

/// The canonical task board.
pub mod board;
/// Orchestrator configuration.
pub mod config;
/// The orchestrator engine and main loop.
pub mod engine;
/// Agent health checks and restart policy.
pub mod health;
/// The live agent roster.
pub mod registry;
/// The per-tick task assignment pass.
pub mod scheduler;
/// Task records, progress, and status snapshot types.
pub mod types;

pub use board::TaskBoard;
pub use config::OrchestratorConfig;
pub use engine::{ExecutorFactory, Orchestrator};
pub use health::HealthMonitor;
pub use registry::AgentRegistry;
pub use types::{
    AgentStatusEntry, CategoryProgress, CategoryStatus, SystemMetrics, SystemStatus, TaskCounts,
    TaskRecord, TaskStatus,
};
