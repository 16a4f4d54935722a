//! Worker agents for the Standor orchestration system.
//!
//! An agent is a unit of work execution: a typed capability
//! ([`standor_core::AgentKind`]), a private priority queue of task
//! descriptors, a message inbox, and a polling worker loop on its own tokio
//! task. The loop stamps a heartbeat every tick, dispatches inbox messages,
//! executes at most one task at a time through the pluggable
//! [`TaskExecutor`], and reports completions and failures to the coordinator
//! over an mpsc channel.
//!
//! # Main types
//!
//! - [`AgentHandle`] — Public agent contract: start/stop/assign/status.
//! - [`TaskExecutor`] — The plug-in seam concrete agents implement.
//! - [`AgentConfig`] — Poll interval, error ceiling, stop timeout.
//! - [`TaskMetrics`] / [`PerformanceStats`] — Per-attempt and rolling metrics.

/// Agent configuration.
pub mod config;
/// The executor plug-in trait.
pub mod executor;
/// Public agent handle and status reports.
pub mod handle;
/// Task execution metrics and rolling performance counters.
pub mod metrics;
/// The polling worker loop.
mod worker;

pub use config::AgentConfig;
pub use executor::TaskExecutor;
pub use handle::{generate_agent_id, AgentHandle, AgentStatusReport};
pub use metrics::{HealthMetrics, PerformanceStats, TaskMetrics};
