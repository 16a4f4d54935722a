//! Checkpointing and crash-recovery persistence for Standor.
//!
//! Persists the orchestrator's state as JSON documents with SHA-256 content
//! hashes: a rolling `system_state.json` (with timestamped backups) plus
//! named checkpoints under `checkpoints/`, gzip-compressed once they age.
//! Restoration is always explicit; only [`RecoveryManager::repair_system_state`]
//! performs an autonomous newest-first search across checkpoints.
//!
//! Checkpointing is best-effort and non-transactional: there is no
//! consensus, no write-ahead log, and no exactly-once guarantee across
//! process restarts. Concurrent manual and auto saves are a known soft race,
//! mitigated only by each save being a full-file rewrite preceded by a
//! timestamped backup.
//!
//! # Main types
//!
//! - [`Checkpoint`] — The hashed checkpoint document.
//! - [`RecoveryManager`] — State file, backups, checkpoints, auto-save,
//!   integrity validation, and repair.
//! - [`RecoveryConfig`] — Intervals and retention knobs.

/// Checkpoint documents and content hashing.
pub mod checkpoint;
/// The recovery manager.
pub mod manager;

pub use checkpoint::{Checkpoint, CheckpointInfo, RecoveryMetrics};
pub use manager::{IntegrityReport, RecoveryConfig, RecoveryManager};
