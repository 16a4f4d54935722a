use serde::{Deserialize, Serialize};
use standor_agent::AgentConfig;
use std::time::Duration;

/// Tuning knobs for the orchestrator engine.
///
/// The defaults reproduce the production cadence (5s tick, 5-minute
/// heartbeat timeout, 15-minute checkpoints); tests shrink them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Main loop tick interval in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Sleep after a failed tick, in milliseconds.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Heartbeat staleness past which a running agent is suspected dead,
    /// in milliseconds.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// How many errors an agent may accumulate before restarts stop and the
    /// agent is left in `Error` for operator attention.
    #[serde(default = "default_restart_ceiling")]
    pub restart_ceiling: u32,
    /// Periodic checkpoint interval in seconds.
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,
    /// Consecutive-failure ceiling provisioned into each agent.
    #[serde(default = "default_agent_max_errors")]
    pub agent_max_errors: u32,
    /// Poll interval provisioned into each agent, in milliseconds.
    #[serde(default = "default_agent_poll_interval_ms")]
    pub agent_poll_interval_ms: u64,
    /// Stop-join timeout provisioned into each agent, in milliseconds.
    #[serde(default = "default_agent_stop_timeout_ms")]
    pub agent_stop_timeout_ms: u64,
    /// Retrieval agents shared across all categories.
    #[serde(default = "default_retrieval_pool")]
    pub retrieval_pool: usize,
    /// Upper bound on processing agents (actual count is `2 × categories`,
    /// capped here).
    #[serde(default = "default_processing_pool_cap")]
    pub processing_pool_cap: usize,
    /// Upper bound on validation agents (actual count is one per category,
    /// capped here).
    #[serde(default = "default_validation_pool_cap")]
    pub validation_pool_cap: usize,
    /// How many times a failed task is re-queued before it is marked
    /// FAILED. 0 means a failure is immediately terminal.
    #[serde(default)]
    pub max_task_retries: u32,
    /// Default per-task execution deadline in seconds, applied to tasks
    /// enqueued without one. `None` means unbounded.
    #[serde(default)]
    pub task_deadline_secs: Option<u64>,
}

fn default_tick_interval_ms() -> u64 {
    5_000
}

fn default_error_backoff_ms() -> u64 {
    10_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    300_000
}

fn default_restart_ceiling() -> u32 {
    3
}

fn default_checkpoint_interval_secs() -> u64 {
    900
}

fn default_agent_max_errors() -> u32 {
    3
}

fn default_agent_poll_interval_ms() -> u64 {
    1_000
}

fn default_agent_stop_timeout_ms() -> u64 {
    10_000
}

fn default_retrieval_pool() -> usize {
    20
}

fn default_processing_pool_cap() -> usize {
    15
}

fn default_validation_pool_cap() -> usize {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            restart_ceiling: default_restart_ceiling(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            agent_max_errors: default_agent_max_errors(),
            agent_poll_interval_ms: default_agent_poll_interval_ms(),
            agent_stop_timeout_ms: default_agent_stop_timeout_ms(),
            retrieval_pool: default_retrieval_pool(),
            processing_pool_cap: default_processing_pool_cap(),
            validation_pool_cap: default_validation_pool_cap(),
            max_task_retries: 0,
            task_deadline_secs: None,
        }
    }
}

impl OrchestratorConfig {
    /// Tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Error backoff as a [`Duration`].
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Heartbeat timeout as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Periodic checkpoint interval as a [`Duration`].
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    /// The [`AgentConfig`] provisioned into every agent this orchestrator
    /// creates.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            poll_interval_ms: self.agent_poll_interval_ms,
            max_errors: self.agent_max_errors,
            stop_timeout_ms: self.agent_stop_timeout_ms,
            recovery_enabled: true,
        }
    }
}
