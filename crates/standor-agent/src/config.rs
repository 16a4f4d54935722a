use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Worker loop polling interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive-failure ceiling before the agent flips to `Error`.
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
    /// Bound on how long `stop()` waits for the worker to finish, in
    /// milliseconds; past it the in-flight task is abandoned.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Whether the agent self-heals out of `Error` (clear queue, reset
    /// counter, return to idle) instead of staying down.
    #[serde(default = "default_recovery_enabled")]
    pub recovery_enabled: bool,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_max_errors() -> u32 {
    5
}

fn default_stop_timeout_ms() -> u64 {
    10_000
}

fn default_recovery_enabled() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_errors: default_max_errors(),
            stop_timeout_ms: default_stop_timeout_ms(),
            recovery_enabled: default_recovery_enabled(),
        }
    }
}

impl AgentConfig {
    /// Polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Stop timeout as a [`Duration`].
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
