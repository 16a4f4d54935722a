use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use standor_core::AgentStatus;

/// Metrics recorded for a single task execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetrics {
    /// Canonical ID of the executed task.
    pub task_id: String,
    /// When execution began.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
    /// Whether the executor returned successfully.
    pub success: bool,
    /// Failure description, set only when `success` is false.
    pub error_message: Option<String>,
    /// Tokens consumed, if the executor reported any.
    pub tokens_used: u64,
    /// Cost incurred, if the executor reported any.
    pub cost: f64,
    /// Quality score, if the executor reported one.
    pub quality_score: f64,
}

/// Rolling performance counters for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Tasks finished successfully.
    pub tasks_completed: u64,
    /// Tasks that failed.
    pub tasks_failed: u64,
    /// Total seconds spent in successful executions.
    pub total_processing_secs: f64,
    /// Mean duration of successful executions.
    pub average_processing_secs: f64,
    /// `completed / attempted`; 1.0 before any attempt.
    pub success_rate: f64,
    /// Cumulative tokens reported by the executor.
    pub tokens_used: u64,
    /// Cumulative cost reported by the executor.
    pub total_cost: f64,
    /// Timestamp of the most recent attempt (success or failure).
    pub last_activity: DateTime<Utc>,
}

impl Default for PerformanceStats {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            tasks_failed: 0,
            total_processing_secs: 0.0,
            average_processing_secs: 0.0,
            success_rate: 1.0,
            tokens_used: 0,
            total_cost: 0.0,
            last_activity: Utc::now(),
        }
    }
}

impl PerformanceStats {
    /// Fold a successful attempt into the counters.
    pub fn record_success(&mut self, duration_secs: f64, tokens: u64, cost: f64) {
        self.tasks_completed += 1;
        self.total_processing_secs += duration_secs;
        self.average_processing_secs = self.total_processing_secs / self.tasks_completed as f64;
        self.tokens_used += tokens;
        self.total_cost += cost;
        self.last_activity = Utc::now();
        self.recompute_success_rate();
    }

    /// Fold a failed attempt into the counters.
    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
        self.last_activity = Utc::now();
        self.recompute_success_rate();
    }

    fn recompute_success_rate(&mut self) {
        let attempted = self.tasks_completed + self.tasks_failed;
        if attempted > 0 {
            self.success_rate = self.tasks_completed as f64 / attempted as f64;
        }
    }
}

/// A point-in-time health assessment of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// The assessed agent's ID.
    pub agent_id: String,
    /// The agent's status at assessment time.
    pub status: AgentStatus,
    /// Composite health score in `[0.0, 1.0]`.
    pub health_score: f64,
    /// Seconds since the worker last stamped its heartbeat.
    pub seconds_since_heartbeat: f64,
    /// Current consecutive-error count.
    pub error_count: u32,
    /// The configured error ceiling.
    pub max_errors: u32,
    /// Rolling success rate.
    pub success_rate: f64,
    /// Whether the heartbeat is within the liveness window.
    pub is_responsive: bool,
    /// Finish time of the most recent successful task, if any.
    pub last_task_completed_at: Option<DateTime<Utc>>,
}

/// Liveness window for the responsiveness check, in seconds.
pub(crate) const RESPONSIVE_WINDOW_SECS: f64 = 300.0;

/// Composite health score: errors take up to half the score, success rate
/// scales the remainder, and a stale heartbeat halves the result.
pub(crate) fn health_score(
    error_count: u32,
    max_errors: u32,
    success_rate: f64,
    seconds_since_heartbeat: f64,
) -> f64 {
    let mut score = 1.0;
    if max_errors > 0 {
        score -= (f64::from(error_count) / f64::from(max_errors)) * 0.5;
    }
    score *= success_rate;
    if seconds_since_heartbeat > RESPONSIVE_WINDOW_SECS {
        score *= 0.5;
    }
    score.max(0.0)
}
