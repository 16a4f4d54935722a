use crate::registry::AgentRegistry;
use chrono::Utc;
use standor_core::AgentStatus;
use std::time::Duration;
use tracing::warn;

/// Heartbeat-staleness detection and the restart policy.
///
/// Two decoupled mechanisms: the heartbeat check is the coordinator's own
/// suspicion about a wedged worker (whose loop may be blocked inside an
/// executor and unable to notice anything), while an agent's internal error
/// ceiling is handled by the agent itself. The sweep only proposes restarts
/// for agents whose error count is still under the ceiling; the rest are
/// left in `Error` and surfaced for operator attention.
pub struct HealthMonitor {
    heartbeat_timeout: Duration,
    restart_ceiling: u32,
}

impl HealthMonitor {
    /// Create a monitor with the given staleness window and restart ceiling.
    pub fn new(heartbeat_timeout: Duration, restart_ceiling: u32) -> Self {
        Self {
            heartbeat_timeout,
            restart_ceiling,
        }
    }

    /// Flag every running agent whose heartbeat is older than the timeout.
    /// Returns how many agents were flagged.
    pub async fn check_heartbeats(&self, registry: &AgentRegistry) -> usize {
        let now = Utc::now();
        let mut flagged = 0;
        for agent in registry.all().await {
            let report = agent.status_report().await;
            if report.status != AgentStatus::Running {
                continue;
            }
            let stale = now - report.last_heartbeat;
            if stale.num_milliseconds() as u128 > self.heartbeat_timeout.as_millis() {
                warn!(
                    agent_id = %report.agent_id,
                    stale_secs = stale.num_seconds(),
                    "agent heartbeat timed out"
                );
                agent.flag_unresponsive().await;
                flagged += 1;
            }
        }
        flagged
    }

    /// IDs of errored agents still within the restart budget.
    pub async fn agents_needing_restart(&self, registry: &AgentRegistry) -> Vec<String> {
        let mut ids = Vec::new();
        for agent in registry.all().await {
            let report = agent.status_report().await;
            if report.status == AgentStatus::Error && report.error_count < self.restart_ceiling {
                ids.push(report.agent_id);
            }
        }
        ids.sort();
        ids
    }

    /// IDs of errored agents past the restart budget. These are never
    /// silently dropped — the caller keeps them visible in system status.
    pub async fn exhausted_agents(&self, registry: &AgentRegistry) -> Vec<String> {
        let mut ids = Vec::new();
        for agent in registry.all().await {
            let report = agent.status_report().await;
            if report.status == AgentStatus::Error && report.error_count >= self.restart_ceiling {
                ids.push(report.agent_id);
            }
        }
        ids.sort();
        ids
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use standor_agent::{AgentConfig, AgentHandle, TaskExecutor};
    use standor_core::{AgentKind, StandorResult, TaskDescriptor, TaskKind};
    use std::sync::Arc;

    /// Executor that blocks long enough to wedge the worker loop.
    struct WedgedExecutor;

    #[async_trait]
    impl TaskExecutor for WedgedExecutor {
        async fn process_task(&self, _task: &TaskDescriptor) -> StandorResult<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(serde_json::Value::Null)
        }
    }

    fn wedged_agent() -> Arc<AgentHandle> {
        Arc::new(AgentHandle::new(
            AgentKind::Discovery,
            "Physics",
            AgentConfig {
                poll_interval_ms: 10,
                stop_timeout_ms: 100,
                recovery_enabled: false,
                ..AgentConfig::default()
            },
            Box::new(WedgedExecutor),
        ))
    }

    #[tokio::test]
    async fn test_stale_running_agent_is_flagged() {
        let registry = AgentRegistry::new();
        let agent = wedged_agent();
        registry.insert(Arc::clone(&agent)).await;
        agent.start().await;
        agent
            .assign_task(TaskDescriptor::new(TaskKind::Discovery, "Physics"))
            .await;

        // Wait for the worker to pick the task up and wedge.
        for _ in 0..200 {
            if agent.current_status().await == AgentStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(agent.current_status().await, AgentStatus::Running);

        // The wedged worker stops stamping its heartbeat, so a tight
        // timeout trips on the next check.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let monitor = HealthMonitor::new(Duration::from_millis(100), 3);
        let flagged = monitor.check_heartbeats(&registry).await;
        assert_eq!(flagged, 1);
        assert_eq!(agent.current_status().await, AgentStatus::Error);
        assert_eq!(agent.error_count().await, 1);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_idle_agent_is_never_flagged() {
        let registry = AgentRegistry::new();
        let agent = wedged_agent();
        registry.insert(Arc::clone(&agent)).await;
        agent.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let monitor = HealthMonitor::new(Duration::from_millis(1), 3);
        assert_eq!(monitor.check_heartbeats(&registry).await, 0);
        assert_eq!(agent.current_status().await, AgentStatus::Idle);
        agent.stop().await;
    }

    #[tokio::test]
    async fn test_restart_budget_split() {
        let registry = AgentRegistry::new();
        let recoverable = wedged_agent();
        let exhausted = wedged_agent();
        registry.insert(Arc::clone(&recoverable)).await;
        registry.insert(Arc::clone(&exhausted)).await;

        recoverable.flag_unresponsive().await;
        for _ in 0..3 {
            exhausted.flag_unresponsive().await;
        }

        let monitor = HealthMonitor::new(Duration::from_secs(300), 3);
        let restart = monitor.agents_needing_restart(&registry).await;
        let stuck = monitor.exhausted_agents(&registry).await;

        assert_eq!(restart, vec![recoverable.id().to_string()]);
        assert_eq!(stuck, vec![exhausted.id().to_string()]);
    }
}
