use crate::board::TaskBoard;
use crate::registry::AgentRegistry;
use crate::types::TaskRecord;
use standor_agent::{AgentHandle, AgentStatusReport};
use standor_core::AgentStatus;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Score a candidate agent for a task: base 1.0, +2.0 for an exact category
/// match, plus the agent's success rate, minus 0.1 per recorded error,
/// floored at 0.1 so every compatible agent stays selectable.
pub fn score_agent(report: &AgentStatusReport, task: &TaskRecord) -> f64 {
    let mut score = 1.0;
    if report.category == task.category {
        score += 2.0;
    }
    score += report.stats.success_rate;
    score -= f64::from(report.error_count) * 0.1;
    score.max(0.1)
}

/// One greedy assignment pass.
///
/// Snapshots the agents that are idle with nothing queued or in flight,
/// then walks the pending queue in priority order, handing each task to the
/// highest-scoring compatible candidate. An agent receives at most one task
/// per pass; ties keep the first-seen candidate (stable agent-ID order).
/// Tasks with no compatible idle agent stay pending for the next pass.
/// Returns how many tasks were assigned.
pub async fn run_assignment_pass(board: &TaskBoard, registry: &AgentRegistry) -> usize {
    let mut candidates: Vec<(Arc<AgentHandle>, AgentStatusReport)> = Vec::new();
    for agent in registry.all().await {
        let report = agent.status_report().await;
        if report.status == AgentStatus::Idle
            && report.current_task.is_none()
            && report.queue_depth == 0
        {
            candidates.push((agent, report));
        }
    }
    if candidates.is_empty() {
        return 0;
    }
    candidates.sort_by(|a, b| a.1.agent_id.cmp(&b.1.agent_id));

    let mut assigned = 0;
    for task in board.pending_snapshot().await {
        if candidates.is_empty() {
            break;
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, (_, report)) in candidates.iter().enumerate() {
            if !report.kind.accepts(task.kind) {
                continue;
            }
            let score = score_agent(report, &task);
            if best.map_or(true, |(_, current)| score > current) {
                best = Some((index, score));
            }
        }
        let Some((index, score)) = best else {
            debug!(task_id = %task.id, kind = %task.kind, "no compatible idle agent this tick");
            continue;
        };

        let (agent, report) = candidates.remove(index);
        match board.begin(&task.id, &report.agent_id).await {
            Ok(descriptor) => {
                if agent.assign_task(descriptor).await {
                    info!(
                        task_id = %task.id,
                        agent_id = %report.agent_id,
                        score,
                        "task assigned"
                    );
                    assigned += 1;
                } else {
                    warn!(
                        task_id = %task.id,
                        agent_id = %report.agent_id,
                        "agent refused hand-off, returning task to queue"
                    );
                    if let Err(e) = board.release(&task.id).await {
                        warn!(task_id = %task.id, error = %e, "could not release refused task");
                    }
                }
            }
            Err(e) => {
                // The record left the pending queue between snapshot and
                // begin (e.g. cancelled); skip it.
                debug!(task_id = %task.id, error = %e, "task vanished before assignment");
            }
        }
    }
    assigned
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;
    use async_trait::async_trait;
    use standor_agent::{AgentConfig, TaskExecutor};
    use standor_core::{AgentKind, StandorResult, TaskDescriptor, TaskKind};
    use std::collections::HashMap;
    use std::time::Duration;

    /// Executor that parks forever, so assigned work stays visibly in
    /// flight.
    struct ParkedExecutor;

    #[async_trait]
    impl TaskExecutor for ParkedExecutor {
        async fn process_task(&self, _task: &TaskDescriptor) -> StandorResult<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(serde_json::Value::Null)
        }
    }

    fn fast_config() -> AgentConfig {
        AgentConfig {
            poll_interval_ms: 10,
            stop_timeout_ms: 200,
            ..AgentConfig::default()
        }
    }

    async fn idle_agent(kind: AgentKind, category: &str) -> Arc<AgentHandle> {
        let agent = Arc::new(AgentHandle::new(
            kind,
            category,
            fast_config(),
            Box::new(ParkedExecutor),
        ));
        agent.start().await;
        // Wait for the worker's first tick so the agent reports idle.
        for _ in 0..100 {
            if agent.current_status().await == AgentStatus::Idle {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        agent
    }

    fn task(kind: TaskKind, category: &str, priority: i32) -> TaskRecord {
        TaskRecord::new(kind, category, HashMap::new(), priority)
    }

    fn report_for(category: &str, success_rate: f64, errors: u32) -> AgentStatusReport {
        AgentStatusReport {
            agent_id: "agent".to_string(),
            kind: AgentKind::Discovery,
            category: category.to_string(),
            status: AgentStatus::Idle,
            current_task: None,
            queue_depth: 0,
            inbox_depth: 0,
            last_heartbeat: chrono::Utc::now(),
            error_count: errors,
            stats: standor_agent::PerformanceStats {
                success_rate,
                ..standor_agent::PerformanceStats::default()
            },
        }
    }

    #[test]
    fn test_score_rewards_category_match() {
        let task = task(TaskKind::Discovery, "Physics", 5);
        let matching = score_agent(&report_for("Physics", 1.0, 0), &task);
        let other = score_agent(&report_for("Biology", 1.0, 0), &task);
        assert_eq!(matching, 4.0);
        assert_eq!(other, 2.0);
    }

    #[test]
    fn test_score_penalizes_errors_with_floor() {
        let task = task(TaskKind::Discovery, "Physics", 5);
        let reliable = score_agent(&report_for("Biology", 1.0, 0), &task);
        let flaky = score_agent(&report_for("Biology", 1.0, 5), &task);
        assert!(flaky < reliable);

        let hopeless = score_agent(&report_for("Biology", 0.0, 50), &task);
        assert_eq!(hopeless, 0.1);
    }

    #[tokio::test]
    async fn test_category_match_wins_over_same_kind() {
        let registry = AgentRegistry::new();
        let biology = idle_agent(AgentKind::Discovery, "Biology").await;
        let physics = idle_agent(AgentKind::Discovery, "Physics").await;
        registry.insert(Arc::clone(&biology)).await;
        registry.insert(Arc::clone(&physics)).await;

        let board = TaskBoard::new();
        let id = board.add(task(TaskKind::Discovery, "Physics", 5)).await;

        let assigned = run_assignment_pass(&board, &registry).await;
        assert_eq!(assigned, 1);

        let record = board.get(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::InProgress);
        assert_eq!(record.assigned_agent.as_deref(), Some(physics.id()));

        biology.stop().await;
        physics.stop().await;
    }

    #[tokio::test]
    async fn test_incompatible_kind_stays_pending() {
        let registry = AgentRegistry::new();
        let validator = idle_agent(AgentKind::Validation, "Physics").await;
        registry.insert(Arc::clone(&validator)).await;

        let board = TaskBoard::new();
        let id = board.add(task(TaskKind::Discovery, "Physics", 5)).await;

        let assigned = run_assignment_pass(&board, &registry).await;
        assert_eq!(assigned, 0);
        assert_eq!(board.get(&id).await.unwrap().status, TaskStatus::Pending);

        validator.stop().await;
    }

    #[tokio::test]
    async fn test_one_task_per_agent_per_pass() {
        let registry = AgentRegistry::new();
        let solo = idle_agent(AgentKind::Discovery, "Physics").await;
        registry.insert(Arc::clone(&solo)).await;

        let board = TaskBoard::new();
        let urgent = board.add(task(TaskKind::Discovery, "Physics", 1)).await;
        let second = board.add(task(TaskKind::Discovery, "Physics", 2)).await;

        let assigned = run_assignment_pass(&board, &registry).await;
        assert_eq!(assigned, 1);
        assert_eq!(
            board.get(&urgent).await.unwrap().status,
            TaskStatus::InProgress
        );
        assert_eq!(
            board.get(&second).await.unwrap().status,
            TaskStatus::Pending
        );

        solo.stop().await;
    }

    #[tokio::test]
    async fn test_retrieval_agent_absorbs_processing_overflow() {
        let registry = AgentRegistry::new();
        let retrieval = idle_agent(AgentKind::Retrieval, "History").await;
        registry.insert(Arc::clone(&retrieval)).await;

        let board = TaskBoard::new();
        let id = board.add(task(TaskKind::Processing, "History", 5)).await;

        let assigned = run_assignment_pass(&board, &registry).await;
        assert_eq!(assigned, 1);
        assert_eq!(
            board.get(&id).await.unwrap().assigned_agent.as_deref(),
            Some(retrieval.id())
        );

        retrieval.stop().await;
    }
}
