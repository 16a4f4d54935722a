//! Agent worker lifecycle tests: start/stop, execution order, failure
//! handling, the error ceiling, self-recovery, and the message protocol.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use standor_agent::{AgentConfig, AgentHandle, AgentStatusReport, TaskExecutor};
use standor_core::{
    AgentKind, AgentMessage, AgentStatus, MessagePayload, StandorError, StandorResult,
    TaskDescriptor, TaskKind,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Executor that succeeds and records the order tasks were processed in.
struct RecordingExecutor {
    seen: Arc<Mutex<Vec<String>>>,
}

impl RecordingExecutor {
    fn boxed() -> Box<Self> {
        Box::new(Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    async fn process_task(&self, task: &TaskDescriptor) -> StandorResult<serde_json::Value> {
        self.seen.lock().unwrap().push(task.task_id.clone());
        Ok(serde_json::json!({
            "documents": 2,
            "tokens_used": 150,
            "cost": 0.002,
            "quality_score": 0.9,
        }))
    }
}

/// Executor that always fails.
struct FailingExecutor;

#[async_trait]
impl TaskExecutor for FailingExecutor {
    async fn process_task(&self, task: &TaskDescriptor) -> StandorResult<serde_json::Value> {
        Err(StandorError::Task(format!(
            "simulated failure for {}",
            task.task_id
        )))
    }
}

/// Executor that never finishes on its own.
struct StuckExecutor;

#[async_trait]
impl TaskExecutor for StuckExecutor {
    async fn process_task(&self, _task: &TaskDescriptor) -> StandorResult<serde_json::Value> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(serde_json::Value::Null)
    }
}

fn fast_config() -> AgentConfig {
    AgentConfig {
        poll_interval_ms: 10,
        max_errors: 5,
        stop_timeout_ms: 1_000,
        recovery_enabled: true,
    }
}

/// Poll the agent's status report until the predicate holds.
async fn wait_for_report<F>(agent: &AgentHandle, predicate: F, timeout_ms: u64) -> bool
where
    F: Fn(&AgentStatusReport) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate(&agent.status_report().await) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Poll a synchronous condition until it holds.
async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn recv_report(
    rx: &mut mpsc::UnboundedReceiver<AgentMessage>,
    timeout_ms: u64,
) -> Option<AgentMessage> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn test_stop_leaves_agent_stopped() {
    let agent = AgentHandle::new(
        AgentKind::Discovery,
        "Physics",
        fast_config(),
        RecordingExecutor::boxed(),
    );

    assert!(agent.start().await);
    assert!(wait_for_report(&agent, |r| r.status == AgentStatus::Idle, 2_000).await);

    assert!(agent.stop().await);
    assert_eq!(agent.current_status().await, AgentStatus::Stopped);
    assert!(agent.worker_finished().await);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let agent = AgentHandle::new(
        AgentKind::Retrieval,
        "History",
        fast_config(),
        RecordingExecutor::boxed(),
    );

    assert!(agent.start().await);
    assert!(agent.start().await);
    assert!(!agent.worker_finished().await);
    assert!(agent.stop().await);
}

#[tokio::test]
async fn test_completes_assigned_task_and_reports() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let agent = AgentHandle::new(
        AgentKind::Discovery,
        "Physics",
        fast_config(),
        RecordingExecutor::boxed(),
    );
    agent.register_coordinator(tx).await;
    agent.start().await;

    let task = TaskDescriptor::new(TaskKind::Discovery, "Physics");
    let task_id = task.task_id.clone();
    assert!(agent.assign_task(task).await);

    let message = recv_report(&mut rx, 2_000).await.expect("completion report");
    match message.payload {
        MessagePayload::TaskCompleted {
            task_id: reported,
            result,
            metrics,
        } => {
            assert_eq!(reported, task_id);
            assert_eq!(result["documents"], serde_json::json!(2));
            assert_eq!(metrics["success"], serde_json::json!(true));
        }
        other => panic!("expected task_completed, got {}", other.kind()),
    }

    assert!(
        wait_for_report(
            &agent,
            |r| r.status == AgentStatus::Idle && r.current_task.is_none(),
            2_000
        )
        .await
    );
    let report = agent.status_report().await;
    assert_eq!(report.stats.tasks_completed, 1);
    assert_eq!(report.stats.tokens_used, 150);
    agent.stop().await;
}

#[tokio::test]
async fn test_executes_in_priority_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, _rx) = mpsc::unbounded_channel();
    let agent = AgentHandle::new(
        AgentKind::Processing,
        "Biology",
        fast_config(),
        Box::new(RecordingExecutor {
            seen: Arc::clone(&seen),
        }),
    );
    agent.register_coordinator(tx).await;

    let low = TaskDescriptor::new(TaskKind::Processing, "Biology").with_priority(7);
    let urgent = TaskDescriptor::new(TaskKind::Processing, "Biology").with_priority(1);
    let mid = TaskDescriptor::new(TaskKind::Processing, "Biology").with_priority(4);
    let expected = vec![
        urgent.task_id.clone(),
        mid.task_id.clone(),
        low.task_id.clone(),
    ];

    agent.assign_task(low).await;
    agent.assign_task(urgent).await;
    agent.assign_task(mid).await;
    agent.start().await;

    assert!(wait_for(|| seen.lock().unwrap().len() == 3, 3_000).await);
    assert_eq!(*seen.lock().unwrap(), expected);
    agent.stop().await;
}

#[tokio::test]
async fn test_single_failure_returns_to_idle() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let agent = AgentHandle::new(
        AgentKind::Validation,
        "Chemistry",
        fast_config(),
        Box::new(FailingExecutor),
    );
    agent.register_coordinator(tx).await;
    agent.start().await;

    let task = TaskDescriptor::new(TaskKind::Validation, "Chemistry");
    let task_id = task.task_id.clone();
    agent.assign_task(task).await;

    let message = recv_report(&mut rx, 2_000).await.expect("failure report");
    match message.payload {
        MessagePayload::TaskFailed {
            task_id: reported,
            error,
            ..
        } => {
            assert_eq!(reported, task_id);
            assert!(error.contains("simulated failure"));
        }
        other => panic!("expected task_failed, got {}", other.kind()),
    }

    // One failure is below the ceiling: the agent goes back to idle.
    assert!(wait_for_report(&agent, |r| r.status == AgentStatus::Idle, 2_000).await);
    let report = agent.status_report().await;
    assert_eq!(report.error_count, 1);
    assert_eq!(report.stats.tasks_failed, 1);
    assert!(report.stats.success_rate < 1.0);
    agent.stop().await;
}

#[tokio::test]
async fn test_error_ceiling_without_recovery_stays_down() {
    let config = AgentConfig {
        max_errors: 1,
        recovery_enabled: false,
        ..fast_config()
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let agent = AgentHandle::new(
        AgentKind::Discovery,
        "Physics",
        config,
        Box::new(FailingExecutor),
    );
    agent.register_coordinator(tx).await;
    agent.start().await;

    agent
        .assign_task(TaskDescriptor::new(TaskKind::Discovery, "Physics"))
        .await;

    assert!(recv_report(&mut rx, 2_000).await.is_some());
    assert!(wait_for_report(&agent, |r| r.status == AgentStatus::Error, 2_000).await);

    // Without self-recovery the agent stays in error.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(agent.current_status().await, AgentStatus::Error);
    agent.stop().await;
}

#[tokio::test]
async fn test_self_recovery_clears_queue_and_counter() {
    let config = AgentConfig {
        max_errors: 1,
        ..fast_config()
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let agent = AgentHandle::new(
        AgentKind::Discovery,
        "Physics",
        config,
        Box::new(FailingExecutor),
    );
    agent.register_coordinator(tx).await;

    // Two tasks queued; the first failure trips the ceiling, recovery drops
    // the second without attempting it.
    agent
        .assign_task(TaskDescriptor::new(TaskKind::Discovery, "Physics"))
        .await;
    agent
        .assign_task(TaskDescriptor::new(TaskKind::Discovery, "Physics"))
        .await;
    agent.start().await;

    assert!(recv_report(&mut rx, 2_000).await.is_some());
    assert!(
        wait_for_report(
            &agent,
            |r| r.status == AgentStatus::Idle && r.error_count == 0 && r.queue_depth == 0,
            3_000
        )
        .await
    );

    // Only the first task was ever attempted.
    assert!(recv_report(&mut rx, 200).await.is_none());
    agent.stop().await;
}

#[tokio::test]
async fn test_ping_yields_pong() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let agent = AgentHandle::new(
        AgentKind::Retrieval,
        "History",
        fast_config(),
        RecordingExecutor::boxed(),
    );
    agent.register_coordinator(tx).await;
    agent.start().await;

    agent
        .receive_message(AgentMessage::new(
            AgentMessage::ORCHESTRATOR,
            agent.id(),
            MessagePayload::Ping,
        ))
        .await;

    let message = recv_report(&mut rx, 2_000).await.expect("pong");
    match message.payload {
        MessagePayload::Pong { agent_id, .. } => assert_eq!(agent_id, agent.id()),
        other => panic!("expected pong, got {}", other.kind()),
    }
    agent.stop().await;
}

#[tokio::test]
async fn test_task_assignment_message_enqueues() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, _rx) = mpsc::unbounded_channel();
    let agent = AgentHandle::new(
        AgentKind::Retrieval,
        "History",
        fast_config(),
        Box::new(RecordingExecutor {
            seen: Arc::clone(&seen),
        }),
    );
    agent.register_coordinator(tx).await;
    agent.start().await;

    let task = TaskDescriptor::new(TaskKind::Retrieval, "History");
    let task_id = task.task_id.clone();
    agent
        .receive_message(AgentMessage::new(
            AgentMessage::ORCHESTRATOR,
            agent.id(),
            MessagePayload::TaskAssignment { task },
        ))
        .await;

    assert!(wait_for(|| seen.lock().unwrap().contains(&task_id), 2_000).await);
    agent.stop().await;
}

#[tokio::test]
async fn test_deadline_reports_failure() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let agent = AgentHandle::new(
        AgentKind::Processing,
        "Biology",
        fast_config(),
        Box::new(StuckExecutor),
    );
    agent.register_coordinator(tx).await;
    agent.start().await;

    agent
        .assign_task(TaskDescriptor::new(TaskKind::Processing, "Biology").with_deadline_secs(1))
        .await;

    let message = recv_report(&mut rx, 5_000).await.expect("deadline failure");
    match message.payload {
        MessagePayload::TaskFailed { error, .. } => assert!(error.contains("deadline")),
        other => panic!("expected task_failed, got {}", other.kind()),
    }
    agent.stop().await;
}

#[tokio::test]
async fn test_checkpoint_restore_roundtrip() {
    let agent = AgentHandle::new(
        AgentKind::Discovery,
        "Physics",
        fast_config(),
        RecordingExecutor::boxed(),
    );
    agent
        .assign_task(TaskDescriptor::new(TaskKind::Discovery, "Physics").with_priority(2))
        .await;

    let snapshot = agent.checkpoint().await;
    assert_eq!(snapshot["agent_id"], serde_json::json!(agent.id()));
    assert_eq!(snapshot["queue"].as_array().unwrap().len(), 1);

    let replacement = AgentHandle::new(
        AgentKind::Discovery,
        "Physics",
        fast_config(),
        RecordingExecutor::boxed(),
    );
    replacement.restore_from_checkpoint(&snapshot).await.unwrap();
    let report = replacement.status_report().await;
    assert_eq!(report.queue_depth, 1);
}

#[tokio::test]
async fn test_flag_unresponsive_marks_error() {
    let agent = AgentHandle::new(
        AgentKind::Discovery,
        "Physics",
        AgentConfig {
            recovery_enabled: false,
            ..fast_config()
        },
        RecordingExecutor::boxed(),
    );

    agent.flag_unresponsive().await;
    assert_eq!(agent.current_status().await, AgentStatus::Error);
    assert_eq!(agent.error_count().await, 1);

    let health = agent.health_metrics().await;
    assert!(health.health_score < 1.0);
    assert!(health.is_responsive);
}
