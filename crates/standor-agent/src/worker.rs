use crate::handle::AgentShared;
use crate::metrics::TaskMetrics;
use chrono::Utc;
use standor_core::{AgentMessage, AgentStatus, MessagePayload, StandorError, TaskDescriptor};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The agent's polling loop: heartbeat, inbox dispatch, at most one task
/// execution per iteration, self-recovery out of the error state.
///
/// Task execution is the single point where the loop may block for an
/// arbitrarily long time; nothing outside this agent is affected while it
/// does.
pub(crate) async fn run(shared: Arc<AgentShared>) {
    info!(agent_id = %shared.id, "agent worker loop started");

    while !shared.stop_flag.load(Ordering::SeqCst) {
        shared.state.write().await.last_heartbeat = Utc::now();

        drain_inbox(&shared).await;

        let status = shared.state.read().await.status;
        match status {
            AgentStatus::Error if shared.config.recovery_enabled => recover(&shared).await,
            AgentStatus::Idle | AgentStatus::Running => {
                if let Some(task) = next_task(&shared).await {
                    execute(&shared, task).await;
                }
            }
            _ => {}
        }

        tokio::time::sleep(shared.config.poll_interval()).await;
    }

    info!(agent_id = %shared.id, "agent worker loop ended");
}

/// Pop the highest-priority queued task; flip back to idle when the queue
/// has drained. The queue guard is released before the state lock is taken
/// — other paths hold state while inspecting the queue.
async fn next_task(shared: &AgentShared) -> Option<TaskDescriptor> {
    let popped = {
        let mut queue = shared.queue.lock().await;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    };
    if popped.is_none() {
        let mut state = shared.state.write().await;
        if state.status == AgentStatus::Running {
            state.status = AgentStatus::Idle;
        }
    }
    popped
}

/// Dispatch every queued inbox message. Coordinator-bound payloads landing
/// here are protocol misuse and are dropped with a debug log.
async fn drain_inbox(shared: &AgentShared) {
    loop {
        let message = {
            let mut inbox = shared.inbox.lock().await;
            if inbox.is_empty() {
                break;
            }
            inbox.remove(0)
        };

        let payload_kind = message.payload.kind();
        match message.payload {
            MessagePayload::TaskAssignment { task } => {
                let mut queue = shared.queue.lock().await;
                info!(agent_id = %shared.id, task_id = %task.task_id, "task assigned via message");
                queue.push(task);
                queue.sort_by_key(|t| t.priority);
            }
            MessagePayload::Ping => {
                let status = shared.state.read().await.status;
                report(
                    shared,
                    MessagePayload::Pong {
                        agent_id: shared.id.clone(),
                        status,
                    },
                )
                .await;
            }
            MessagePayload::StatusRequest => {
                let report_json = status_report_json(shared).await;
                report(shared, MessagePayload::StatusResponse { report: report_json }).await;
            }
            MessagePayload::TaskCompleted { .. }
            | MessagePayload::TaskFailed { .. }
            | MessagePayload::Pong { .. }
            | MessagePayload::StatusResponse { .. } => {
                debug!(
                    agent_id = %shared.id,
                    payload = payload_kind,
                    sender = %message.sender,
                    "dropping coordinator-bound payload"
                );
            }
        }
    }
}

/// Execute a single task and report the outcome to the coordinator.
async fn execute(shared: &AgentShared, task: TaskDescriptor) {
    let task_id = task.task_id.clone();
    {
        let mut state = shared.state.write().await;
        state.status = AgentStatus::Running;
        state.current_task = Some(task_id.clone());
    }
    info!(agent_id = %shared.id, task_id = %task_id, "starting task");

    let started_at = Utc::now();
    let clock = tokio::time::Instant::now();
    let outcome = match task.deadline_secs {
        Some(secs) => {
            match tokio::time::timeout(
                Duration::from_secs(secs),
                shared.executor.process_task(&task),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(StandorError::Task(format!(
                    "task {task_id} exceeded its {secs}s deadline"
                ))),
            }
        }
        None => shared.executor.process_task(&task).await,
    };
    let duration_secs = clock.elapsed().as_secs_f64();
    let finished_at = Utc::now();

    match outcome {
        Ok(result) => {
            let metrics = TaskMetrics {
                task_id: task_id.clone(),
                started_at,
                finished_at,
                duration_secs,
                success: true,
                error_message: None,
                tokens_used: opt_u64(&result, "tokens_used"),
                cost: opt_f64(&result, "cost"),
                quality_score: opt_f64(&result, "quality_score"),
            };
            shared
                .stats
                .write()
                .await
                .record_success(duration_secs, metrics.tokens_used, metrics.cost);
            let metrics_json = serde_json::to_value(&metrics).unwrap_or(serde_json::Value::Null);
            shared.history.lock().await.push(metrics);

            report(
                shared,
                MessagePayload::TaskCompleted {
                    task_id: task_id.clone(),
                    result,
                    metrics: metrics_json,
                },
            )
            .await;

            let mut state = shared.state.write().await;
            state.current_task = None;
            state.status = AgentStatus::Idle;
            info!(
                agent_id = %shared.id,
                task_id = %task_id,
                duration_secs,
                "task completed"
            );
        }
        Err(e) => {
            let metrics = TaskMetrics {
                task_id: task_id.clone(),
                started_at,
                finished_at,
                duration_secs,
                success: false,
                error_message: Some(e.to_string()),
                tokens_used: 0,
                cost: 0.0,
                quality_score: 0.0,
            };
            shared.stats.write().await.record_failure();
            let metrics_json = serde_json::to_value(&metrics).unwrap_or(serde_json::Value::Null);
            shared.history.lock().await.push(metrics);

            report(
                shared,
                MessagePayload::TaskFailed {
                    task_id: task_id.clone(),
                    error: e.to_string(),
                    metrics: metrics_json,
                },
            )
            .await;

            let mut state = shared.state.write().await;
            state.current_task = None;
            state.error_count += 1;
            if state.error_count >= shared.config.max_errors {
                state.status = AgentStatus::Error;
                error!(
                    agent_id = %shared.id,
                    task_id = %task_id,
                    error_count = state.error_count,
                    "error ceiling reached, agent entering error state"
                );
            } else {
                state.status = AgentStatus::Idle;
                warn!(
                    agent_id = %shared.id,
                    task_id = %task_id,
                    error = %e,
                    error_count = state.error_count,
                    "task failed"
                );
            }
        }
    }
}

/// Self-heal out of the error state: clear the queue, reset the error
/// counter, return to idle.
async fn recover(shared: &AgentShared) {
    warn!(agent_id = %shared.id, "attempting agent recovery");
    shared.state.write().await.status = AgentStatus::Recovering;

    let dropped = {
        let mut queue = shared.queue.lock().await;
        let dropped = queue.len();
        queue.clear();
        dropped
    };

    let mut state = shared.state.write().await;
    state.error_count = 0;
    state.status = AgentStatus::Idle;
    info!(agent_id = %shared.id, dropped_tasks = dropped, "agent recovered");
}

async fn report(shared: &AgentShared, payload: MessagePayload) {
    let coordinator = shared.coordinator.read().await;
    match coordinator.as_ref() {
        Some(tx) => {
            if tx
                .send(AgentMessage::to_orchestrator(shared.id.clone(), payload))
                .is_err()
            {
                debug!(agent_id = %shared.id, "coordinator channel closed, report dropped");
            }
        }
        None => warn!(agent_id = %shared.id, "no coordinator channel registered, report dropped"),
    }
}

async fn status_report_json(shared: &AgentShared) -> serde_json::Value {
    let state = shared.state.read().await;
    let stats = shared.stats.read().await.clone();
    let queue_depth = shared.queue.lock().await.len();
    serde_json::json!({
        "agent_id": shared.id,
        "kind": shared.kind,
        "category": shared.category,
        "status": state.status,
        "current_task": state.current_task,
        "queue_depth": queue_depth,
        "last_heartbeat": state.last_heartbeat,
        "error_count": state.error_count,
        "stats": stats,
    })
}

fn opt_u64(value: &serde_json::Value, key: &str) -> u64 {
    value.get(key).and_then(serde_json::Value::as_u64).unwrap_or(0)
}

fn opt_f64(value: &serde_json::Value, key: &str) -> f64 {
    value.get(key).and_then(serde_json::Value::as_f64).unwrap_or(0.0)
}
