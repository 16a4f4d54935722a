use crate::config::AgentConfig;
use crate::executor::TaskExecutor;
use crate::metrics::{health_score, HealthMetrics, PerformanceStats, TaskMetrics, RESPONSIVE_WINDOW_SECS};
use crate::worker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use standor_core::{
    AgentKind, AgentMessage, AgentStatus, StandorError, StandorResult, TaskDescriptor,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Generate an agent ID from kind and category.
///
/// The UUID suffix guarantees a restarted agent never reuses its
/// predecessor's ID.
pub fn generate_agent_id(kind: AgentKind, category: &str) -> String {
    let slug = category.to_lowercase().replace(' ', "_");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", kind, slug, &suffix[..8])
}

/// Thread-safe snapshot of an agent's externally visible state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    /// The agent's ID.
    pub agent_id: String,
    /// Capability tag.
    pub kind: AgentKind,
    /// Category/domain assignment.
    pub category: String,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// ID of the task currently executing, if any.
    pub current_task: Option<String>,
    /// Number of queued task descriptors.
    pub queue_depth: usize,
    /// Number of undelivered inbox messages.
    pub inbox_depth: usize,
    /// When the worker last stamped its heartbeat.
    pub last_heartbeat: DateTime<Utc>,
    /// Consecutive-error count.
    pub error_count: u32,
    /// Rolling performance counters.
    pub stats: PerformanceStats,
}

pub(crate) struct WorkerState {
    pub(crate) status: AgentStatus,
    pub(crate) current_task: Option<String>,
    pub(crate) error_count: u32,
    pub(crate) last_heartbeat: DateTime<Utc>,
}

/// State shared between the public handle and the worker loop.
pub(crate) struct AgentShared {
    pub(crate) id: String,
    pub(crate) kind: AgentKind,
    pub(crate) category: String,
    pub(crate) config: AgentConfig,
    pub(crate) executor: Box<dyn TaskExecutor>,
    pub(crate) state: RwLock<WorkerState>,
    pub(crate) queue: Mutex<Vec<TaskDescriptor>>,
    pub(crate) inbox: Mutex<Vec<AgentMessage>>,
    pub(crate) stats: RwLock<PerformanceStats>,
    pub(crate) history: Mutex<Vec<TaskMetrics>>,
    pub(crate) coordinator: RwLock<Option<mpsc::UnboundedSender<AgentMessage>>>,
    pub(crate) stop_flag: AtomicBool,
}

/// A worker agent: typed capability, private task queue, message inbox, and
/// a polling execution loop on a dedicated tokio task.
///
/// All methods are safe to call from any task; each internal structure has
/// its own lock and no lock is held across executor calls.
pub struct AgentHandle {
    shared: Arc<AgentShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AgentHandle {
    /// Create a new agent in the `Initializing` state.
    pub fn new(
        kind: AgentKind,
        category: impl Into<String>,
        config: AgentConfig,
        executor: Box<dyn TaskExecutor>,
    ) -> Self {
        let category = category.into();
        let id = generate_agent_id(kind, &category);
        info!(agent_id = %id, kind = %kind, category = %category, "agent created");
        Self {
            shared: Arc::new(AgentShared {
                id,
                kind,
                category,
                config,
                executor,
                state: RwLock::new(WorkerState {
                    status: AgentStatus::Initializing,
                    current_task: None,
                    error_count: 0,
                    last_heartbeat: Utc::now(),
                }),
                queue: Mutex::new(Vec::new()),
                inbox: Mutex::new(Vec::new()),
                stats: RwLock::new(PerformanceStats::default()),
                history: Mutex::new(Vec::new()),
                coordinator: RwLock::new(None),
                stop_flag: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// The agent's unique ID.
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// The agent's capability tag.
    pub fn kind(&self) -> AgentKind {
        self.shared.kind
    }

    /// The agent's category assignment.
    pub fn category(&self) -> &str {
        &self.shared.category
    }

    /// Register the channel over which this agent reports to the
    /// coordinator. Must be called before `start` for reports to arrive.
    pub async fn register_coordinator(&self, tx: mpsc::UnboundedSender<AgentMessage>) {
        *self.shared.coordinator.write().await = Some(tx);
    }

    /// Start the worker loop. Idempotent: a second call while the worker is
    /// alive is a no-op returning `true`.
    pub async fn start(&self) -> bool {
        let mut worker = self.worker.lock().await;
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                warn!(agent_id = %self.shared.id, "agent is already running");
                return true;
            }
        }

        self.shared.stop_flag.store(false, Ordering::SeqCst);
        self.shared.state.write().await.status = AgentStatus::Idle;
        *worker = Some(tokio::spawn(worker::run(Arc::clone(&self.shared))));
        info!(agent_id = %self.shared.id, "agent started");
        true
    }

    /// Stop the worker loop, waiting out the current task up to the
    /// configured stop timeout and abandoning it past that. Always leaves
    /// the agent in `Stopped`.
    pub async fn stop(&self) -> bool {
        info!(agent_id = %self.shared.id, "stopping agent");
        self.shared.stop_flag.store(true, Ordering::SeqCst);

        let handle = self.worker.lock().await.take();
        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.shared.config.stop_timeout(), &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(
                        agent_id = %self.shared.id,
                        "worker did not stop within timeout, abandoning current task"
                    );
                    handle.abort();
                }
            }
        }

        self.shared.state.write().await.status = AgentStatus::Stopped;
        info!(agent_id = %self.shared.id, "agent stopped");
        true
    }

    /// Append a task descriptor to the private queue, keeping it sorted by
    /// priority (ascending; stable, so equal priorities keep arrival order).
    pub async fn assign_task(&self, task: TaskDescriptor) -> bool {
        let mut queue = self.shared.queue.lock().await;
        info!(agent_id = %self.shared.id, task_id = %task.task_id, "task assigned");
        queue.push(task);
        queue.sort_by_key(|t| t.priority);
        true
    }

    /// Enqueue a message into the inbox, priority-sorted. Safe to call from
    /// any task; the worker drains the inbox on its next tick.
    pub async fn receive_message(&self, message: AgentMessage) {
        let mut inbox = self.shared.inbox.lock().await;
        inbox.push(message);
        inbox.sort_by_key(|m| m.priority);
    }

    /// Current lifecycle status.
    pub async fn current_status(&self) -> AgentStatus {
        self.shared.state.read().await.status
    }

    /// Current consecutive-error count.
    pub async fn error_count(&self) -> u32 {
        self.shared.state.read().await.error_count
    }

    /// When the worker last stamped its heartbeat.
    pub async fn last_heartbeat(&self) -> DateTime<Utc> {
        self.shared.state.read().await.last_heartbeat
    }

    /// Coordinator-side liveness suspicion: mark the agent errored and bump
    /// its error counter. Distinct from the worker's own failure ceiling —
    /// the worker may be wedged inside an executor and unable to notice.
    pub async fn flag_unresponsive(&self) {
        let mut state = self.shared.state.write().await;
        state.status = AgentStatus::Error;
        state.error_count += 1;
        warn!(
            agent_id = %self.shared.id,
            error_count = state.error_count,
            "agent flagged unresponsive"
        );
    }

    /// Full status snapshot.
    pub async fn status_report(&self) -> AgentStatusReport {
        let state = self.shared.state.read().await;
        let queue_depth = self.shared.queue.lock().await.len();
        let inbox_depth = self.shared.inbox.lock().await.len();
        let stats = self.shared.stats.read().await.clone();
        AgentStatusReport {
            agent_id: self.shared.id.clone(),
            kind: self.shared.kind,
            category: self.shared.category.clone(),
            status: state.status,
            current_task: state.current_task.clone(),
            queue_depth,
            inbox_depth,
            last_heartbeat: state.last_heartbeat,
            error_count: state.error_count,
            stats,
        }
    }

    /// Point-in-time health assessment.
    pub async fn health_metrics(&self) -> HealthMetrics {
        let state = self.shared.state.read().await;
        let stats = self.shared.stats.read().await;
        let since_heartbeat = (Utc::now() - state.last_heartbeat).num_milliseconds() as f64 / 1e3;
        let last_completed = {
            let history = self.shared.history.lock().await;
            history
                .iter()
                .filter(|m| m.success)
                .map(|m| m.finished_at)
                .max()
        };
        HealthMetrics {
            agent_id: self.shared.id.clone(),
            status: state.status,
            health_score: health_score(
                state.error_count,
                self.shared.config.max_errors,
                stats.success_rate,
                since_heartbeat,
            ),
            seconds_since_heartbeat: since_heartbeat,
            error_count: state.error_count,
            max_errors: self.shared.config.max_errors,
            success_rate: stats.success_rate,
            is_responsive: since_heartbeat < RESPONSIVE_WINDOW_SECS,
            last_task_completed_at: last_completed,
        }
    }

    /// Replayable snapshot of the agent's state for inclusion in
    /// orchestrator checkpoints.
    pub async fn checkpoint(&self) -> serde_json::Value {
        let state = self.shared.state.read().await;
        let queue = self.shared.queue.lock().await.clone();
        let stats = self.shared.stats.read().await.clone();
        serde_json::json!({
            "agent_id": self.shared.id,
            "kind": self.shared.kind,
            "category": self.shared.category,
            "status": state.status,
            "current_task": state.current_task,
            "error_count": state.error_count,
            "queue": queue,
            "stats": stats,
            "checkpointed_at": Utc::now(),
        })
    }

    /// Reload queue, counters, and error count from a checkpoint snapshot.
    pub async fn restore_from_checkpoint(&self, snapshot: &serde_json::Value) -> StandorResult<()> {
        let queue: Vec<TaskDescriptor> = serde_json::from_value(
            snapshot
                .get("queue")
                .cloned()
                .unwrap_or(serde_json::Value::Array(Vec::new())),
        )?;
        let stats: PerformanceStats = match snapshot.get("stats") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => {
                return Err(StandorError::Agent(
                    "checkpoint snapshot is missing 'stats'".to_string(),
                ))
            }
        };
        let error_count = snapshot
            .get("error_count")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;

        *self.shared.queue.lock().await = queue;
        *self.shared.stats.write().await = stats;
        self.shared.state.write().await.error_count = error_count;
        info!(agent_id = %self.shared.id, "agent restored from checkpoint");
        Ok(())
    }

    /// Whether the worker task has exited (or was never started).
    pub async fn worker_finished(&self) -> bool {
        match self.worker.lock().await.as_ref() {
            Some(handle) => handle.is_finished(),
            None => true,
        }
    }
}
