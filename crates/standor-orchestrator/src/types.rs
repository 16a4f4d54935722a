use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use standor_core::{generate_task_id, AgentKind, AgentStatus, TaskDescriptor, TaskKind};
use std::collections::HashMap;

/// Lifecycle status of a canonical task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, awaiting assignment.
    Pending,
    /// Assigned to an agent and executing.
    InProgress,
    /// Finished successfully; terminal.
    Completed,
    /// Failed with retries exhausted; terminal.
    Failed,
    /// Cancelled while still pending; terminal.
    Cancelled,
}

impl TaskStatus {
    /// Whether the status is terminal (never reassigned).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The canonical record of one task, owned by the orchestrator.
///
/// Invariants maintained by [`crate::TaskBoard`]: `assigned_agent` is set
/// exactly when the status is in-progress or terminal-after-assignment;
/// `result` only when completed; `error_message` only when failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Canonical task ID.
    pub id: String,
    /// Which executor logic applies.
    pub kind: TaskKind,
    /// Partitioning key.
    pub category: String,
    /// Opaque executor parameters.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Lower value = more urgent.
    pub priority: i32,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Agent holding (or last holding) the task.
    pub assigned_agent: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the current (or last) attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the record became terminal.
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque result payload, set on completion.
    pub result: Option<serde_json::Value>,
    /// Failure description, set on terminal failure.
    pub error_message: Option<String>,
    /// How many times the task has been handed to an agent.
    #[serde(default)]
    pub attempts: u32,
    /// Per-task execution deadline in seconds.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl TaskRecord {
    /// Create a pending record with a freshly generated ID.
    pub fn new(
        kind: TaskKind,
        category: impl Into<String>,
        parameters: HashMap<String, serde_json::Value>,
        priority: i32,
    ) -> Self {
        let category = category.into();
        Self {
            id: generate_task_id(kind, &category),
            kind,
            category,
            parameters,
            priority,
            status: TaskStatus::Pending,
            assigned_agent: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
            attempts: 0,
            deadline_secs: None,
        }
    }

    /// Set a per-task execution deadline.
    pub fn with_deadline_secs(mut self, secs: Option<u64>) -> Self {
        self.deadline_secs = secs;
        self
    }

    /// The flattened descriptor handed to an agent.
    pub fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor {
            task_id: self.id.clone(),
            kind: self.kind,
            category: self.category.clone(),
            parameters: self.parameters.clone(),
            priority: self.priority,
            deadline_secs: self.deadline_secs,
        }
    }
}

/// Per-agent entry in the status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusEntry {
    /// The agent's capability tag.
    #[serde(rename = "type")]
    pub kind: AgentKind,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Category assignment.
    pub category: String,
    /// Task currently executing, if any.
    pub current_task: Option<String>,
    /// Last heartbeat stamp.
    pub last_heartbeat: DateTime<Utc>,
    /// Accumulated error count.
    pub error_count: u32,
    /// Tasks finished successfully.
    pub tasks_completed: u64,
    /// Rolling success rate.
    pub success_rate: f64,
}

/// Task counts by lifecycle phase.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskCounts {
    /// Queued, unassigned.
    pub pending: usize,
    /// Assigned and executing.
    pub in_progress: usize,
    /// Finished successfully.
    pub completed: usize,
    /// Terminally failed.
    pub failed: usize,
    /// Cancelled before assignment.
    pub cancelled: usize,
}

/// Aggregate progress state of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    /// No work recorded yet.
    NotStarted,
    /// Work underway.
    InProgress,
    /// All known work finished.
    Completed,
}

/// Progress tracking for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryProgress {
    /// Aggregate state.
    pub status: CategoryStatus,
    /// Agents assigned to this category and currently alive.
    pub active_agents: usize,
    /// Tasks completed for this category.
    pub tasks_completed: u64,
    /// Tasks failed for this category.
    pub tasks_failed: u64,
    /// Completion percentage; non-decreasing while the system runs.
    pub percent_complete: f64,
    /// When this entry was last refreshed.
    pub last_update: DateTime<Utc>,
}

impl Default for CategoryProgress {
    fn default() -> Self {
        Self {
            status: CategoryStatus::NotStarted,
            active_agents: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            percent_complete: 0.0,
            last_update: Utc::now(),
        }
    }
}

/// Rolling system-wide metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Terminal tasks processed (completed or failed).
    pub tasks_processed: u64,
    /// Of those, how many failed.
    pub tasks_failed: u64,
    /// Agents currently idle or running.
    pub active_agents: usize,
    /// Active agents relative to the provisioned target, in `[0.0, 1.0]`.
    pub system_efficiency: f64,
    /// When the metrics were last refreshed.
    pub last_update: DateTime<Utc>,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self {
            tasks_processed: 0,
            tasks_failed: 0,
            active_agents: 0,
            system_efficiency: 0.0,
            last_update: Utc::now(),
        }
    }
}

/// Aggregate status snapshot returned by
/// [`crate::Orchestrator::get_system_status`]. Always available, even
/// mid-degradation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Whether the main loop is running.
    pub is_running: bool,
    /// Per-agent status, keyed by agent ID.
    pub agents: HashMap<String, AgentStatusEntry>,
    /// Task counts by phase.
    pub tasks: TaskCounts,
    /// Per-category progress, keyed by category.
    pub category_progress: HashMap<String, CategoryProgress>,
    /// Rolling system metrics.
    pub system_metrics: SystemMetrics,
    /// Categories the system was started with.
    pub categories: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_pending_and_unassigned() {
        let record = TaskRecord::new(TaskKind::Discovery, "Physics", HashMap::new(), 3);
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.assigned_agent.is_none());
        assert!(record.result.is_none());
        assert!(record.error_message.is_none());
        assert_eq!(record.attempts, 0);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_descriptor_flattening() {
        let mut parameters = HashMap::new();
        parameters.insert("source".to_string(), serde_json::json!("openalex"));
        let record = TaskRecord::new(TaskKind::Retrieval, "Biology", parameters, 2)
            .with_deadline_secs(Some(60));
        let descriptor = record.descriptor();
        assert_eq!(descriptor.task_id, record.id);
        assert_eq!(descriptor.kind, TaskKind::Retrieval);
        assert_eq!(descriptor.priority, 2);
        assert_eq!(descriptor.deadline_secs, Some(60));
        assert_eq!(descriptor.parameters["source"], serde_json::json!("openalex"));
    }

    #[test]
    fn test_agent_entry_uses_type_key() {
        let entry = AgentStatusEntry {
            kind: AgentKind::Discovery,
            status: AgentStatus::Idle,
            category: "Physics".to_string(),
            current_task: None,
            last_heartbeat: Utc::now(),
            error_count: 0,
            tasks_completed: 0,
            success_rate: 1.0,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], serde_json::json!("discovery"));
        assert_eq!(json["status"], serde_json::json!("idle"));
    }
}
