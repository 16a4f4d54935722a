use crate::types::{TaskCounts, TaskRecord, TaskStatus};
use chrono::Utc;
use standor_core::{StandorError, StandorResult, TaskDescriptor};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct BoardInner {
    /// Priority-sorted pending records. The sort is stable, so equal
    /// priorities keep insertion order.
    pending: Vec<TaskRecord>,
    active: HashMap<String, TaskRecord>,
    terminal: HashMap<String, TaskRecord>,
}

/// Tally of one category's task records.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryTally {
    /// Records completed successfully.
    pub completed: u64,
    /// Records terminally failed.
    pub failed: u64,
    /// All records known for the category.
    pub total: u64,
}

/// The orchestrator's canonical task bookkeeping, behind a single internal
/// lock.
///
/// A record moves `pending → active → terminal`; terminal records are never
/// reassigned. The lock is held only for record mutation — never across a
/// call into an agent.
pub struct TaskBoard {
    inner: RwLock<BoardInner>,
}

impl TaskBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BoardInner::default()),
        }
    }

    /// Enqueue a pending record; returns its ID.
    pub async fn add(&self, record: TaskRecord) -> String {
        let id = record.id.clone();
        let mut inner = self.inner.write().await;
        inner.pending.push(record);
        inner.pending.sort_by_key(|t| t.priority);
        id
    }

    /// Snapshot of the pending queue in assignment order.
    pub async fn pending_snapshot(&self) -> Vec<TaskRecord> {
        self.inner.read().await.pending.clone()
    }

    /// Move a pending record into execution: status `InProgress`, agent and
    /// start time recorded, attempt counted. Returns the descriptor to hand
    /// to the agent.
    pub async fn begin(&self, task_id: &str, agent_id: &str) -> StandorResult<TaskDescriptor> {
        let mut inner = self.inner.write().await;
        let position = inner
            .pending
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| StandorError::Task(format!("task {task_id} is not pending")))?;
        let mut record = inner.pending.remove(position);
        record.status = TaskStatus::InProgress;
        record.assigned_agent = Some(agent_id.to_string());
        record.started_at = Some(Utc::now());
        record.attempts += 1;
        let descriptor = record.descriptor();
        inner.active.insert(record.id.clone(), record);
        Ok(descriptor)
    }

    /// Return an in-progress record to the pending queue without counting
    /// the attempt as failed (used when an assignment hand-off is refused).
    pub async fn release(&self, task_id: &str) -> StandorResult<()> {
        let mut inner = self.inner.write().await;
        let mut record = inner
            .active
            .remove(task_id)
            .ok_or_else(|| StandorError::Task(format!("task {task_id} is not active")))?;
        record.status = TaskStatus::Pending;
        record.assigned_agent = None;
        record.started_at = None;
        inner.pending.push(record);
        inner.pending.sort_by_key(|t| t.priority);
        Ok(())
    }

    /// Mark an in-progress record completed with its result payload.
    pub async fn complete(
        &self,
        task_id: &str,
        result: serde_json::Value,
    ) -> StandorResult<()> {
        let mut inner = self.inner.write().await;
        let mut record = inner
            .active
            .remove(task_id)
            .ok_or_else(|| StandorError::Task(format!("task {task_id} is not active")))?;
        record.status = TaskStatus::Completed;
        record.completed_at = Some(Utc::now());
        record.result = Some(result);
        inner.terminal.insert(record.id.clone(), record);
        Ok(())
    }

    /// Record a failed attempt. While attempts remain within
    /// `retries_allowed` the record returns to the pending queue; otherwise
    /// it becomes terminally `Failed`. Returns the resulting status.
    pub async fn fail(
        &self,
        task_id: &str,
        error: &str,
        retries_allowed: u32,
    ) -> StandorResult<TaskStatus> {
        let mut inner = self.inner.write().await;
        let mut record = inner
            .active
            .remove(task_id)
            .ok_or_else(|| StandorError::Task(format!("task {task_id} is not active")))?;

        if record.attempts <= retries_allowed {
            record.status = TaskStatus::Pending;
            record.assigned_agent = None;
            record.started_at = None;
            inner.pending.push(record);
            inner.pending.sort_by_key(|t| t.priority);
            Ok(TaskStatus::Pending)
        } else {
            record.status = TaskStatus::Failed;
            record.completed_at = Some(Utc::now());
            record.error_message = Some(error.to_string());
            inner.terminal.insert(record.id.clone(), record);
            Ok(TaskStatus::Failed)
        }
    }

    /// Cancel a record that is still pending. In-flight tasks are never
    /// preempted.
    pub async fn cancel(&self, task_id: &str) -> StandorResult<()> {
        let mut inner = self.inner.write().await;
        let position = inner
            .pending
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| StandorError::Task(format!("task {task_id} is not pending")))?;
        let mut record = inner.pending.remove(position);
        record.status = TaskStatus::Cancelled;
        record.completed_at = Some(Utc::now());
        inner.terminal.insert(record.id.clone(), record);
        Ok(())
    }

    /// Look a record up in any phase.
    pub async fn get(&self, task_id: &str) -> Option<TaskRecord> {
        let inner = self.inner.read().await;
        inner
            .pending
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .or_else(|| inner.active.get(task_id).cloned())
            .or_else(|| inner.terminal.get(task_id).cloned())
    }

    /// Counts by lifecycle phase.
    pub async fn counts(&self) -> TaskCounts {
        let inner = self.inner.read().await;
        let mut counts = TaskCounts {
            pending: inner.pending.len(),
            in_progress: inner.active.len(),
            ..TaskCounts::default()
        };
        for record in inner.terminal.values() {
            match record.status {
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
                _ => {}
            }
        }
        counts
    }

    /// Per-category tallies across every phase.
    pub async fn category_tallies(&self) -> HashMap<String, CategoryTally> {
        let inner = self.inner.read().await;
        let mut tallies: HashMap<String, CategoryTally> = HashMap::new();
        let all = inner
            .pending
            .iter()
            .chain(inner.active.values())
            .chain(inner.terminal.values());
        for record in all {
            let tally = tallies.entry(record.category.clone()).or_default();
            tally.total += 1;
            match record.status {
                TaskStatus::Completed => tally.completed += 1,
                TaskStatus::Failed => tally.failed += 1,
                _ => {}
            }
        }
        tallies
    }
}

impl Default for TaskBoard {
    fn default() -> Self {
        Self::new()
    }
}
