use crate::kinds::TaskKind;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_priority() -> i32 {
    5
}

/// The flattened work item handed to an agent for execution.
///
/// This is the transient copy an agent holds while executing; the
/// orchestrator keeps the canonical task record. Parameters and the eventual
/// result are opaque to everything except the concrete executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Canonical task ID (see [`generate_task_id`]).
    pub task_id: String,
    /// Which executor logic applies.
    pub kind: TaskKind,
    /// Partitioning key (academic discipline or topic).
    pub category: String,
    /// Opaque parameters for the executor.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Lower value = more urgent.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Optional execution deadline in seconds; `None` means unbounded.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl TaskDescriptor {
    /// Create a descriptor with a freshly generated ID and default priority.
    pub fn new(kind: TaskKind, category: impl Into<String>) -> Self {
        let category = category.into();
        Self {
            task_id: generate_task_id(kind, &category),
            kind,
            category,
            parameters: HashMap::new(),
            priority: default_priority(),
            deadline_secs: None,
        }
    }

    /// Set the executor parameters.
    pub fn with_parameters(mut self, parameters: HashMap<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the priority (lower = more urgent).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set an execution deadline in seconds.
    pub fn with_deadline_secs(mut self, secs: u64) -> Self {
        self.deadline_secs = Some(secs);
        self
    }
}

/// Generate a task ID from kind, category, and the current UTC time.
///
/// The nanosecond-resolution timestamp gives practical uniqueness within a
/// single coordinator process.
pub fn generate_task_id(kind: TaskKind, category: &str) -> String {
    format!(
        "{}_{}_{}",
        kind,
        category.to_lowercase().replace(' ', "_"),
        Utc::now().format("%Y%m%d_%H%M%S_%f")
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let task = TaskDescriptor::new(TaskKind::Discovery, "Physics");
        assert_eq!(task.kind, TaskKind::Discovery);
        assert_eq!(task.category, "Physics");
        assert_eq!(task.priority, 5);
        assert!(task.parameters.is_empty());
        assert!(task.deadline_secs.is_none());
    }

    #[test]
    fn test_task_id_shape() {
        let id = generate_task_id(TaskKind::Retrieval, "Computer Science");
        assert!(id.starts_with("retrieval_computer_science_"));
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = generate_task_id(TaskKind::Discovery, "Physics");
        let b = generate_task_id(TaskKind::Discovery, "Physics");
        assert_ne!(a, b);
    }

    #[test]
    fn test_descriptor_builders() {
        let mut params = HashMap::new();
        params.insert("depth".to_string(), serde_json::json!(3));
        let task = TaskDescriptor::new(TaskKind::Processing, "Biology")
            .with_parameters(params)
            .with_priority(1)
            .with_deadline_secs(30);
        assert_eq!(task.priority, 1);
        assert_eq!(task.deadline_secs, Some(30));
        assert_eq!(task.parameters["depth"], serde_json::json!(3));
    }

    #[test]
    fn test_descriptor_roundtrip_keeps_optional_fields() {
        let task = TaskDescriptor::new(TaskKind::Validation, "Chemistry").with_deadline_secs(5);
        let json = serde_json::to_string(&task).unwrap();
        let parsed: TaskDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.task_id, task.task_id);
        assert_eq!(parsed.deadline_secs, Some(5));
    }
}
