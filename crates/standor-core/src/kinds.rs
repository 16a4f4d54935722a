use serde::{Deserialize, Serialize};

/// Capability tag of a worker agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Locates candidate standards documents for a category.
    Discovery,
    /// Fetches located documents from their sources.
    Retrieval,
    /// Parses and structures retrieved documents.
    Processing,
    /// Scores and validates processed documents.
    Validation,
}

impl AgentKind {
    /// All agent kinds, in provisioning order.
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Discovery,
        AgentKind::Retrieval,
        AgentKind::Processing,
        AgentKind::Validation,
    ];

    /// Whether an agent of this kind can execute a task of the given kind.
    ///
    /// Retrieval agents absorb processing overflow and processing agents
    /// absorb validation overflow; discovery and validation are exclusive.
    /// The table is total: every pair has a defined answer.
    pub fn accepts(&self, task: TaskKind) -> bool {
        match self {
            AgentKind::Discovery => matches!(task, TaskKind::Discovery),
            AgentKind::Retrieval => matches!(task, TaskKind::Retrieval | TaskKind::Processing),
            AgentKind::Processing => matches!(task, TaskKind::Processing | TaskKind::Validation),
            AgentKind::Validation => matches!(task, TaskKind::Validation),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Discovery => write!(f, "discovery"),
            AgentKind::Retrieval => write!(f, "retrieval"),
            AgentKind::Processing => write!(f, "processing"),
            AgentKind::Validation => write!(f, "validation"),
        }
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Find candidate standards documents.
    Discovery,
    /// Download a discovered document.
    Retrieval,
    /// Extract structured content from a document.
    Processing,
    /// Validate and score extracted content.
    Validation,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Discovery => write!(f, "discovery"),
            TaskKind::Retrieval => write!(f, "retrieval"),
            TaskKind::Processing => write!(f, "processing"),
            TaskKind::Validation => write!(f, "validation"),
        }
    }
}

/// Lifecycle state of an agent.
///
/// Transitions: `Initializing → Idle ⇄ Running`, `Error → Recovering → Idle`
/// (self-healing), and `Stopped` terminal via explicit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Created but not yet started.
    Initializing,
    /// Started, queue empty, ready for assignment.
    Idle,
    /// Executing a task.
    Running,
    /// Consecutive-failure ceiling reached or flagged unresponsive.
    Error,
    /// Clearing state after an error, on the way back to idle.
    Recovering,
    /// Explicitly stopped; terminal.
    Stopped,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Initializing => write!(f, "initializing"),
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Recovering => write!(f, "recovering"),
            AgentStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_table_is_total() {
        for agent in AgentKind::ALL {
            for task in [
                TaskKind::Discovery,
                TaskKind::Retrieval,
                TaskKind::Processing,
                TaskKind::Validation,
            ] {
                // Must not panic for any pair; the answer itself is checked below.
                let _ = agent.accepts(task);
            }
        }
    }

    #[test]
    fn test_discovery_is_exclusive() {
        assert!(AgentKind::Discovery.accepts(TaskKind::Discovery));
        assert!(!AgentKind::Discovery.accepts(TaskKind::Retrieval));
        assert!(!AgentKind::Retrieval.accepts(TaskKind::Discovery));
    }

    #[test]
    fn test_overflow_compatibility() {
        assert!(AgentKind::Retrieval.accepts(TaskKind::Processing));
        assert!(AgentKind::Processing.accepts(TaskKind::Validation));
        assert!(!AgentKind::Processing.accepts(TaskKind::Retrieval));
        assert!(!AgentKind::Validation.accepts(TaskKind::Processing));
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&AgentKind::Retrieval).unwrap();
        assert_eq!(json, "\"retrieval\"");
        let parsed: TaskKind = serde_json::from_str("\"validation\"").unwrap();
        assert_eq!(parsed, TaskKind::Validation);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(AgentStatus::Idle.to_string(), "idle");
        assert_eq!(AgentStatus::Recovering.to_string(), "recovering");
    }
}
