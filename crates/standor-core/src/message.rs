use crate::kinds::AgentStatus;
use crate::task::TaskDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_message_priority() -> i32 {
    5
}

/// The closed set of payloads exchanged between agents and the orchestrator.
///
/// Matched exhaustively everywhere — there is no catch-all branch for
/// unknown message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Orchestrator → agent: enqueue this task.
    TaskAssignment {
        /// The work item to enqueue.
        task: TaskDescriptor,
    },
    /// Agent → orchestrator: a task finished successfully.
    TaskCompleted {
        /// Canonical ID of the finished task.
        task_id: String,
        /// Opaque executor result payload.
        result: serde_json::Value,
        /// Serialized execution metrics for the attempt.
        #[serde(default)]
        metrics: serde_json::Value,
    },
    /// Agent → orchestrator: a task failed.
    TaskFailed {
        /// Canonical ID of the failed task.
        task_id: String,
        /// Failure description.
        error: String,
        /// Serialized execution metrics for the attempt.
        #[serde(default)]
        metrics: serde_json::Value,
    },
    /// Liveness probe.
    Ping,
    /// Liveness probe response.
    Pong {
        /// Responding agent's ID.
        agent_id: String,
        /// Responding agent's status at the time of the probe.
        status: AgentStatus,
    },
    /// Request for a full status report.
    StatusRequest,
    /// Response carrying a serialized status report.
    StatusResponse {
        /// The agent's status report as JSON.
        report: serde_json::Value,
    },
}

impl MessagePayload {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            MessagePayload::TaskAssignment { .. } => "task_assignment",
            MessagePayload::TaskCompleted { .. } => "task_completed",
            MessagePayload::TaskFailed { .. } => "task_failed",
            MessagePayload::Ping => "ping",
            MessagePayload::Pong { .. } => "pong",
            MessagePayload::StatusRequest => "status_request",
            MessagePayload::StatusResponse { .. } => "status_response",
        }
    }
}

/// Envelope for all agent ↔ orchestrator communication.
///
/// Purely in-memory; never persisted. Delivered through the mpsc channel the
/// orchestrator registers with each agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message ID.
    pub id: Uuid,
    /// Sender agent ID, or `"orchestrator"`.
    pub sender: String,
    /// Recipient agent ID, or `"orchestrator"`.
    pub recipient: String,
    /// The message payload.
    pub payload: MessagePayload,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Delivery priority within an inbox (lower = sooner).
    #[serde(default = "default_message_priority")]
    pub priority: i32,
}

impl AgentMessage {
    /// Sender/recipient name used by the coordinator side.
    pub const ORCHESTRATOR: &'static str = "orchestrator";

    /// Create a message with default priority.
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            recipient: recipient.into(),
            payload,
            timestamp: Utc::now(),
            priority: default_message_priority(),
        }
    }

    /// Set the delivery priority (lower = sooner).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Shorthand for an orchestrator-bound message.
    pub fn to_orchestrator(sender: impl Into<String>, payload: MessagePayload) -> Self {
        Self::new(sender, Self::ORCHESTRATOR, payload)
    }
}
