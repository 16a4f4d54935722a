use async_trait::async_trait;
use standor_core::{StandorResult, TaskDescriptor};
use std::collections::HashMap;

/// The plug-in seam between the orchestration core and concrete agent logic.
///
/// Implementations carry the actual discovery/retrieval/processing/validation
/// behavior; the core never inspects the returned payload beyond the
/// optional `tokens_used`, `cost`, and `quality_score` fields it folds into
/// execution metrics. A failure is reported upward as a `task_failed`
/// message and terminates the task — the core does not retry on its own.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute one task and return its opaque result payload.
    async fn process_task(&self, task: &TaskDescriptor) -> StandorResult<serde_json::Value>;

    /// Mapping from executor operations to LLM task-type labels, for
    /// executors backed by a model-routing layer. The orchestration core
    /// never reads this.
    fn llm_task_kinds(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}
