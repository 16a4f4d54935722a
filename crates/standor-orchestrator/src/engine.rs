use crate::board::TaskBoard;
use crate::config::OrchestratorConfig;
use crate::health::HealthMonitor;
use crate::registry::AgentRegistry;
use crate::scheduler;
use crate::types::{
    AgentStatusEntry, CategoryProgress, CategoryStatus, SystemMetrics, SystemStatus, TaskRecord,
    TaskStatus,
};
use standor_agent::{AgentHandle, TaskExecutor};
use standor_core::{AgentKind, AgentMessage, AgentStatus, MessagePayload, StandorResult, TaskKind};
use standor_recovery::RecoveryManager;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Factory producing the concrete executor for a newly provisioned agent of
/// the given kind and category. Called at startup and on every restart.
pub type ExecutorFactory = Arc<dyn Fn(AgentKind, &str) -> Box<dyn TaskExecutor> + Send + Sync>;

/// The central coordinator: owns the task board, the agent roster, the
/// scheduler, the health monitor, and the recovery manager, and runs the
/// main loop tying them together.
///
/// The engine is designed to degrade, not die: a failed tick is logged and
/// followed by a longer backoff sleep, a failed checkpoint means no
/// checkpoint this cycle, and `get_system_status` always answers.
pub struct Orchestrator {
    config: OrchestratorConfig,
    board: TaskBoard,
    registry: AgentRegistry,
    recovery: Arc<RecoveryManager>,
    factory: ExecutorFactory,
    health: HealthMonitor,
    running: AtomicBool,
    categories: RwLock<Vec<String>>,
    progress: RwLock<HashMap<String, CategoryProgress>>,
    metrics: RwLock<SystemMetrics>,
    report_tx: RwLock<Option<mpsc::UnboundedSender<AgentMessage>>>,
    main_task: Mutex<Option<JoinHandle<()>>>,
    pump_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Create an engine. Nothing runs until [`Orchestrator::start_system`].
    pub fn new(
        config: OrchestratorConfig,
        recovery: Arc<RecoveryManager>,
        factory: ExecutorFactory,
    ) -> Self {
        let health = HealthMonitor::new(config.heartbeat_timeout(), config.restart_ceiling);
        Self {
            config,
            board: TaskBoard::new(),
            registry: AgentRegistry::new(),
            recovery,
            factory,
            health,
            running: AtomicBool::new(false),
            categories: RwLock::new(Vec::new()),
            progress: RwLock::new(HashMap::new()),
            metrics: RwLock::new(SystemMetrics::default()),
            report_tx: RwLock::new(None),
            main_task: Mutex::new(None),
            pump_task: Mutex::new(None),
        }
    }

    /// The canonical task board.
    pub fn board(&self) -> &TaskBoard {
        &self.board
    }

    /// The live agent roster.
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// The recovery manager.
    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    /// Whether the main loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Provision the fleet for the given categories, start every agent and
    /// the main loop, and write a startup checkpoint. Idempotent: a second
    /// call while running is a no-op returning `true`. Returns `false` when
    /// given no categories to work on.
    pub async fn start_system(self: &Arc<Self>, categories: Vec<String>) -> bool {
        if categories.is_empty() {
            warn!("refusing to start with no categories");
            return false;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("system is already running");
            return true;
        }

        info!(categories = ?categories, "starting orchestrator");
        *self.categories.write().await = categories.clone();
        {
            let mut progress = self.progress.write().await;
            progress.clear();
            for category in &categories {
                progress.insert(category.clone(), CategoryProgress::default());
            }
        }

        self.recovery.start_auto_save().await;

        let (tx, rx) = mpsc::unbounded_channel();
        *self.report_tx.write().await = Some(tx.clone());

        for (kind, category) in fleet_plan(&self.config, &categories) {
            self.spawn_agent(kind, &category, Some(tx.clone())).await;
        }
        info!(agents = self.registry.len().await, "fleet provisioned");

        self.checkpoint("orchestrator_startup").await;

        let pump = Arc::clone(self);
        *self.pump_task.lock().await = Some(tokio::spawn(pump.pump(rx)));
        let engine = Arc::clone(self);
        *self.main_task.lock().await = Some(tokio::spawn(engine.main_loop()));

        info!("orchestrator started");
        true
    }

    /// Stop the main loop, every agent, and auto-save, and write a shutdown
    /// checkpoint. Idempotent.
    pub async fn stop_system(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("system is not running");
            return true;
        }
        info!("stopping orchestrator");

        if let Some(mut handle) = self.main_task.lock().await.take() {
            let budget = self.config.tick_interval()
                + self.config.error_backoff()
                + Duration::from_millis(500);
            if tokio::time::timeout(budget, &mut handle).await.is_err() {
                warn!("main loop did not stop within budget, aborting");
                handle.abort();
            }
        }

        for agent in self.registry.drain().await {
            agent.stop().await;
        }

        *self.report_tx.write().await = None;
        if let Some(mut handle) = self.pump_task.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(1), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }

        self.recovery.stop_auto_save().await;
        self.checkpoint("orchestrator_shutdown").await;

        info!("orchestrator stopped");
        true
    }

    /// Enqueue a task; returns its generated ID immediately. Thread-safe
    /// and fire-and-forget — assignment happens on the next tick.
    pub async fn add_task(
        &self,
        kind: TaskKind,
        category: impl Into<String>,
        parameters: HashMap<String, serde_json::Value>,
        priority: i32,
    ) -> String {
        let record = TaskRecord::new(kind, category, parameters, priority)
            .with_deadline_secs(self.config.task_deadline_secs);
        let id = self.board.add(record).await;
        info!(task_id = %id, kind = %kind, priority, "task enqueued");
        id
    }

    /// Cancel a task that is still pending. In-flight tasks are never
    /// preempted.
    pub async fn cancel_task(&self, task_id: &str) -> bool {
        match self.board.cancel(task_id).await {
            Ok(()) => {
                info!(task_id = %task_id, "task cancelled");
                true
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "cancel refused");
                false
            }
        }
    }

    /// Aggregate status snapshot. Never fails; reflects best-known state
    /// even mid-degradation.
    pub async fn get_system_status(&self) -> SystemStatus {
        let mut agents = HashMap::new();
        for report in self.registry.reports().await {
            agents.insert(
                report.agent_id.clone(),
                AgentStatusEntry {
                    kind: report.kind,
                    status: report.status,
                    category: report.category,
                    current_task: report.current_task,
                    last_heartbeat: report.last_heartbeat,
                    error_count: report.error_count,
                    tasks_completed: report.stats.tasks_completed,
                    success_rate: report.stats.success_rate,
                },
            );
        }

        SystemStatus {
            is_running: self.is_running(),
            agents,
            tasks: self.board.counts().await,
            category_progress: self.progress.read().await.clone(),
            system_metrics: self.metrics.read().await.clone(),
            categories: self.categories.read().await.clone(),
        }
    }

    /// Manually trigger the restart path the health sweep uses: stop the
    /// agent, provision a fresh one of the same kind and category under a
    /// new ID, and swap it into the roster.
    pub async fn force_agent_restart(&self, agent_id: &str) -> bool {
        self.restart_agent(agent_id).await.is_some()
    }

    async fn restart_agent(&self, agent_id: &str) -> Option<String> {
        let Some(agent) = self.registry.remove(agent_id).await else {
            error!(agent_id = %agent_id, "cannot restart unknown agent");
            return None;
        };
        let kind = agent.kind();
        let category = agent.category().to_string();
        agent.stop().await;

        let tx = self.report_tx.read().await.clone();
        let fresh = self.spawn_agent(kind, &category, tx).await;
        let new_id = fresh.id().to_string();
        info!(old_id = %agent_id, new_id = %new_id, "agent restarted");
        Some(new_id)
    }

    async fn spawn_agent(
        &self,
        kind: AgentKind,
        category: &str,
        tx: Option<mpsc::UnboundedSender<AgentMessage>>,
    ) -> Arc<AgentHandle> {
        let executor = (self.factory)(kind, category);
        let agent = Arc::new(AgentHandle::new(
            kind,
            category,
            self.config.agent_config(),
            executor,
        ));
        if let Some(tx) = tx {
            agent.register_coordinator(tx).await;
        }
        agent.start().await;
        self.registry.insert(Arc::clone(&agent)).await;
        agent
    }

    /// Drain the agent-report channel, keeping the task board in sync with
    /// what agents actually did.
    async fn pump(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<AgentMessage>) {
        while let Some(message) = rx.recv().await {
            self.handle_report(message).await;
        }
        debug!("report channel closed, pump exiting");
    }

    async fn handle_report(&self, message: AgentMessage) {
        let payload_kind = message.payload.kind();
        match message.payload {
            MessagePayload::TaskCompleted { task_id, result, .. } => {
                match self.board.complete(&task_id, result).await {
                    Ok(()) => {
                        info!(task_id = %task_id, agent_id = %message.sender, "task completed");
                    }
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "completion for unknown task");
                    }
                }
            }
            MessagePayload::TaskFailed { task_id, error, .. } => {
                match self
                    .board
                    .fail(&task_id, &error, self.config.max_task_retries)
                    .await
                {
                    Ok(TaskStatus::Pending) => {
                        info!(task_id = %task_id, "task re-queued after failed attempt");
                    }
                    Ok(_) => {
                        warn!(
                            task_id = %task_id,
                            agent_id = %message.sender,
                            error = %error,
                            "task failed"
                        );
                    }
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "failure report for unknown task");
                    }
                }
            }
            MessagePayload::Pong { agent_id, status } => {
                debug!(agent_id = %agent_id, status = %status, "pong");
            }
            MessagePayload::StatusResponse { .. } => {
                debug!(agent_id = %message.sender, "status response");
            }
            MessagePayload::TaskAssignment { .. }
            | MessagePayload::Ping
            | MessagePayload::StatusRequest => {
                debug!(
                    payload = payload_kind,
                    sender = %message.sender,
                    "dropping agent-bound payload on coordinator channel"
                );
            }
        }
    }

    /// One tick every `tick_interval`: heartbeat check, assignment pass,
    /// progress and metrics refresh, health sweep, and a periodic
    /// checkpoint. A failed tick is logged and followed by the longer
    /// backoff sleep.
    async fn main_loop(self: Arc<Self>) {
        info!("orchestrator main loop started");
        while self.running.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(()) => tokio::time::sleep(self.config.tick_interval()).await,
                Err(e) => {
                    error!(error = %e, "orchestrator tick failed, backing off");
                    tokio::time::sleep(self.config.error_backoff()).await;
                }
            }
        }
        info!("orchestrator main loop ended");
    }

    async fn tick(&self) -> StandorResult<()> {
        self.health.check_heartbeats(&self.registry).await;

        scheduler::run_assignment_pass(&self.board, &self.registry).await;

        self.update_progress().await;
        self.update_metrics().await;

        for agent_id in self.health.agents_needing_restart(&self.registry).await {
            let _ = self.restart_agent(&agent_id).await;
        }
        let exhausted = self.health.exhausted_agents(&self.registry).await;
        if !exhausted.is_empty() {
            warn!(agents = ?exhausted, "agents past restart ceiling need operator attention");
        }

        if self
            .recovery
            .should_checkpoint(self.config.checkpoint_interval())
            .await
        {
            self.checkpoint("orchestrator_periodic").await;
        }

        Ok(())
    }

    async fn update_progress(&self) {
        let tallies = self.board.category_tallies().await;
        let reports = self.registry.reports().await;
        let categories = self.categories.read().await.clone();

        let mut progress = self.progress.write().await;
        for category in &categories {
            let entry = progress.entry(category.clone()).or_default();
            entry.active_agents = reports
                .iter()
                .filter(|r| {
                    r.category == *category
                        && matches!(r.status, AgentStatus::Idle | AgentStatus::Running)
                })
                .count();

            let total = match tallies.get(category) {
                Some(tally) => {
                    entry.tasks_completed = tally.completed;
                    entry.tasks_failed = tally.failed;
                    if tally.total > 0 {
                        let percent = tally.completed as f64 / tally.total as f64 * 100.0;
                        // The known total can grow as tasks are added, so
                        // the reported percentage only ever ratchets up.
                        entry.percent_complete = entry.percent_complete.max(percent);
                    }
                    tally.total
                }
                None => 0,
            };

            entry.status = if total == 0 {
                CategoryStatus::NotStarted
            } else if entry.percent_complete >= 100.0 {
                CategoryStatus::Completed
            } else {
                CategoryStatus::InProgress
            };
            entry.last_update = chrono::Utc::now();
        }
    }

    async fn update_metrics(&self) {
        let counts = self.board.counts().await;
        let reports = self.registry.reports().await;
        let active = reports
            .iter()
            .filter(|r| matches!(r.status, AgentStatus::Idle | AgentStatus::Running))
            .count();
        let category_count = self.categories.read().await.len().max(1);

        let mut metrics = self.metrics.write().await;
        metrics.tasks_processed = (counts.completed + counts.failed) as u64;
        metrics.tasks_failed = counts.failed as u64;
        metrics.active_agents = active;
        metrics.system_efficiency = (active as f64 / (category_count * 2) as f64).min(1.0);
        metrics.last_update = chrono::Utc::now();
    }

    /// Snapshot current status into the recovery manager and write a named
    /// checkpoint. Failures degrade to "no checkpoint this cycle".
    async fn checkpoint(&self, name: &str) {
        let status = self.get_system_status().await;
        match serde_json::to_value(&status) {
            Ok(state) => self.recovery.set_current_state(state).await,
            Err(e) => {
                warn!(error = %e, "could not serialize system status for checkpoint");
                return;
            }
        }
        let additional = serde_json::json!({
            "task_counts": status.tasks,
            "agent_count": status.agents.len(),
        });
        if let Err(e) = self.recovery.create_checkpoint(name, additional).await {
            warn!(checkpoint = name, error = %e, "checkpoint skipped this cycle");
        }
    }
}

/// The fleet provisioned for a category list: one discovery agent per
/// category, a shared retrieval pool split evenly (at least one per
/// category), processing agents at two per category up to the cap, and
/// validation agents at one per category up to the cap — the latter two
/// assigned round-robin.
pub(crate) fn fleet_plan(
    config: &OrchestratorConfig,
    categories: &[String],
) -> Vec<(AgentKind, String)> {
    let mut plan = Vec::new();
    let n = categories.len();
    if n == 0 {
        return plan;
    }

    for category in categories {
        plan.push((AgentKind::Discovery, category.clone()));
    }

    let retrieval_per_category = (config.retrieval_pool / n).max(1);
    for category in categories {
        for _ in 0..retrieval_per_category {
            plan.push((AgentKind::Retrieval, category.clone()));
        }
    }

    let processing = (n * 2).min(config.processing_pool_cap);
    for i in 0..processing {
        plan.push((AgentKind::Processing, categories[i % n].clone()));
    }

    let validation = n.min(config.validation_pool_cap);
    for i in 0..validation {
        plan.push((AgentKind::Validation, categories[i % n].clone()));
    }

    plan
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn categories(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn count_kind(plan: &[(AgentKind, String)], kind: AgentKind) -> usize {
        plan.iter().filter(|(k, _)| *k == kind).count()
    }

    #[test]
    fn test_fleet_plan_two_categories() {
        let plan = fleet_plan(
            &OrchestratorConfig::default(),
            &categories(&["Physics", "Biology"]),
        );
        assert_eq!(count_kind(&plan, AgentKind::Discovery), 2);
        assert_eq!(count_kind(&plan, AgentKind::Retrieval), 20);
        assert_eq!(count_kind(&plan, AgentKind::Processing), 4);
        assert_eq!(count_kind(&plan, AgentKind::Validation), 2);
    }

    #[test]
    fn test_fleet_plan_caps_apply() {
        let names: Vec<String> = (0..30).map(|i| format!("Category {i}")).collect();
        let plan = fleet_plan(&OrchestratorConfig::default(), &names);
        assert_eq!(count_kind(&plan, AgentKind::Discovery), 30);
        // Pool smaller than the category count still yields one each.
        assert_eq!(count_kind(&plan, AgentKind::Retrieval), 30);
        assert_eq!(count_kind(&plan, AgentKind::Processing), 15);
        assert_eq!(count_kind(&plan, AgentKind::Validation), 5);
    }

    #[test]
    fn test_fleet_plan_empty_categories() {
        assert!(fleet_plan(&OrchestratorConfig::default(), &[]).is_empty());
    }

    #[test]
    fn test_discovery_agents_match_their_category() {
        let plan = fleet_plan(
            &OrchestratorConfig::default(),
            &categories(&["Physics", "Biology"]),
        );
        let discovery: Vec<&String> = plan
            .iter()
            .filter(|(k, _)| *k == AgentKind::Discovery)
            .map(|(_, c)| c)
            .collect();
        assert!(discovery.contains(&&"Physics".to_string()));
        assert!(discovery.contains(&&"Biology".to_string()));
    }
}
