use standor_agent::{AgentHandle, AgentStatusReport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The live agent roster, behind a single internal lock.
///
/// The lock guards the map only; agent handles are `Arc`-shared, so status
/// queries and assignments never hold the roster lock across agent-internal
/// locking.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<AgentHandle>>>,
}

impl AgentRegistry {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Register an agent under its own ID.
    pub async fn insert(&self, agent: Arc<AgentHandle>) {
        self.agents
            .write()
            .await
            .insert(agent.id().to_string(), agent);
    }

    /// Remove and return an agent.
    pub async fn remove(&self, agent_id: &str) -> Option<Arc<AgentHandle>> {
        self.agents.write().await.remove(agent_id)
    }

    /// Look an agent up by ID.
    pub async fn get(&self, agent_id: &str) -> Option<Arc<AgentHandle>> {
        self.agents.read().await.get(agent_id).cloned()
    }

    /// Whether an agent with this ID is registered.
    pub async fn contains(&self, agent_id: &str) -> bool {
        self.agents.read().await.contains_key(agent_id)
    }

    /// All registered agent IDs.
    pub async fn ids(&self) -> Vec<String> {
        self.agents.read().await.keys().cloned().collect()
    }

    /// All registered agents.
    pub async fn all(&self) -> Vec<Arc<AgentHandle>> {
        self.agents.read().await.values().cloned().collect()
    }

    /// Number of registered agents.
    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Whether the roster is empty.
    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Drain the roster, returning every agent.
    pub async fn drain(&self) -> Vec<Arc<AgentHandle>> {
        self.agents.write().await.drain().map(|(_, a)| a).collect()
    }

    /// Status reports for every agent, in stable ID order.
    pub async fn reports(&self) -> Vec<AgentStatusReport> {
        let agents = self.all().await;
        let mut reports = Vec::with_capacity(agents.len());
        for agent in agents {
            reports.push(agent.status_report().await);
        }
        reports.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        reports
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
