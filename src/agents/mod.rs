pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::engine::types::Context;

/// Inputs handed to an agent executor for one step attempt.
#[derive(Debug, Clone)]
pub struct AgentArgs {
    pub workspace_id: String,
    pub instruction: String,
    /// Snapshot of the run context at invocation time.
    pub context: Context,
    pub step_index: usize,
    pub step_id: String,
}

/// What an agent reports back on success. `context_patch` is shallow-
/// merged into the run context; the accounting fields are passed through
/// for external billing/usage dashboards.
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    pub output: serde_json::Value,
    pub context_patch: Option<Context>,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub usd_cost: Option<f64>,
}

/// Trait that all agent executors implement. Executors are treated as
/// untrusted: errors they return are handled by the advancer, never
/// propagated as a crash.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Capability key (e.g. "system.echo").
    fn agent_type(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    async fn execute(&self, args: AgentArgs) -> Result<AgentOutcome>;
}

/// Registry mapping capability keys to executors.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn AgentExecutor>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Create a registry with all built-in agents registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register an agent implementation.
    pub fn register(&mut self, agent: Arc<dyn AgentExecutor>) {
        self.agents.insert(agent.agent_type().to_string(), agent);
    }

    /// Resolve a capability key to an executor. Resolution never fails:
    /// an unregistered type degrades to a no-op fallback so a run can't
    /// wedge forever on a missing capability.
    pub fn resolve(&self, agent_type: &str) -> Arc<dyn AgentExecutor> {
        self.agents.get(agent_type).cloned().unwrap_or_else(|| {
            Arc::new(FallbackAgent {
                agent_type: agent_type.to_string(),
            })
        })
    }

    /// Look up an agent by capability key without the fallback.
    pub fn get(&self, agent_type: &str) -> Option<Arc<dyn AgentExecutor>> {
        self.agents.get(agent_type).cloned()
    }

    /// List all registered agent types with descriptions.
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .agents
            .values()
            .map(|a| (a.agent_type(), a.description()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }
}

/// Stand-in executor for unknown agent types: succeeds trivially with a
/// diagnostic note instead of failing the step.
struct FallbackAgent {
    agent_type: String,
}

#[async_trait]
impl AgentExecutor for FallbackAgent {
    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    fn description(&self) -> &str {
        "No-op fallback for unregistered agent types"
    }

    async fn execute(&self, _args: AgentArgs) -> Result<AgentOutcome> {
        warn!(agent_type = %self.agent_type, "no executor registered, treating step as no-op");
        Ok(AgentOutcome {
            output: serde_json::json!({
                "note": "No executor registered for agentType",
                "agentType": self.agent_type,
            }),
            ..Default::default()
        })
    }
}
