pub mod context_agent;
pub mod echo_agent;
pub mod log_agent;

use std::sync::Arc;

use crate::agents::AgentRegistry;

/// Register all built-in agents.
pub fn register_all(registry: &mut AgentRegistry) {
    registry.register(Arc::new(echo_agent::EchoAgent));
    registry.register(Arc::new(log_agent::LogAgent));
    registry.register(Arc::new(context_agent::ContextSetAgent));
}
