use anyhow::Result;
use async_trait::async_trait;

use crate::agents::{AgentArgs, AgentExecutor, AgentOutcome};
use crate::engine::types::Context;

/// Echoes the step instruction back and records it in context as
/// `lastEcho`. Mostly useful for wiring checks and tests.
pub struct EchoAgent;

#[async_trait]
impl AgentExecutor for EchoAgent {
    fn agent_type(&self) -> &str {
        "system.echo"
    }

    fn description(&self) -> &str {
        "Echo the instruction and record it as lastEcho in context"
    }

    async fn execute(&self, args: AgentArgs) -> Result<AgentOutcome> {
        let mut patch = Context::new();
        patch.insert(
            "lastEcho".to_string(),
            serde_json::Value::String(args.instruction.clone()),
        );

        Ok(AgentOutcome {
            output: serde_json::json!({ "echo": args.instruction }),
            context_patch: Some(patch),
            ..Default::default()
        })
    }
}
