use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::agents::{AgentArgs, AgentExecutor, AgentOutcome};

/// Logs the step instruction at info level. Leaves context untouched.
pub struct LogAgent;

#[async_trait]
impl AgentExecutor for LogAgent {
    fn agent_type(&self) -> &str {
        "system.log"
    }

    fn description(&self) -> &str {
        "Log the instruction at info level"
    }

    async fn execute(&self, args: AgentArgs) -> Result<AgentOutcome> {
        info!(
            workspace_id = %args.workspace_id,
            step_id = %args.step_id,
            "{}",
            args.instruction
        );

        Ok(AgentOutcome {
            output: serde_json::json!({ "logged": true }),
            ..Default::default()
        })
    }
}
