use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::agents::{AgentArgs, AgentExecutor, AgentOutcome};
use crate::engine::types::Context;

/// Merges a JSON object given as the instruction into the run context.
/// Fails if the instruction is not a JSON object.
pub struct ContextSetAgent;

#[async_trait]
impl AgentExecutor for ContextSetAgent {
    fn agent_type(&self) -> &str {
        "context.set"
    }

    fn description(&self) -> &str {
        "Merge a JSON object instruction into the run context"
    }

    async fn execute(&self, args: AgentArgs) -> Result<AgentOutcome> {
        let value: serde_json::Value = serde_json::from_str(&args.instruction)
            .map_err(|e| anyhow::anyhow!("instruction is not valid JSON: {}", e))?;

        let serde_json::Value::Object(map) = value else {
            bail!("context.set instruction must be a JSON object");
        };

        let patch: Context = map.into_iter().collect();
        let keys: Vec<&String> = patch.keys().collect();
        let output = serde_json::json!({ "keys": keys });

        Ok(AgentOutcome {
            output,
            context_patch: Some(patch),
            ..Default::default()
        })
    }
}
