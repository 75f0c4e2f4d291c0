use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Deserialize;

/// Configuration loaded from `stepline.yaml`.
/// All fields are optional — missing fields fall back to CLI/env/defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SteplineConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub store_dir: Option<String>,
    /// Identity this process stamps into leases it acquires.
    pub runner_id: Option<String>,
    pub lease_ms: Option<i64>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub step_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub max_concurrent_runs: Option<usize>,
}

impl SteplineConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `stepline.yaml` in cwd; return
    ///   defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("stepline.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        let config: SteplineConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        Ok(config)
    }
}
