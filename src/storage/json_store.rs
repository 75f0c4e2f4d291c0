use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::engine::types::{Run, RunStatus};
use crate::storage::{RunMutation, RunStore, TxOutcome};

/// File-based run store. Each run is one JSON file; writes go through a
/// temp file and rename. The store-wide lock serializes mutations, which
/// gives `mutate_run` compare-and-set semantics within a single process.
/// Deployments with multiple runner processes on separate hosts need a
/// backend with real transactions instead.
pub struct JsonRunStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl JsonRunStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", run_id))
    }

    async fn read_run(&self, run_id: &str) -> Result<Option<Run>> {
        let path = self.run_path(run_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read run file: {}", path.display()));
            }
        };
        let run: Run = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse run: {}", run_id))?;
        Ok(Some(run))
    }

    async fn write_run(&self, run: &Run) -> Result<()> {
        let path = self.run_path(&run.id);
        let tmp_path = path.with_extension("json.tmp");

        let data = serde_json::to_string_pretty(run)?;
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(())
    }
}

#[async_trait]
impl RunStore for JsonRunStore {
    async fn create_run(&self, run: &Run) -> Result<()> {
        let _lock = self.lock.write().await;
        tokio::fs::create_dir_all(&self.base_dir).await?;
        self.write_run(run).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        let _lock = self.lock.read().await;
        self.read_run(run_id).await
    }

    async fn mutate_run(&self, run_id: &str, mutation: RunMutation<'_>) -> Result<TxOutcome> {
        let _lock = self.lock.write().await;
        let Some(mut run) = self.read_run(run_id).await? else {
            return Ok(TxOutcome::NotFound);
        };
        if !mutation(&mut run) {
            return Ok(TxOutcome::Rejected);
        }
        self.write_run(&run).await?;
        Ok(TxOutcome::Committed)
    }

    async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<Run>> {
        let _lock = self.lock.read().await;

        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Ok(data) = tokio::fs::read_to_string(&path).await
                && let Ok(run) = serde_json::from_str::<Run>(&data)
            {
                if let Some(filter) = status
                    && run.status != filter
                {
                    continue;
                }
                runs.push(run);
            }
        }

        // Newest first
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(runs)
    }

    async fn list_runnable(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>> {
        let mut eligible: Vec<Run> = self
            .list_runs(None)
            .await?
            .into_iter()
            .filter(|r| !r.is_terminal() && r.is_runnable_at(now))
            .collect();
        eligible.sort_by_key(|r| (r.next_runnable_at, r.created_at));
        Ok(eligible.into_iter().take(limit).map(|r| r.id).collect())
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        let _lock = self.lock.write().await;
        let path = self.run_path(run_id);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}
