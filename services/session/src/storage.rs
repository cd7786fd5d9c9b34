//! JSON-file persistence for session summaries and lesson progress.
//!
//! One file per session under a base directory. The session runtime treats
//! every failure here as log-and-continue; nothing in this module may take
//! a session down.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairos_core::storage::SummaryStore;
use kairos_core::summary::SessionSummary;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct ProgressRecord {
    session_id: Uuid,
    topic: String,
    reached_at: DateTime<Utc>,
}

/// Writes summaries and progress marks as pretty-printed JSON files.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SummaryStore for JsonFileStore {
    async fn save_summary(&self, summary: &SessionSummary) -> Result<()> {
        self.write_json(&format!("lesson-{}.json", summary.session_id), summary)
            .await?;
        info!(session_id = %summary.session_id, "session summary persisted");
        Ok(())
    }

    async fn save_progress(&self, session_id: Uuid, topic: &str) -> Result<()> {
        let name = format!("progress-{}.json", session_id);
        let path = self.dir.join(&name);

        let mut records: Vec<ProgressRecord> = match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(_) => Vec::new(),
        };
        records.push(ProgressRecord {
            session_id,
            topic: topic.to_string(),
            reached_at: Utc::now(),
        });
        self.write_json(&name, &records).await
    }
}
