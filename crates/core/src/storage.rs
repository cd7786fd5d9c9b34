//! Persistence seams.
//!
//! Durable storage is an external collaborator: the session calls it at
//! topic boundaries and at completion, and treats failures as
//! log-and-continue rather than session-fatal.

use crate::summary::SessionSummary;
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Persists the end-of-session report.
    async fn save_summary(&self, summary: &SessionSummary) -> Result<()>;

    /// Marks a topic as reached within a session.
    async fn save_progress(&self, session_id: Uuid, topic: &str) -> Result<()>;
}

/// Store that drops everything, for tests and storage-less runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSummaryStore;

#[async_trait]
impl SummaryStore for NoopSummaryStore {
    async fn save_summary(&self, _summary: &SessionSummary) -> Result<()> {
        Ok(())
    }

    async fn save_progress(&self, _session_id: Uuid, _topic: &str) -> Result<()> {
        Ok(())
    }
}
