//! End-of-session reporting.

use crate::adaptation::{AdaptationDecision, DecisionEngine};
use crate::affect::AffectState;
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Write-once report assembled when a session completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    /// The most recent topic label, if the backend supplied any.
    pub topic: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub chunks_delivered: u64,
    pub topics_seen: Vec<String>,
    pub affect_distribution: HashMap<AffectState, u64>,
    pub average_confidence: f32,
    pub questions_asked: usize,
    pub adaptations: Vec<AdaptationDecision>,
}

impl SessionSummary {
    pub fn compute(
        session: &Session,
        ended_at: DateTime<Utc>,
        chunks_delivered: u64,
        topics_seen: Vec<String>,
        engine: &DecisionEngine,
        questions_asked: usize,
    ) -> Self {
        let topic = topics_seen.last().cloned();
        Self {
            session_id: session.id,
            topic,
            started_at: session.created_at,
            ended_at,
            duration_secs: (ended_at - session.created_at).num_seconds(),
            chunks_delivered,
            topics_seen,
            affect_distribution: engine.affect_distribution().clone(),
            average_confidence: engine.average_confidence(),
            questions_asked,
            adaptations: engine.decisions().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptation::InMemoryVariantStore;
    use crate::affect::AffectSample;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_summary_reflects_session_activity() {
        let session = Session::new();
        let mut engine = DecisionEngine::new(Arc::new(InMemoryVariantStore::new()), 0.5);
        engine
            .on_sample(AffectSample::new(AffectState::Engaged, 0.9), None)
            .await;
        engine
            .on_sample(AffectSample::new(AffectState::Confused, 0.7), None)
            .await;

        let ended_at = session.created_at + Duration::seconds(125);
        let summary = SessionSummary::compute(
            &session,
            ended_at,
            7,
            vec!["Cells".to_string(), "Mitosis".to_string()],
            &engine,
            2,
        );

        assert_eq!(summary.session_id, session.id);
        assert_eq!(summary.topic.as_deref(), Some("Mitosis"));
        assert_eq!(summary.duration_secs, 125);
        assert_eq!(summary.chunks_delivered, 7);
        assert_eq!(summary.questions_asked, 2);
        assert_eq!(summary.affect_distribution[&AffectState::Engaged], 1);
        assert_eq!(summary.affect_distribution[&AffectState::Confused], 1);
        assert!(summary.adaptations.is_empty());
    }

    #[tokio::test]
    async fn test_summary_round_trips_through_json() {
        let session = Session::new();
        let engine = DecisionEngine::new(Arc::new(InMemoryVariantStore::new()), 0.5);
        let summary = SessionSummary::compute(&session, Utc::now(), 0, vec![], &engine, 0);

        let json = serde_json::to_string(&summary).unwrap();
        let back: SessionSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, summary.session_id);
        assert_eq!(back.chunks_delivered, 0);
    }
}
