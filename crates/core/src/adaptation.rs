//! Affect-driven adaptation: strategy selection, dedup and the decision log.
//!
//! The engine owns the bounded affect history and the bounded decision log.
//! It never reaches into the pacing queue; it only tells the session
//! runtime whether the displayed chunk should be swapped for a variant.

use crate::affect::{AffectSample, AffectState};
use crate::chunk::ContentChunk;
use crate::history::BoundedLog;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

/// Most recent affect samples retained for inspection.
pub const AFFECT_HISTORY_CAPACITY: usize = 50;
/// Most recent adaptation decisions retained for reporting.
pub const DECISION_LOG_CAPACITY: usize = 20;
/// Samples below this confidence never trigger an adaptation.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// A named content-substitution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationStrategy {
    VisualExplanation,
    Gamification,
    Analogy,
    BreakSuggestion,
    Simplification,
}

impl fmt::Display for AdaptationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdaptationStrategy::VisualExplanation => write!(f, "visual_explanation"),
            AdaptationStrategy::Gamification => write!(f, "gamification"),
            AdaptationStrategy::Analogy => write!(f, "analogy"),
            AdaptationStrategy::BreakSuggestion => write!(f, "break_suggestion"),
            AdaptationStrategy::Simplification => write!(f, "simplification"),
        }
    }
}

/// Primary strategy and its fallback for an adaptation-worthy state.
/// `None` for states that never interrupt.
pub fn strategy_for(state: AffectState) -> Option<(AdaptationStrategy, AdaptationStrategy)> {
    match state {
        AffectState::Confused => Some((
            AdaptationStrategy::VisualExplanation,
            AdaptationStrategy::Simplification,
        )),
        AffectState::Bored => Some((
            AdaptationStrategy::Gamification,
            AdaptationStrategy::Analogy,
        )),
        AffectState::Frustrated => Some((
            AdaptationStrategy::Simplification,
            AdaptationStrategy::BreakSuggestion,
        )),
        AffectState::Engaged | AffectState::Neutral => None,
    }
}

/// Human-readable rationale shown alongside an applied decision.
pub fn rationale(state: AffectState, strategy: AdaptationStrategy) -> &'static str {
    match (state, strategy) {
        (AffectState::Confused, AdaptationStrategy::VisualExplanation) => {
            "Switched to visual explanation to clarify concepts"
        }
        (AffectState::Confused, AdaptationStrategy::Simplification) => {
            "Simplified the explanation for better understanding"
        }
        (AffectState::Bored, AdaptationStrategy::Gamification) => {
            "Added interactive challenge to increase engagement"
        }
        (AffectState::Bored, AdaptationStrategy::Analogy) => {
            "Used real-world analogy to make it more interesting"
        }
        (AffectState::Frustrated, AdaptationStrategy::Simplification) => {
            "Broke down into simpler steps"
        }
        (AffectState::Frustrated, AdaptationStrategy::BreakSuggestion) => {
            "Suggested taking a short break"
        }
        _ => "Adapted content based on your emotional state",
    }
}

/// One adaptation decision, recorded whether or not a variant existed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationDecision {
    pub id: Uuid,
    pub strategy: AdaptationStrategy,
    pub target_chunk: Uuid,
    pub rationale: String,
    /// False when no variant was registered and content stayed unchanged.
    pub applied: bool,
    pub timestamp: DateTime<Utc>,
}

/// External store of pre-authored content variants.
///
/// Absence of a variant is a normal outcome, not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VariantStore: Send + Sync {
    async fn variant_for(
        &self,
        chunk: &ContentChunk,
        strategy: AdaptationStrategy,
    ) -> Result<Option<ContentChunk>>;
}

/// In-memory `VariantStore` keyed by chunk id, for demos and tests.
#[derive(Debug, Default)]
pub struct InMemoryVariantStore {
    variants: Mutex<HashMap<(Uuid, AdaptationStrategy), ContentChunk>>,
}

impl InMemoryVariantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, chunk_id: Uuid, strategy: AdaptationStrategy, variant: ContentChunk) {
        self.variants
            .lock()
            .expect("variant map lock poisoned")
            .insert((chunk_id, strategy), variant);
    }
}

#[async_trait]
impl VariantStore for InMemoryVariantStore {
    async fn variant_for(
        &self,
        chunk: &ContentChunk,
        strategy: AdaptationStrategy,
    ) -> Result<Option<ContentChunk>> {
        let variants = self.variants.lock().expect("variant map lock poisoned");
        Ok(variants.get(&(chunk.id, strategy)).cloned())
    }
}

/// What the runtime should do with a sample that crossed the thresholds.
#[derive(Debug, Clone)]
pub enum AdaptationOutcome {
    /// Swap the displayed chunk for this variant.
    Substitute {
        decision: AdaptationDecision,
        variant: ContentChunk,
    },
    /// No variant existed for either strategy; the attempt was recorded
    /// and content stays unchanged.
    Unchanged { decision: AdaptationDecision },
}

/// Maps affect samples to adaptation decisions.
pub struct DecisionEngine {
    store: Arc<dyn VariantStore>,
    confidence_threshold: f32,
    samples: BoundedLog<AffectSample>,
    decisions: BoundedLog<AdaptationDecision>,
    adapted_chunks: HashSet<Uuid>,
    distribution: HashMap<AffectState, u64>,
    confidence_sum: f64,
    sample_count: u64,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn VariantStore>, confidence_threshold: f32) -> Self {
        Self {
            store,
            confidence_threshold: confidence_threshold.clamp(0.0, 1.0),
            samples: BoundedLog::new(AFFECT_HISTORY_CAPACITY),
            decisions: BoundedLog::new(DECISION_LOG_CAPACITY),
            adapted_chunks: HashSet::new(),
            distribution: HashMap::new(),
            confidence_sum: 0.0,
            sample_count: 0,
        }
    }

    /// Feeds one sample through the decision policy.
    ///
    /// Every sample lands in the history and the distribution counters.
    /// An outcome is produced only when the state is adaptation-worthy,
    /// the confidence clears the threshold, something is on screen, and
    /// that chunk has not been adapted before.
    pub async fn on_sample(
        &mut self,
        sample: AffectSample,
        target: Option<&ContentChunk>,
    ) -> Option<AdaptationOutcome> {
        self.samples.push(sample);
        *self.distribution.entry(sample.state).or_insert(0) += 1;
        self.confidence_sum += f64::from(sample.confidence);
        self.sample_count += 1;

        let (primary, fallback) = strategy_for(sample.state)?;
        if sample.confidence < self.confidence_threshold {
            return None;
        }
        let target = target?;
        if self.adapted_chunks.contains(&target.id) {
            return None;
        }

        // Primary strategy first, fallback once, then degrade silently.
        let (strategy, variant) = match self.lookup(target, primary).await {
            Some(v) => (primary, Some(v)),
            None => match self.lookup(target, fallback).await {
                Some(v) => (fallback, Some(v)),
                None => (primary, None),
            },
        };

        self.adapted_chunks.insert(target.id);
        let decision = AdaptationDecision {
            id: Uuid::new_v4(),
            strategy,
            target_chunk: target.id,
            rationale: rationale(sample.state, strategy).to_string(),
            applied: variant.is_some(),
            timestamp: Utc::now(),
        };
        self.decisions.push(decision.clone());

        Some(match variant {
            Some(variant) => AdaptationOutcome::Substitute { decision, variant },
            None => AdaptationOutcome::Unchanged { decision },
        })
    }

    async fn lookup(
        &self,
        chunk: &ContentChunk,
        strategy: AdaptationStrategy,
    ) -> Option<ContentChunk> {
        match self.store.variant_for(chunk, strategy).await {
            Ok(variant) => variant,
            Err(e) => {
                warn!(error = ?e, %strategy, "variant store lookup failed; treating as absent");
                None
            }
        }
    }

    pub fn decisions(&self) -> impl Iterator<Item = &AdaptationDecision> {
        self.decisions.iter()
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    pub fn samples(&self) -> impl Iterator<Item = &AffectSample> {
        self.samples.iter()
    }

    /// Full-session histogram, distinct from the bounded recency ring.
    pub fn affect_distribution(&self) -> &HashMap<AffectState, u64> {
        &self.distribution
    }

    pub fn average_confidence(&self) -> f32 {
        if self.sample_count == 0 {
            return 0.0;
        }
        (self.confidence_sum / self.sample_count as f64) as f32
    }
}
