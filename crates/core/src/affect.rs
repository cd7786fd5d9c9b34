//! Learner affect signals.
//!
//! A sample is a timestamped classification of the learner's emotional
//! state with a confidence score. The session core is agnostic to where
//! samples come from (live inference, server-side classification, or a
//! scripted sequence for testing).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of recognized emotional states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffectState {
    Engaged,
    Confused,
    Bored,
    Frustrated,
    Neutral,
}

impl AffectState {
    pub const ALL: [AffectState; 5] = [
        AffectState::Engaged,
        AffectState::Confused,
        AffectState::Bored,
        AffectState::Frustrated,
        AffectState::Neutral,
    ];

    /// States that warrant adapting the lesson. Engaged and neutral never do.
    pub fn warrants_adaptation(self) -> bool {
        matches!(
            self,
            AffectState::Confused | AffectState::Bored | AffectState::Frustrated
        )
    }
}

impl fmt::Display for AffectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffectState::Engaged => write!(f, "engaged"),
            AffectState::Confused => write!(f, "confused"),
            AffectState::Bored => write!(f, "bored"),
            AffectState::Frustrated => write!(f, "frustrated"),
            AffectState::Neutral => write!(f, "neutral"),
        }
    }
}

/// One affect classification, confidence clamped to [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AffectSample {
    pub state: AffectState,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl AffectSample {
    pub fn new(state: AffectState, confidence: f32) -> Self {
        Self {
            state,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_negative_states_warrant_adaptation() {
        assert!(AffectState::Confused.warrants_adaptation());
        assert!(AffectState::Bored.warrants_adaptation());
        assert!(AffectState::Frustrated.warrants_adaptation());
        assert!(!AffectState::Engaged.warrants_adaptation());
        assert!(!AffectState::Neutral.warrants_adaptation());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(AffectSample::new(AffectState::Engaged, 1.4).confidence, 1.0);
        assert_eq!(AffectSample::new(AffectState::Bored, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&AffectState::Frustrated).unwrap();
        assert_eq!(json, r#""frustrated""#);
        let back: AffectState = serde_json::from_str(r#""confused""#).unwrap();
        assert_eq!(back, AffectState::Confused);
    }
}
