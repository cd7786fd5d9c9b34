//! Session identity and the interruption/resume state machine.
//!
//! The original UI tracked delivery sub-state with scattered boolean flags;
//! here the legal phases and their transitions are explicit, so an illegal
//! move is a typed error instead of a silent flag mismatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The phases a session moves through, from idle to terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Connecting,
    Delivering,
    Paused,
    AwaitingAnswer,
    Completed,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }

    /// Whether the state machine permits moving to `next`.
    ///
    /// Any live phase may complete (learner finish/exit or remote lesson
    /// end) or fail (exhausted connection budget). `Delivering -> AwaitingAnswer`
    /// is legal directly: asking from an un-paused session pauses pacing
    /// implicitly.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Delivering)
                | (Delivering, Paused)
                | (Delivering, AwaitingAnswer)
                | (Paused, Delivering)
                | (Paused, AwaitingAnswer)
                | (AwaitingAnswer, Delivering)
                | (Connecting | Delivering | Paused | AwaitingAnswer, Completed)
                | (Connecting | Delivering | Paused | AwaitingAnswer, Failed)
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Connecting => write!(f, "connecting"),
            SessionPhase::Delivering => write!(f, "delivering"),
            SessionPhase::Paused => write!(f, "paused"),
            SessionPhase::AwaitingAnswer => write!(f, "awaiting_answer"),
            SessionPhase::Completed => write!(f, "completed"),
            SessionPhase::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("illegal session transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

/// One learner interaction with one lesson, bounded by connect and
/// completion/exit. Owned exclusively by the session runtime.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    phase: SessionPhase,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: SessionPhase::Idle,
            created_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Moves to `next`, returning the previous phase.
    pub fn transition(&mut self, next: SessionPhase) -> Result<SessionPhase, TransitionError> {
        if !self.phase.can_transition_to(next) {
            return Err(TransitionError {
                from: self.phase,
                to: next,
            });
        }
        let prev = self.phase;
        self.phase = next;
        Ok(prev)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut session = Session::new();
        assert_eq!(session.phase(), SessionPhase::Idle);
        session.transition(SessionPhase::Connecting).unwrap();
        session.transition(SessionPhase::Delivering).unwrap();
        session.transition(SessionPhase::Paused).unwrap();
        session.transition(SessionPhase::AwaitingAnswer).unwrap();
        session.transition(SessionPhase::Delivering).unwrap();
        session.transition(SessionPhase::Completed).unwrap();
        assert!(session.phase().is_terminal());
    }

    #[test]
    fn test_illegal_transition_is_rejected_and_state_kept() {
        let mut session = Session::new();
        let err = session.transition(SessionPhase::Delivering).unwrap_err();
        assert_eq!(err.from, SessionPhase::Idle);
        assert_eq!(err.to, SessionPhase::Delivering);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_terminal_phases_admit_no_exit() {
        let mut session = Session::new();
        session.transition(SessionPhase::Connecting).unwrap();
        session.transition(SessionPhase::Failed).unwrap();
        assert!(session.transition(SessionPhase::Delivering).is_err());
        assert!(session.transition(SessionPhase::Completed).is_err());
    }

    #[test]
    fn test_asking_is_legal_from_delivering_and_paused() {
        assert!(SessionPhase::Delivering.can_transition_to(SessionPhase::AwaitingAnswer));
        assert!(SessionPhase::Paused.can_transition_to(SessionPhase::AwaitingAnswer));
        assert!(!SessionPhase::Connecting.can_transition_to(SessionPhase::AwaitingAnswer));
    }

    #[test]
    fn test_every_live_phase_may_complete() {
        for phase in [
            SessionPhase::Connecting,
            SessionPhase::Delivering,
            SessionPhase::Paused,
            SessionPhase::AwaitingAnswer,
        ] {
            assert!(phase.can_transition_to(SessionPhase::Completed), "{phase}");
        }
        assert!(!SessionPhase::Completed.can_transition_to(SessionPhase::Completed));
    }
}
