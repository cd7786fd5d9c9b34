//! Conversation side-channel state.
//!
//! The learner may inject one question at a time while the lesson is
//! paused; the protocol is single-outstanding-question, so a second ask
//! before the answer arrives is rejected to avoid cross-talk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Tutor,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Tutor => write!(f, "tutor"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AskError {
    #[error("question is empty")]
    Empty,
    #[error("a question is already awaiting its answer")]
    QuestionPending,
}

/// Append-only turn history plus the outstanding-question flag.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
    awaiting_answer: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and records a learner question.
    pub fn begin_question(&mut self, text: &str) -> Result<ConversationTurn, AskError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AskError::Empty);
        }
        if self.awaiting_answer {
            return Err(AskError::QuestionPending);
        }
        let turn = ConversationTurn {
            role: TurnRole::User,
            text: trimmed.to_string(),
            timestamp: Utc::now(),
        };
        self.turns.push(turn.clone());
        self.awaiting_answer = true;
        Ok(turn)
    }

    /// Records the tutor's answer and clears the outstanding question.
    pub fn record_answer(&mut self, text: &str) -> ConversationTurn {
        let turn = ConversationTurn {
            role: TurnRole::Tutor,
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        self.turns.push(turn.clone());
        self.awaiting_answer = false;
        turn
    }

    /// Gives up on an answer that never arrived, unblocking the next ask.
    pub fn abandon_question(&mut self) {
        self.awaiting_answer = false;
    }

    pub fn awaiting_answer(&self) -> bool {
        self.awaiting_answer
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn question_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .count()
    }

    /// The most recent `n` turns, oldest first, for the outbound question
    /// payload.
    pub fn recent(&self, n: usize) -> Vec<ConversationTurn> {
        let start = self.turns.len().saturating_sub(n);
        self.turns[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace_questions_are_rejected() {
        let mut conversation = Conversation::new();
        assert_eq!(conversation.begin_question("").unwrap_err(), AskError::Empty);
        assert_eq!(
            conversation.begin_question("   \t\n").unwrap_err(),
            AskError::Empty
        );
        assert!(conversation.turns().is_empty());
    }

    #[test]
    fn test_second_ask_before_answer_is_rejected() {
        let mut conversation = Conversation::new();
        conversation.begin_question("why is the sky blue?").unwrap();
        assert_eq!(
            conversation.begin_question("and why is grass green?").unwrap_err(),
            AskError::QuestionPending
        );
        // Exactly one pending user turn.
        assert_eq!(conversation.question_count(), 1);
        assert!(conversation.awaiting_answer());
    }

    #[test]
    fn test_answer_clears_the_pending_question() {
        let mut conversation = Conversation::new();
        conversation.begin_question("why?").unwrap();
        conversation.record_answer("Rayleigh scattering.");
        assert!(!conversation.awaiting_answer());
        conversation.begin_question("a follow-up?").unwrap();
        assert_eq!(conversation.question_count(), 2);
    }

    #[test]
    fn test_abandon_unblocks_the_next_ask() {
        let mut conversation = Conversation::new();
        conversation.begin_question("anyone there?").unwrap();
        conversation.abandon_question();
        assert!(conversation.begin_question("retry").is_ok());
    }

    #[test]
    fn test_question_text_is_trimmed() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_question("  what is entropy?  ").unwrap();
        assert_eq!(turn.text, "what is entropy?");
    }

    #[test]
    fn test_recent_returns_latest_turns_oldest_first() {
        let mut conversation = Conversation::new();
        conversation.begin_question("q1").unwrap();
        conversation.record_answer("a1");
        conversation.begin_question("q2").unwrap();
        conversation.record_answer("a2");

        let recent = conversation.recent(3);
        let texts: Vec<_> = recent.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a1", "q2", "a2"]);
    }
}
