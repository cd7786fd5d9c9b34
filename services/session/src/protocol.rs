//! Wire protocol between the session controller and the lesson backend.

use kairos_core::affect::AffectState;
use kairos_core::chunk::ContentChunk;
use kairos_core::conversation::ConversationTurn;
use kairos_core::summary::SessionSummary;
use serde::{Deserialize, Serialize};

/// Messages sent by the lesson backend.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A batch of lesson chunks, optionally labelled with the current topic.
    LessonContent {
        content: Vec<ContentChunk>,
        #[serde(default)]
        topic: Option<String>,
    },
    /// Direct response to the outstanding learner question.
    TutorAnswer { text: String },
    /// Server-side affect classification.
    EmotionResult { state: AffectState, confidence: f32 },
    /// Alias kind emitted by older backends; same payload as `emotion_result`.
    EmotionDetected { state: AffectState, confidence: f32 },
    /// Remote-initiated lesson completion.
    LessonSummary {
        #[serde(default)]
        message: Option<String>,
    },
    /// Backend-reported error. Scoped to one message, never session-fatal.
    Error { message: String },
}

/// Messages sent to the lesson backend.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Requests lesson generation and starts delivery. Must be the first
    /// message after the connection opens.
    StartLesson {
        topic: String,
        user_alias: String,
        difficulty: String,
        style: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        age: Option<u32>,
        language: String,
    },
    /// A learner question, carrying recent conversation context.
    UserQuestion {
        question: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        history: Vec<ConversationTurn>,
    },
    /// Completion notice, sent before disconnecting so the backend always
    /// observes session end.
    SessionComplete { summary: SessionSummary },
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::chunk::ChunkKind;
    use kairos_core::conversation::Conversation;

    #[test]
    fn test_lesson_content_parses_with_topic() {
        let raw = r#"{
            "type": "lesson_content",
            "topic": "Photosynthesis",
            "content": [
                {"type": "text", "content": "Plants convert light into energy."},
                {"type": "image_prompt", "content": "a chloroplast", "caption": "Chloroplast"}
            ]
        }"#;
        match serde_json::from_str::<ServerMessage>(raw).unwrap() {
            ServerMessage::LessonContent { content, topic } => {
                assert_eq!(topic.as_deref(), Some("Photosynthesis"));
                assert_eq!(content.len(), 2);
                assert_eq!(content[0].kind, ChunkKind::Text);
                assert_eq!(content[1].caption.as_deref(), Some("Chloroplast"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_both_emotion_kinds_parse() {
        let result: ServerMessage = serde_json::from_str(
            r#"{"type": "emotion_result", "state": "confused", "confidence": 0.8}"#,
        )
        .unwrap();
        let detected: ServerMessage = serde_json::from_str(
            r#"{"type": "emotion_detected", "state": "bored", "confidence": 0.7}"#,
        )
        .unwrap();

        assert!(matches!(
            result,
            ServerMessage::EmotionResult {
                state: AffectState::Confused,
                ..
            }
        ));
        assert!(matches!(
            detected,
            ServerMessage::EmotionDetected {
                state: AffectState::Bored,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_message_kind_is_a_parse_error() {
        let result: Result<ServerMessage, _> =
            serde_json::from_str(r#"{"type": "learning_path", "data": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_start_lesson_serializes_snake_case() {
        let msg = ClientMessage::StartLesson {
            topic: "Cell Biology".to_string(),
            user_alias: "Ada".to_string(),
            difficulty: "intermediate".to_string(),
            style: "mixed".to_string(),
            age: None,
            language: "es".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"start_lesson""#));
        assert!(json.contains(r#""topic":"Cell Biology""#));
        assert!(!json.contains("age"));
    }

    #[test]
    fn test_user_question_carries_history() {
        let mut conversation = Conversation::new();
        conversation.begin_question("why?").unwrap();

        let msg = ClientMessage::UserQuestion {
            question: "why?".to_string(),
            topic: Some("Gravity".to_string()),
            history: conversation.recent(6),
        };
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "user_question");
        assert_eq!(value["history"].as_array().unwrap().len(), 1);
        assert_eq!(value["history"][0]["role"], "user");
    }
}
