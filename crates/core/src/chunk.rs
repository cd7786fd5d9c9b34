//! Lesson content chunks and the visibility delay assigned to each kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Floor for any text chunk's on-screen window.
const MIN_TEXT_DELAY_MS: u64 = 2000;
/// Assumed reading speed in words per second.
const READING_WORDS_PER_SEC: f64 = 3.5;
/// Image prompts get a fixed viewing window.
const IMAGE_PROMPT_DELAY_MS: u64 = 5000;
/// Everything else defaults to a short window.
const DEFAULT_DELAY_MS: u64 = 3000;

/// The kind of a content chunk, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Text,
    ImagePrompt,
    VideoUrl,
    UserQuestion,
    TutorAnswer,
    Error,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Text => write!(f, "text"),
            ChunkKind::ImagePrompt => write!(f, "image_prompt"),
            ChunkKind::VideoUrl => write!(f, "video_url"),
            ChunkKind::UserQuestion => write!(f, "user_question"),
            ChunkKind::TutorAnswer => write!(f, "tutor_answer"),
            ChunkKind::Error => write!(f, "error"),
        }
    }
}

/// One discrete unit of lesson content, immutable once enqueued.
///
/// Chunks produced by the backend arrive without an id; a fresh one is
/// assigned on deserialization so adaptation can target chunks by identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChunk {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl ContentChunk {
    pub fn new(kind: ChunkKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            content: content.into(),
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    /// How long the chunk stays on screen before the next one may be shown.
    ///
    /// Text chunks scale with word count at reading speed, with a floor so
    /// short fragments do not flash by.
    pub fn display_delay(&self) -> Duration {
        match self.kind {
            ChunkKind::Text => {
                let reading_ms =
                    (self.word_count() as f64 / READING_WORDS_PER_SEC * 1000.0).round() as u64;
                Duration::from_millis(reading_ms.max(MIN_TEXT_DELAY_MS))
            }
            ChunkKind::ImagePrompt => Duration::from_millis(IMAGE_PROMPT_DELAY_MS),
            _ => Duration::from_millis(DEFAULT_DELAY_MS),
        }
    }
}
