//! The pacing queue: orders lesson chunks and spaces their reveal.
//!
//! The queue itself is pure state. It never owns a timer; operations that
//! begin displaying a chunk hand the chunk's delay back to the caller,
//! which arms the single display timer and calls [`PacingQueue::on_display_expired`]
//! when it fires. This keeps the at-most-one-displaying invariant in one
//! place and makes the queue testable without time.

use crate::chunk::ContentChunk;
use std::collections::VecDeque;
use std::time::Duration;

/// Ordered buffer of chunks awaiting display plus the single displaying slot.
#[derive(Debug, Default)]
pub struct PacingQueue {
    buffered: VecDeque<ContentChunk>,
    displaying: Option<ContentChunk>,
    paused: bool,
}

impl PacingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends chunks to the tail. Never discards buffered chunks.
    pub fn enqueue(&mut self, chunks: impl IntoIterator<Item = ContentChunk>) {
        self.buffered.extend(chunks);
    }

    /// Promotes the head to the displaying slot if nothing is on screen and
    /// the queue is not paused. Returns the chunk and the delay to arm.
    pub fn advance_if_idle(&mut self) -> Option<(ContentChunk, Duration)> {
        if self.paused || self.displaying.is_some() {
            return None;
        }
        let chunk = self.buffered.pop_front()?;
        let delay = chunk.display_delay();
        self.displaying = Some(chunk.clone());
        Some((chunk, delay))
    }

    /// Clears the displaying slot on timer expiry and promotes the next head.
    pub fn on_display_expired(&mut self) -> Option<(ContentChunk, Duration)> {
        self.displaying = None;
        self.advance_if_idle()
    }

    /// Halts progression. The displayed chunk and the buffer are retained;
    /// the caller is responsible for dropping its timer. Idempotent.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Restarts progression from the current queue state. A chunk that was
    /// on screen when paused gets its full window again. No-op when not
    /// paused.
    pub fn resume(&mut self) -> Option<(ContentChunk, Duration)> {
        if !self.paused {
            return None;
        }
        self.paused = false;
        if let Some(chunk) = &self.displaying {
            return Some((chunk.clone(), chunk.display_delay()));
        }
        self.advance_if_idle()
    }

    /// Swaps the displayed chunk for an adapted variant. Returns the variant
    /// and its delay, or `None` when nothing is on screen.
    pub fn replace_displaying(&mut self, chunk: ContentChunk) -> Option<(ContentChunk, Duration)> {
        self.displaying.as_ref()?;
        let delay = chunk.display_delay();
        self.displaying = Some(chunk.clone());
        Some((chunk, delay))
    }

    pub fn displaying(&self) -> Option<&ContentChunk> {
        self.displaying.as_ref()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_drained(&self) -> bool {
        self.displaying.is_none() && self.buffered.is_empty()
    }
}
