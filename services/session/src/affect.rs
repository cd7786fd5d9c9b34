//! Affect sources.
//!
//! The session is agnostic to where samples come from. This module ships
//! two producers: the scripted demo sequence and a random generator for
//! exercising the adaptation paths. Both are fire-and-forget: a full
//! channel drops the sample instead of blocking the producer.

use kairos_core::affect::{AffectSample, AffectState};
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// The scripted demo sequence: engagement with dips into confusion,
/// boredom and frustration, ending engaged.
pub fn demo_sequence() -> Vec<AffectSample> {
    [
        (AffectState::Engaged, 0.85),
        (AffectState::Engaged, 0.90),
        (AffectState::Confused, 0.75),
        (AffectState::Confused, 0.80),
        (AffectState::Engaged, 0.88),
        (AffectState::Bored, 0.70),
        (AffectState::Engaged, 0.92),
        (AffectState::Frustrated, 0.65),
        (AffectState::Engaged, 0.95),
    ]
    .into_iter()
    .map(|(state, confidence)| AffectSample::new(state, confidence))
    .collect()
}

/// One random sample with confidence in [0.6, 1.0).
pub fn random_sample() -> AffectSample {
    let mut rng = rand::rng();
    let state = AffectState::ALL[rng.random_range(0..AffectState::ALL.len())];
    let confidence = 0.6 + rng.random_range(0.0f32..0.4);
    AffectSample::new(state, confidence)
}

/// Emits the given sequence on a fixed cadence, then keeps repeating the
/// last sample, mirroring a detector that holds its final classification.
pub fn spawn_scripted(
    samples: Vec<AffectSample>,
    interval: Duration,
    tx: mpsc::Sender<AffectSample>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if samples.is_empty() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        let mut index = 0usize;
        loop {
            ticker.tick().await;
            let scripted = samples[index.min(samples.len() - 1)];
            index = index.saturating_add(1);
            // Re-stamp so timestamps reflect emission, not construction.
            if !deliver(&tx, AffectSample::new(scripted.state, scripted.confidence)) {
                break;
            }
        }
    })
}

/// Emits random samples on a fixed cadence until the session goes away.
pub fn spawn_random(interval: Duration, tx: mpsc::Sender<AffectSample>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if !deliver(&tx, random_sample()) {
                break;
            }
        }
    })
}

/// Fire-and-forget delivery. Returns false once the receiver is gone.
fn deliver(tx: &mpsc::Sender<AffectSample>, sample: AffectSample) -> bool {
    match tx.try_send(sample) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("affect channel full; sample dropped");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
