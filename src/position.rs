//! Pull-based playback position extrapolation.

use std::time::{Duration, Instant};

use crate::observation::PlayState;
use crate::stabilizer::CanonicalState;

/// Position of the canonical track at `now`.
pub fn estimate_position(state: &CanonicalState, now: Instant) -> Duration {
    extrapolate(
        state.anchor_position,
        state.anchor_time,
        state.play_state,
        state.current_metadata.duration,
        now,
    )
}

/// Advance `anchor_position` by the time elapsed since `anchor_time` while
/// playing, clamped to `duration` when known. Paused or stopped playback
/// does not move.
pub fn extrapolate(
    anchor_position: Duration,
    anchor_time: Instant,
    play_state: PlayState,
    duration: Option<Duration>,
    now: Instant,
) -> Duration {
    if play_state != PlayState::Playing {
        return anchor_position;
    }

    let advanced = anchor_position.saturating_add(now.saturating_duration_since(anchor_time));
    match duration {
        Some(limit) => advanced.min(limit),
        None => advanced,
    }
}

/// Absolute distance between a prediction and a reported position.
pub fn drift(predicted: Duration, reported: Duration) -> Duration {
    if predicted > reported {
        predicted - reported
    } else {
        reported - predicted
    }
}
