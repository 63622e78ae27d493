//! Deduplicated change events and pull snapshots for consumers.

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::identity::TrackIdentity;
use crate::observation::{PlayState, TrackMetadata};
use crate::position::extrapolate;
use crate::stabilizer::{CanonicalState, Stabilizer};

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A genuinely new track was accepted.
    TrackChanged {
        identity: TrackIdentity,
        metadata: TrackMetadata,
    },
    PlayStateChanged(PlayState),
}

/// Immutable view of the canonical state at the end of a tick.
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub identity: Option<TrackIdentity>,
    pub metadata: TrackMetadata,
    pub play_state: PlayState,
    pub anchor_position: Duration,
    pub anchor_time: Instant,
}

impl PlaybackSnapshot {
    pub fn from_state(state: &CanonicalState) -> Self {
        Self {
            identity: state.current_identity.clone(),
            metadata: state.current_metadata.clone(),
            play_state: state.play_state,
            anchor_position: state.anchor_position,
            anchor_time: state.anchor_time,
        }
    }

    pub fn estimate_position(&self, now: Instant) -> Duration {
        extrapolate(
            self.anchor_position,
            self.anchor_time,
            self.play_state,
            self.metadata.duration,
            now,
        )
    }
}

/// Turns per-tick state into events proportional to meaningful change.
///
/// `TrackChanged` fires at most once per newly accepted identity;
/// `PlayStateChanged` fires whenever the play state value differs from the
/// last published one. Metadata refreshes and position movement only
/// update the snapshot.
pub struct EventPublisher {
    events: broadcast::Sender<PlaybackEvent>,
    snapshot: watch::Sender<PlaybackSnapshot>,
    last_play_state: PlayState,
}

impl EventPublisher {
    pub fn new(capacity: usize, initial: &CanonicalState) -> Self {
        let (events, _) = broadcast::channel(capacity);
        let (snapshot, _) = watch::channel(PlaybackSnapshot::from_state(initial));
        Self {
            events,
            snapshot,
            last_play_state: initial.play_state,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn snapshots(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.subscribe()
    }

    /// Sender half for late subscribers; it never publishes.
    pub fn event_sender(&self) -> broadcast::Sender<PlaybackEvent> {
        self.events.clone()
    }

    /// Publish whatever changed in the stabilizer's state since the
    /// previous call. Returns the emitted events.
    pub fn publish(&mut self, stabilizer: &mut Stabilizer) -> Vec<PlaybackEvent> {
        self.publish_state(stabilizer.state_mut())
    }

    /// Records what was published in `state` itself.
    pub(crate) fn publish_state(&mut self, state: &mut CanonicalState) -> Vec<PlaybackEvent> {
        let mut emitted = Vec::new();

        if let Some(current) = &state.current_identity {
            if state.last_published_identity.as_ref() != Some(current) {
                info!(track = %state.current_metadata, "track changed");
                emitted.push(PlaybackEvent::TrackChanged {
                    identity: current.clone(),
                    metadata: state.current_metadata.clone(),
                });
                state.last_published_identity = Some(current.clone());
            }
        }

        if state.play_state != self.last_play_state {
            info!(from = %self.last_play_state, to = %state.play_state, "play state changed");
            emitted.push(PlaybackEvent::PlayStateChanged(state.play_state));
            self.last_play_state = state.play_state;
        }

        self.snapshot
            .send_replace(PlaybackSnapshot::from_state(state));

        for event in &emitted {
            // No subscribers is fine.
            if self.events.send(event.clone()).is_err() {
                debug!("event dropped: no subscribers");
            }
        }
        emitted
    }
}
