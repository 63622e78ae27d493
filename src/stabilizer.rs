//! The state machine turning arbitrated observations into one accepted
//! track and play state.
//!
//! Track identity changes must be corroborated by `promotion_threshold`
//! consecutive observations before they are accepted. Play/pause changes
//! for the accepted track apply immediately. Silence longer than the
//! staleness window ends playback.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::identity::{identity_of, TrackIdentity};
use crate::observation::{Observation, PlayState, TrackMetadata};
use crate::position::{drift, estimate_position};

/// The single mutable playback state. Owned by one [`Stabilizer`];
/// consumers only ever see snapshots of it.
#[derive(Debug, Clone)]
pub struct CanonicalState {
    pub(crate) current_identity: Option<TrackIdentity>,
    pub(crate) current_metadata: TrackMetadata,
    pub(crate) play_state: PlayState,
    /// Last trusted position reading and when it was valid.
    pub(crate) anchor_position: Duration,
    pub(crate) anchor_time: Instant,
    /// Consecutive observations agreeing with `candidate_identity`.
    pub(crate) stability_counter: u32,
    pub(crate) candidate_identity: Option<TrackIdentity>,
    pub(crate) candidate_metadata: TrackMetadata,
    pub(crate) candidate_since: Option<Instant>,
    pub(crate) last_published_identity: Option<TrackIdentity>,
    pub(crate) last_observation_at: Instant,
}

impl CanonicalState {
    pub fn new(now: Instant) -> Self {
        Self {
            current_identity: None,
            current_metadata: TrackMetadata::default(),
            play_state: PlayState::Stopped,
            anchor_position: Duration::ZERO,
            anchor_time: now,
            stability_counter: 0,
            candidate_identity: None,
            candidate_metadata: TrackMetadata::default(),
            candidate_since: None,
            last_published_identity: None,
            last_observation_at: now,
        }
    }

    pub fn current_identity(&self) -> Option<&TrackIdentity> {
        self.current_identity.as_ref()
    }

    pub fn current_metadata(&self) -> &TrackMetadata {
        &self.current_metadata
    }

    pub fn play_state(&self) -> PlayState {
        self.play_state
    }

    /// Last trusted position and the instant it was valid at.
    pub fn anchor(&self) -> (Duration, Instant) {
        (self.anchor_position, self.anchor_time)
    }

    pub fn stability_counter(&self) -> u32 {
        self.stability_counter
    }

    pub fn candidate_identity(&self) -> Option<&TrackIdentity> {
        self.candidate_identity.as_ref()
    }

    pub fn last_published_identity(&self) -> Option<&TrackIdentity> {
        self.last_published_identity.as_ref()
    }

    pub fn last_observation_at(&self) -> Instant {
        self.last_observation_at
    }

    fn clear_candidate(&mut self) {
        self.candidate_identity = None;
        self.candidate_metadata = TrackMetadata::default();
        self.candidate_since = None;
        self.stability_counter = 0;
    }
}

/// What a single observation did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Same track as the accepted one.
    Refreshed { resynced: bool },
    /// Agreed with the pending candidate without reaching the threshold.
    Corroborated { count: u32 },
    /// Started a new candidate.
    NewCandidate,
    Promoted,
    /// No observation this tick and the silence exceeded the window.
    Expired,
    /// No observation this tick, nothing changed.
    Idle,
}

#[derive(Debug, Clone)]
pub struct Stabilizer {
    promotion_threshold: u32,
    drift_tolerance: Duration,
    staleness_window: Duration,
    state: CanonicalState,
}

impl Stabilizer {
    pub fn new(config: &EngineConfig, now: Instant) -> Self {
        Self {
            promotion_threshold: config.promotion_threshold,
            drift_tolerance: config.drift_tolerance,
            staleness_window: config.staleness_window,
            state: CanonicalState::new(now),
        }
    }

    pub fn state(&self) -> &CanonicalState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut CanonicalState {
        &mut self.state
    }

    /// Advance by one tick. Total over any state and any input.
    pub fn step(&mut self, observation: Option<Observation>, now: Instant) -> StepOutcome {
        match observation {
            Some(o) => self.observe(o),
            None if self.expire(now) => StepOutcome::Expired,
            None => StepOutcome::Idle,
        }
    }

    pub fn observe(&mut self, o: Observation) -> StepOutcome {
        let identity = identity_of(&o);
        let state = &mut self.state;
        state.last_observation_at = state.last_observation_at.max(o.observed_at);

        if state.current_identity.as_ref() == Some(&identity) {
            return self.refresh_current(&o);
        }

        if state.candidate_identity.as_ref() == Some(&identity) {
            state.stability_counter += 1;
            state.candidate_metadata.refresh(&o.metadata);
            if state.stability_counter >= self.promotion_threshold {
                self.promote(&o);
                return StepOutcome::Promoted;
            }
            debug!(
                candidate = %identity,
                count = state.stability_counter,
                "candidate corroborated"
            );
            return StepOutcome::Corroborated {
                count: state.stability_counter,
            };
        }

        debug!(candidate = %identity, source = %o.source_id, "new candidate track");
        let promotable = identity.is_known();
        state.candidate_identity = Some(identity);
        state.candidate_metadata = o.metadata.clone();
        state.candidate_since = Some(o.observed_at);
        state.stability_counter = 1;

        if promotable && self.promotion_threshold <= 1 {
            self.promote(&o);
            return StepOutcome::Promoted;
        }
        StepOutcome::NewCandidate
    }

    /// Ends playback when nothing has been observed for longer than the
    /// staleness window. Returns true only on the tick that ends it.
    pub fn expire(&mut self, now: Instant) -> bool {
        let state = &mut self.state;
        let silence = now.saturating_duration_since(state.last_observation_at);
        if silence <= self.staleness_window {
            return false;
        }

        state.clear_candidate();
        if state.current_identity.is_none() && state.play_state == PlayState::Stopped {
            return false;
        }

        info!(
            silence_ms = silence.as_millis() as u64,
            "no source reported anything; treating playback as ended"
        );
        state.current_identity = None;
        state.current_metadata = TrackMetadata::default();
        state.play_state = PlayState::Stopped;
        state.anchor_position = Duration::ZERO;
        state.anchor_time = now;
        true
    }

    fn refresh_current(&mut self, o: &Observation) -> StepOutcome {
        self.state.current_metadata.refresh(&o.metadata);

        if let Some(next) = PlayState::from_status(o.status) {
            self.set_play_state(next, o.observed_at);
        }

        let mut resynced = false;
        if let Some(reported) = o.position {
            let predicted = estimate_position(&self.state, o.observed_at);
            if drift(predicted, reported) > self.drift_tolerance {
                debug!(
                    predicted_ms = predicted.as_millis() as u64,
                    reported_ms = reported.as_millis() as u64,
                    "position drifted; resynchronizing"
                );
                self.state.anchor_position = reported;
                self.state.anchor_time = o.observed_at;
                resynced = true;
            }
        }

        self.state.clear_candidate();
        StepOutcome::Refreshed { resynced }
    }

    /// Switching play state re-bases the anchor so that paused time is
    /// never extrapolated.
    fn set_play_state(&mut self, next: PlayState, at: Instant) {
        if self.state.play_state == next {
            return;
        }
        self.state.anchor_position = estimate_position(&self.state, at);
        self.state.anchor_time = at;
        self.state.play_state = next;
    }

    fn promote(&mut self, o: &Observation) {
        let state = &mut self.state;
        let mut metadata = std::mem::take(&mut state.candidate_metadata);
        metadata.refresh(&o.metadata);

        match o.position {
            Some(position) => {
                state.anchor_position = position;
                state.anchor_time = o.observed_at;
            }
            None => {
                // Assume the track started when it was first seen.
                state.anchor_position = Duration::ZERO;
                state.anchor_time = state.candidate_since.unwrap_or(o.observed_at);
            }
        }

        state.current_identity = state.candidate_identity.take();
        state.current_metadata = metadata;
        state.play_state = PlayState::from_status(o.status).unwrap_or(PlayState::Playing);
        state.clear_candidate();

        info!(
            track = %state.current_metadata,
            play_state = %state.play_state,
            "track promoted"
        );
    }
}
