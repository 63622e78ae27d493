//! Stabilizes "what is playing" across noisy, disagreeing sources.
//!
//! Providers are polled on an interval, their answers normalized and
//! arbitrated, and a debounced state machine decides which track is
//! actually playing. Consumers get change events and cheap snapshots with
//! an extrapolated playback position.

pub mod arbiter;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod observation;
pub mod position;
pub mod provider;
pub mod publisher;
pub mod stabilizer;

pub use config::{Config, EngineConfig};
pub use engine::{Engine, EngineHandle};
pub use error::{ConfigError, ProviderError};
pub use identity::TrackIdentity;
pub use normalize::RawPayload;
pub use observation::{MetaField, Observation, PlayState, PlaybackStatus, TrackMetadata};
pub use provider::SourceProvider;
pub use publisher::{PlaybackEvent, PlaybackSnapshot};
pub use stabilizer::{CanonicalState, Stabilizer, StepOutcome};
