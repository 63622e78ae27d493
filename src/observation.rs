use std::fmt;
use std::time::{Duration, Instant};

/// A metadata string that is either known or explicitly unknown.
///
/// Providers routinely report empty strings for fields they do not have;
/// the normalizer maps those to `Unknown` so an empty value can never be
/// mistaken for a real one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MetaField {
    Known(String),
    #[default]
    Unknown,
}

impl MetaField {
    /// Trims the value; blank input becomes `Unknown`.
    pub fn from_raw(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => MetaField::Known(v.to_string()),
            _ => MetaField::Unknown,
        }
    }

    pub fn known(&self) -> Option<&str> {
        match self {
            MetaField::Known(v) => Some(v),
            MetaField::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, MetaField::Known(_))
    }

    /// Replace `self` with `other` unless `other` is unknown.
    pub fn refresh(&mut self, other: &MetaField) {
        if other.is_known() {
            *self = other.clone();
        }
    }
}

impl fmt::Display for MetaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaField::Known(v) => f.write_str(v),
            MetaField::Unknown => f.write_str("<unknown>"),
        }
    }
}

/// Play status as reported by one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
    #[default]
    Unknown,
}

impl PlaybackStatus {
    pub fn is_active(self) -> bool {
        !matches!(self, PlaybackStatus::Stopped | PlaybackStatus::Unknown)
    }
}

/// Accepted play state of the canonical track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlayState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayState::Playing => "Playing",
            PlayState::Paused => "Paused",
            PlayState::Stopped => "Stopped",
        }
    }

    /// `None` when the status carries no information.
    pub fn from_status(status: PlaybackStatus) -> Option<Self> {
        match status {
            PlaybackStatus::Playing => Some(PlayState::Playing),
            PlaybackStatus::Paused => Some(PlayState::Paused),
            PlaybackStatus::Stopped => Some(PlayState::Stopped),
            PlaybackStatus::Unknown => None,
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackMetadata {
    pub title: MetaField,
    pub artist: MetaField,
    pub album: MetaField,
    pub duration: Option<Duration>,
    pub player_name: Option<String>,
    pub album_art_url: Option<String>,
}

impl TrackMetadata {
    /// Fold newer metadata in. Known values win; unknown never erases.
    pub fn refresh(&mut self, newer: &TrackMetadata) {
        self.title.refresh(&newer.title);
        self.artist.refresh(&newer.artist);
        self.album.refresh(&newer.album);
        if newer.duration.is_some() {
            self.duration = newer.duration;
        }
        if newer.player_name.is_some() {
            self.player_name.clone_from(&newer.player_name);
        }
        if newer.album_art_url.is_some() {
            self.album_art_url.clone_from(&newer.album_art_url);
        }
    }
}

impl fmt::Display for TrackMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// One provider's report at one point in time. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub source_id: String,
    pub metadata: TrackMetadata,
    /// Elapsed playback as reported at `observed_at`.
    pub position: Option<Duration>,
    pub status: PlaybackStatus,
    pub observed_at: Instant,
    /// Reliability hint used for tie-breaks. Defaults to the provider priority.
    pub confidence: i32,
}
