//! Stable track identity derived from title and artist.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::observation::{Observation, TrackMetadata};

const KEY_SEPARATOR: char = '\u{1f}';

// Only explicit credits naming someone; "Ten ft Tall" and "Little Feat" stay.
static FEATURE_CREDIT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // "(feat. X)", "[ft X]", "(featuring X)"
        Regex::new(r"(?i)[(\[]\s*(?:feat\.?|ft\.?|featuring)\s+[^)\]]*[)\]]").unwrap(),
        // trailing "feat. X", "ft. X", "featuring X"
        Regex::new(r"(?i)\s(?:feat\.|ft\.|featuring)\s+\S.*$").unwrap(),
    ]
});

/// Normalized key deciding whether two observations are the same track.
///
/// `Unknown` is produced whenever title or artist is missing and compares
/// unequal to everything, itself included, so two blank observations can
/// never corroborate each other. For that reason this type implements
/// `PartialEq` but deliberately not `Eq` or `Hash`.
#[derive(Debug, Clone)]
pub enum TrackIdentity {
    Known(String),
    Unknown,
}

impl PartialEq for TrackIdentity {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TrackIdentity::Known(a), TrackIdentity::Known(b)) => a == b,
            _ => false,
        }
    }
}

impl TrackIdentity {
    pub fn is_known(&self) -> bool {
        matches!(self, TrackIdentity::Known(_))
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            TrackIdentity::Known(key) => Some(key),
            TrackIdentity::Unknown => None,
        }
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackIdentity::Known(key) => match key.split_once(KEY_SEPARATOR) {
                Some((artist, title)) => write!(f, "{artist} / {title}"),
                None => f.write_str(key),
            },
            TrackIdentity::Unknown => f.write_str("<unknown track>"),
        }
    }
}

pub fn identity_of(observation: &Observation) -> TrackIdentity {
    identity_of_metadata(&observation.metadata)
}

/// Album is left out on purpose: sources disagree on it far more often
/// than on title and artist.
pub fn identity_of_metadata(metadata: &TrackMetadata) -> TrackIdentity {
    let (Some(title), Some(artist)) = (metadata.title.known(), metadata.artist.known()) else {
        return TrackIdentity::Unknown;
    };

    let title = normalize_component(title);
    let artist = normalize_component(artist);
    if title.is_empty() || artist.is_empty() {
        return TrackIdentity::Unknown;
    }

    TrackIdentity::Known(format!("{artist}{KEY_SEPARATOR}{title}"))
}

/// Lower-case, drop feature credits, collapse whitespace.
pub fn normalize_component(value: &str) -> String {
    let mut cleaned = value.to_string();
    for pattern in FEATURE_CREDIT_PATTERNS.iter() {
        cleaned = pattern.replace_all(&cleaned, " ").into_owned();
    }
    cleaned
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
