//! Raw provider payloads and their normalization into [`Observation`]s.
//!
//! Normalization never fails. Anything missing, blank, negative or of the
//! wrong type becomes an explicit unknown.

use std::time::{Duration, Instant};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::observation::{MetaField, Observation, PlaybackStatus, TrackMetadata};

const MIN_SCRAPED_TITLE_LEN: usize = 4;

/// What a provider hands back from one poll, before any cleanup.
///
/// Deserializes from the loose JSON shapes remote APIs and helper scripts
/// produce: seconds or milliseconds, `is_playing` or `status`, a single
/// `artist` or an `artists` list. Fields with the wrong JSON type are
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawPayload {
    #[serde(alias = "name", deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub artist: Option<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub artists: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient_string")]
    pub album: Option<String>,
    /// Seconds.
    #[serde(deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub duration_ms: Option<f64>,
    /// Seconds.
    #[serde(deserialize_with = "lenient_f64")]
    pub position: Option<f64>,
    #[serde(alias = "progress_ms", deserialize_with = "lenient_f64")]
    pub position_ms: Option<f64>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_playing: Option<bool>,
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub player_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub album_art_url: Option<String>,
    #[serde(deserialize_with = "lenient_i32")]
    pub confidence: Option<i32>,
}

impl RawPayload {
    /// Parses a JSON object. Only a document that is not a JSON object at
    /// all is an error; individual bad fields are dropped.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(serde_json::Error::custom("expected a JSON object"));
        }
        serde_json::from_value(value)
    }
}

/// Build an [`Observation`] from a raw payload.
///
/// `priority` is the provider's static priority, used as confidence unless
/// the payload declares its own.
pub fn normalize(
    raw: RawPayload,
    source_id: &str,
    observed_at: Instant,
    priority: i32,
) -> Observation {
    let artist = match raw.artist.as_deref() {
        Some(a) if !a.trim().is_empty() => MetaField::from_raw(Some(a)),
        _ => {
            let joined = raw
                .artists
                .as_ref()
                .map(|names| {
                    names
                        .iter()
                        .map(|n| n.trim())
                        .filter(|n| !n.is_empty())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            MetaField::from_raw(Some(&joined))
        }
    };

    // A zero duration is how most backends say "I don't know".
    let duration = seconds(raw.duration)
        .or_else(|| millis(raw.duration_ms))
        .filter(|d| !d.is_zero());
    let position = seconds(raw.position).or_else(|| millis(raw.position_ms));

    let metadata = TrackMetadata {
        title: MetaField::from_raw(raw.title.as_deref()),
        artist,
        album: MetaField::from_raw(raw.album.as_deref()),
        duration,
        player_name: non_blank(raw.player_name),
        album_art_url: non_blank(raw.album_art_url),
    };

    Observation {
        source_id: source_id.to_string(),
        metadata,
        position,
        status: parse_status(raw.status.as_deref(), raw.is_playing),
        observed_at,
        confidence: raw.confidence.unwrap_or(priority),
    }
}

/// Status strings win over the boolean flag when they say something.
pub fn parse_status(status: Option<&str>, is_playing: Option<bool>) -> PlaybackStatus {
    let from_text = status
        .map(|s| s.trim().to_ascii_lowercase())
        .map(|s| match s.as_str() {
            "playing" | "play" => PlaybackStatus::Playing,
            "paused" | "pause" => PlaybackStatus::Paused,
            "stopped" | "stop" | "closed" => PlaybackStatus::Stopped,
            _ => PlaybackStatus::Unknown,
        })
        .unwrap_or(PlaybackStatus::Unknown);

    match (from_text, is_playing) {
        (PlaybackStatus::Unknown, Some(true)) => PlaybackStatus::Playing,
        (PlaybackStatus::Unknown, Some(false)) => PlaybackStatus::Paused,
        (status, _) => status,
    }
}

/// Extract a track from a browser or player window title.
///
/// Scraped titles never carry timing, and a visible title is taken to
/// mean the player is active.
pub fn parse_window_title(window_title: &str) -> Option<RawPayload> {
    let window_title = window_title.trim();

    let (title, artist, player) =
        if let Some(rest) = window_title.strip_suffix(" - YouTube Music") {
            let (title, artist) = rest.split_once(" - ")?;
            (title, artist, "YouTube Music")
        } else if let Some(rest) = window_title.strip_suffix(" - YouTube") {
            match rest.split_once(" - ") {
                Some((artist, title)) => (title, artist, "YouTube"),
                None => (rest, "YouTube", "YouTube"),
            }
        } else if let Some(rest) = window_title.strip_suffix(" | Spotify") {
            let (artist, title) = rest.split_once(" - ")?;
            (title, artist, "Spotify Web")
        } else if let Some(rest) = window_title.strip_suffix(" - Spotify") {
            let (title, artist) = rest.split_once(" - ")?;
            (title, artist, "Spotify")
        } else {
            let (artist, title) = window_title.split_once(" - ")?;
            (title, artist, "")
        };

    let title = title.trim();
    let artist = artist.trim();
    if title.chars().count() < MIN_SCRAPED_TITLE_LEN || artist.is_empty() {
        return None;
    }

    Some(RawPayload {
        title: Some(title.to_string()),
        artist: Some(artist.to_string()),
        status: Some("playing".to_string()),
        player_name: (!player.is_empty()).then(|| player.to_string()),
        ..Default::default()
    })
}

fn seconds(value: Option<f64>) -> Option<Duration> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .and_then(|v| Duration::try_from_secs_f64(v).ok())
}

fn millis(value: Option<f64>) -> Option<Duration> {
    seconds(value.map(|ms| ms / 1000.0))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    // Spotify style: [{"name": "..."}]
                    Value::Object(map) => map
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect(),
        ),
        Value::String(s) => Some(vec![s]),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(deserializer)?
        .filter(|v| v.is_finite() && *v >= i32::MIN as f64 && *v <= i32::MAX as f64)
        .map(|v| v.round() as i32))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe(raw: RawPayload) -> Observation {
        normalize(raw, "test", Instant::now(), 7)
    }

    #[test]
    fn empty_payload_is_all_unknown() {
        let obs = observe(RawPayload::default());
        assert_eq!(obs.metadata.title, MetaField::Unknown);
        assert_eq!(obs.metadata.artist, MetaField::Unknown);
        assert_eq!(obs.metadata.album, MetaField::Unknown);
        assert_eq!(obs.metadata.duration, None);
        assert_eq!(obs.position, None);
        assert_eq!(obs.status, PlaybackStatus::Unknown);
        assert_eq!(obs.confidence, 7);
    }

    #[test]
    fn bad_numbers_become_unknown() {
        let obs = observe(RawPayload {
            duration: Some(f64::NAN),
            position: Some(-3.0),
            duration_ms: Some(0.0),
            ..Default::default()
        });
        assert_eq!(obs.metadata.duration, None);
        assert_eq!(obs.position, None);
    }

    #[test]
    fn spotify_style_json_is_understood() {
        let raw = RawPayload::from_json(
            r#"{
                "name": "Song A",
                "artists": [{"name": "Artist X"}, {"name": "Artist Y"}],
                "album": "Album",
                "duration_ms": 200000,
                "progress_ms": 120000,
                "is_playing": true
            }"#,
        )
        .unwrap();
        let obs = observe(raw);

        assert_eq!(obs.metadata.title.known(), Some("Song A"));
        assert_eq!(obs.metadata.artist.known(), Some("Artist X, Artist Y"));
        assert_eq!(obs.metadata.duration, Some(Duration::from_secs(200)));
        assert_eq!(obs.position, Some(Duration::from_secs(120)));
        assert_eq!(obs.status, PlaybackStatus::Playing);
    }

    #[test]
    fn wrongly_typed_json_fields_are_dropped() {
        let raw = RawPayload::from_json(
            r#"{"title": "Song A", "artist": null, "duration": {"x": 1}, "status": "PAUSED", "confidence": "12"}"#,
        )
        .unwrap();
        let obs = observe(raw);

        assert_eq!(obs.metadata.title.known(), Some("Song A"));
        assert_eq!(obs.metadata.artist, MetaField::Unknown);
        assert_eq!(obs.metadata.duration, None);
        assert_eq!(obs.status, PlaybackStatus::Paused);
        assert_eq!(obs.confidence, 12);
    }

    #[test]
    fn non_object_json_is_an_error() {
        assert!(RawPayload::from_json("not json").is_err());
        assert!(RawPayload::from_json("[1, 2]").is_err());
    }

    #[test]
    fn status_text_beats_flag() {
        assert_eq!(parse_status(Some("Stopped"), Some(true)), PlaybackStatus::Stopped);
        assert_eq!(parse_status(Some("changing"), Some(true)), PlaybackStatus::Playing);
        assert_eq!(parse_status(None, Some(false)), PlaybackStatus::Paused);
        assert_eq!(parse_status(None, None), PlaybackStatus::Unknown);
    }

    #[test]
    fn window_titles() {
        let yt = parse_window_title("Artist X - Song A - YouTube").unwrap();
        assert_eq!(yt.title.as_deref(), Some("Song A"));
        assert_eq!(yt.artist.as_deref(), Some("Artist X"));

        let yt_plain = parse_window_title("Some Video - YouTube").unwrap();
        assert_eq!(yt_plain.title.as_deref(), Some("Some Video"));
        assert_eq!(yt_plain.artist.as_deref(), Some("YouTube"));

        let web = parse_window_title("Artist X - Song A | Spotify").unwrap();
        assert_eq!(web.title.as_deref(), Some("Song A"));
        assert_eq!(web.player_name.as_deref(), Some("Spotify Web"));

        let ytm = parse_window_title("Song A - Artist X - YouTube Music").unwrap();
        assert_eq!(ytm.artist.as_deref(), Some("Artist X"));

        assert!(parse_window_title("abc - YouTube").is_none());
        assert!(parse_window_title("Inbox").is_none());
    }
}
