use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub engine: EngineConfig,
    pub providers: ProvidersConfig,
}

impl Config {
    /// Looks for a config file next to the working directory, then next to
    /// the executable. No file at all means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("config.toml"));
            candidates.push(current_dir.join("config").join("config.toml"));
            candidates.push(current_dir.join("config").join("nowplaying.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("config.toml"));
                candidates.push(dir.join("config").join("config.toml"));
                candidates.push(dir.join("config").join("nowplaying.toml"));
            }
        }

        for path in candidates {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&data).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        let doc: ConfigDocument = toml::from_str(data).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        Config::try_from(doc)
    }
}

/// Tuning of the stabilization engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    /// Consecutive agreeing observations needed to accept a new track.
    pub promotion_threshold: u32,
    /// Reported positions closer than this to the prediction are ignored.
    pub drift_tolerance: Duration,
    /// Silence longer than this ends playback.
    pub staleness_window: Duration,
    pub provider_timeout: Duration,
    /// Events buffered per subscriber before a slow one starts lagging.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_poll_interval(Duration::from_secs(5))
    }
}

impl EngineConfig {
    /// Defaults scaled to `poll_interval`: staleness is three intervals,
    /// the provider timeout four fifths of one.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            promotion_threshold: 3,
            drift_tolerance: Duration::from_secs(2),
            staleness_window: poll_interval * 3,
            provider_timeout: poll_interval * 4 / 5,
            event_capacity: 64,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid("poll_interval", "must be greater than zero"));
        }
        if self.promotion_threshold == 0 {
            return Err(ConfigError::invalid("promotion_threshold", "must be at least 1"));
        }
        if self.provider_timeout.is_zero() {
            return Err(ConfigError::invalid("provider_timeout", "must be greater than zero"));
        }
        if self.provider_timeout > self.poll_interval {
            return Err(ConfigError::invalid(
                "provider_timeout",
                format!(
                    "{:?} exceeds the poll interval of {:?}",
                    self.provider_timeout, self.poll_interval
                ),
            ));
        }
        if self.staleness_window < self.poll_interval {
            return Err(ConfigError::invalid(
                "staleness_window",
                format!(
                    "{:?} is shorter than the poll interval of {:?}",
                    self.staleness_window, self.poll_interval
                ),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity", "must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub smtc: SmtcProviderConfig,
    pub files: Vec<FileProviderConfig>,
}

#[derive(Debug, Clone)]
pub struct SmtcProviderConfig {
    pub enabled: bool,
    pub priority: i32,
}

impl Default for SmtcProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// A JSON now-playing object.
    #[default]
    Json,
    /// A single window or tab title.
    Title,
}

#[derive(Debug, Clone)]
pub struct FileProviderConfig {
    pub id: String,
    pub path: PathBuf,
    pub priority: i32,
    pub format: FileFormat,
    pub poll_interval: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    providers: ProvidersSection,
}

impl TryFrom<ConfigDocument> for Config {
    type Error = ConfigError;

    fn try_from(value: ConfigDocument) -> Result<Self, Self::Error> {
        let section = value.engine;
        let mut engine = match section.poll_interval_ms {
            Some(ms) => EngineConfig::with_poll_interval(Duration::from_millis(ms)),
            None => EngineConfig::default(),
        };
        if let Some(threshold) = section.promotion_threshold {
            engine.promotion_threshold = threshold;
        }
        if let Some(ms) = section.drift_tolerance_ms {
            engine.drift_tolerance = Duration::from_millis(ms);
        }
        if let Some(ms) = section.staleness_window_ms {
            engine.staleness_window = Duration::from_millis(ms);
        }
        if let Some(ms) = section.provider_timeout_ms {
            engine.provider_timeout = Duration::from_millis(ms);
        }
        if let Some(capacity) = section.event_capacity {
            engine.event_capacity = capacity;
        }
        engine.validate()?;

        let smtc_defaults = SmtcProviderConfig::default();
        let smtc = SmtcProviderConfig {
            enabled: value.providers.smtc.enabled.unwrap_or(smtc_defaults.enabled),
            priority: value.providers.smtc.priority.unwrap_or(smtc_defaults.priority),
        };

        let mut files = Vec::with_capacity(value.providers.file.len());
        for (idx, file) in value.providers.file.into_iter().enumerate() {
            let path = file
                .path
                .filter(|p| !p.as_os_str().is_empty())
                .ok_or_else(|| ConfigError::invalid("providers.file.path", "is required"))?;
            if file.poll_interval_ms == Some(0) {
                return Err(ConfigError::invalid(
                    "providers.file.poll_interval_ms",
                    "must be greater than zero",
                ));
            }
            files.push(FileProviderConfig {
                id: file.id.unwrap_or_else(|| format!("file-{idx}")),
                path,
                priority: file.priority.unwrap_or(10),
                format: file.format.unwrap_or_default(),
                poll_interval: file.poll_interval_ms.map(Duration::from_millis),
            });
        }

        Ok(Config {
            engine,
            providers: ProvidersConfig { smtc, files },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct EngineSection {
    poll_interval_ms: Option<u64>,
    promotion_threshold: Option<u32>,
    drift_tolerance_ms: Option<u64>,
    staleness_window_ms: Option<u64>,
    provider_timeout_ms: Option<u64>,
    event_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersSection {
    #[serde(default)]
    smtc: SmtcSection,
    #[serde(default)]
    file: Vec<FileSection>,
}

#[derive(Debug, Default, Deserialize)]
struct SmtcSection {
    enabled: Option<bool>,
    priority: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct FileSection {
    id: Option<String>,
    path: Option<PathBuf>,
    priority: Option<i32>,
    format: Option<FileFormat>,
    poll_interval_ms: Option<u64>,
}
