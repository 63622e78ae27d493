use std::time::Duration;

use thiserror::Error;

/// Why a provider contributed nothing on a given tick.
///
/// None of these are fatal. The engine drops the provider from the
/// arbitration set for that tick and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),

    /// The provider answered but nothing is playing on its channel.
    #[error("nothing is playing")]
    Idle,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider failed: {0}")]
    Failed(String),
}

/// Invalid configuration. Fails engine construction.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for `{option}`: {reason}")]
    Invalid {
        option: &'static str,
        reason: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(option: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            option,
            reason: reason.into(),
        }
    }
}
