//! The boundary to "what is playing" backends.
//!
//! A provider answers one poll per tick with a raw payload or an error.
//! Errors never escape the tick they happened in.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::ProvidersConfig;
use crate::error::ProviderError;
use crate::normalize::RawPayload;

mod file;
mod scripted;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
mod session;
#[cfg(target_os = "windows")]
mod smtc;

pub use file::FileProvider;
pub use scripted::ScriptedProvider;
#[cfg(target_os = "windows")]
pub use smtc::SmtcProvider;

#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Stable identifier, used as the observation's `source_id`.
    fn id(&self) -> &str;

    /// Static priority; the default confidence of this provider's observations.
    fn priority(&self) -> i32;

    /// Own polling cadence, if different from the engine's.
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    /// The engine abandons the call once `timeout` has elapsed, so
    /// implementations may use it as a hint but need not enforce it.
    async fn poll(&self, timeout: Duration) -> Result<RawPayload, ProviderError>;
}

/// Build every provider enabled in `config`.
pub fn from_config(config: &ProvidersConfig) -> Vec<Arc<dyn SourceProvider>> {
    let mut providers: Vec<Arc<dyn SourceProvider>> = Vec::new();

    #[cfg(target_os = "windows")]
    if config.smtc.enabled {
        providers.push(Arc::new(SmtcProvider::new(config.smtc.priority)));
    }
    #[cfg(not(target_os = "windows"))]
    if config.smtc.enabled {
        info!("media session provider is only available on Windows; skipping");
    }

    for file in &config.files {
        info!(id = %file.id, path = %file.path.display(), "watching now-playing file");
        providers.push(Arc::new(FileProvider::new(file)));
    }
    providers
}
