use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use super::SourceProvider;
use crate::config::{FileFormat, FileProviderConfig};
use crate::error::ProviderError;
use crate::normalize::{parse_window_title, RawPayload};

/// Reads a now-playing file written by some other program: a JSON object
/// from a web-API bridge, or a scraped window/tab title.
///
/// A missing or empty file means nothing is playing.
pub struct FileProvider {
    id: String,
    path: PathBuf,
    priority: i32,
    format: FileFormat,
    poll_interval: Option<Duration>,
}

impl FileProvider {
    pub fn new(config: &FileProviderConfig) -> Self {
        Self {
            id: config.id.clone(),
            path: config.path.clone(),
            priority: config.priority,
            format: config.format,
            poll_interval: config.poll_interval,
        }
    }

    fn parse(&self, contents: &str) -> Result<RawPayload, ProviderError> {
        let contents = contents.trim();
        if contents.is_empty() {
            return Err(ProviderError::Idle);
        }
        match self.format {
            FileFormat::Json => RawPayload::from_json(contents)
                .map_err(|e| ProviderError::Failed(format!("malformed payload: {e}"))),
            FileFormat::Title => {
                let first_line = contents.lines().next().unwrap_or_default();
                parse_window_title(first_line).ok_or(ProviderError::Idle)
            }
        }
    }
}

#[async_trait]
impl SourceProvider for FileProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval
    }

    async fn poll(&self, _timeout: Duration) -> Result<RawPayload, ProviderError> {
        let path = self.path.clone();
        let read = tokio::task::spawn_blocking(move || std::fs::read_to_string(path))
            .await
            .map_err(|e| ProviderError::Failed(format!("reader task failed: {e}")))?;

        match read {
            Ok(contents) => self.parse(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ProviderError::Idle),
            Err(e) => Err(ProviderError::Unavailable(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}
