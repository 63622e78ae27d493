use std::future::IntoFuture;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use futures::executor::block_on;
use tokio::sync::oneshot;
use tracing::warn;
use windows::{
    core::Result as WinResult,
    Foundation::TimeSpan,
    Media::Control::{
        GlobalSystemMediaTransportControlsSession,
        GlobalSystemMediaTransportControlsSessionManager,
        GlobalSystemMediaTransportControlsSessionPlaybackStatus,
    },
    Win32::{
        Foundation::RPC_E_CHANGED_MODE,
        System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED},
    },
};

use super::session::{read_current, serve, SnapshotCommand};
use super::SourceProvider;
use crate::error::ProviderError;
use crate::normalize::RawPayload;

const TICKS_PER_SECOND: f64 = 10_000_000.0;

/// Reads the OS media session (System Media Transport Controls).
///
/// All COM traffic happens on one dedicated thread that lives as long as
/// the provider.
pub struct SmtcProvider {
    priority: i32,
    request_tx: mpsc::Sender<SnapshotCommand>,
}

impl SmtcProvider {
    pub fn new(priority: i32) -> Self {
        let (request_tx, request_rx) = mpsc::channel();

        thread::spawn(move || {
            let com_initialized = unsafe {
                let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
                if hr.is_ok() {
                    true
                } else if hr == RPC_E_CHANGED_MODE {
                    false
                } else {
                    warn!(?hr, "COM init failed; media session provider disabled");
                    let reason = format!("COM init failed: {hr:?}");
                    serve(&request_rx, || Err(ProviderError::Unavailable(reason.clone())));
                    return;
                }
            };

            serve(&request_rx, fetch_session_snapshot);

            if com_initialized {
                unsafe {
                    CoUninitialize();
                }
            }
        });

        Self {
            priority,
            request_tx,
        }
    }
}

impl Drop for SmtcProvider {
    fn drop(&mut self) {
        let _ = self.request_tx.send(SnapshotCommand::Shutdown);
    }
}

#[async_trait]
impl SourceProvider for SmtcProvider {
    fn id(&self) -> &str {
        "smtc"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn poll(&self, _timeout: Duration) -> Result<RawPayload, ProviderError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(SnapshotCommand::Fetch(reply_tx))
            .map_err(|_| ProviderError::Unavailable("media session thread exited".into()))?;
        reply_rx
            .await
            .map_err(|_| ProviderError::Unavailable("media session thread exited".into()))?
    }
}

fn time_span_to_secs(span: TimeSpan) -> f64 {
    span.Duration as f64 / TICKS_PER_SECOND
}

fn block_on_operation<O, T>(operation: O) -> WinResult<T>
where
    O: IntoFuture<Output = WinResult<T>>,
{
    block_on(operation.into_future())
}

fn session_manager() -> WinResult<GlobalSystemMediaTransportControlsSessionManager> {
    block_on_operation(GlobalSystemMediaTransportControlsSessionManager::RequestAsync()?)
}

fn fetch_session_snapshot() -> Result<RawPayload, ProviderError> {
    // GetCurrentSession fails when no app owns a session.
    read_current(
        session_manager(),
        |manager| manager.GetCurrentSession(),
        read_session,
    )
}

fn read_session(session: &GlobalSystemMediaTransportControlsSession) -> WinResult<RawPayload> {
    let props = block_on_operation(session.TryGetMediaPropertiesAsync()?)?;
    let playback_info = session.GetPlaybackInfo()?;

    let status = match playback_info.PlaybackStatus()? {
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Closed => Some("closed"),
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Stopped => Some("stopped"),
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Playing => Some("playing"),
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Paused => Some("paused"),
        // Opened and Changing say nothing about whether audio is running.
        _ => None,
    };

    let timeline_props = session.GetTimelineProperties()?;
    let mut start_secs = time_span_to_secs(timeline_props.StartTime()?);
    let mut end_secs = time_span_to_secs(timeline_props.EndTime()?);
    let position_secs = time_span_to_secs(timeline_props.Position()?);

    if end_secs < start_secs {
        std::mem::swap(&mut start_secs, &mut end_secs);
    }
    let duration_secs = end_secs - start_secs;
    let has_timeline = duration_secs > f64::EPSILON;

    Ok(RawPayload {
        title: Some(props.Title()?.to_string_lossy()),
        artist: Some(props.Artist()?.to_string_lossy()),
        album: Some(props.AlbumTitle()?.to_string_lossy()),
        duration: has_timeline.then_some(duration_secs),
        position: (has_timeline && position_secs.is_finite())
            .then(|| (position_secs - start_secs).clamp(0.0, duration_secs)),
        status: status.map(str::to_string),
        player_name: session
            .SourceAppUserModelId()
            .ok()
            .map(|id| id.to_string_lossy()),
        ..Default::default()
    })
}
