//! Request loop for providers that read a blocking OS media session on a
//! dedicated thread.

use std::fmt::Debug;
use std::sync::mpsc;

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::ProviderError;
use crate::normalize::RawPayload;

pub(crate) type SnapshotReply = oneshot::Sender<Result<RawPayload, ProviderError>>;

pub(crate) enum SnapshotCommand {
    Fetch(SnapshotReply),
    Shutdown,
}

/// Answers fetches until shutdown or until every sender is gone.
///
/// Polls the engine already abandoned are dropped unanswered, so a slow
/// session never works through a backlog of stale requests.
pub(crate) fn serve<F>(requests: &mpsc::Receiver<SnapshotCommand>, mut fetch: F)
where
    F: FnMut() -> Result<RawPayload, ProviderError>,
{
    while let Ok(command) = requests.recv() {
        match command {
            SnapshotCommand::Fetch(reply) => {
                if reply.is_closed() {
                    trace!("poll abandoned before it was served");
                    continue;
                }
                // Closed in the meantime is fine too.
                let _ = reply.send(fetch());
            }
            SnapshotCommand::Shutdown => break,
        }
    }
}

/// Reads the current session through a session manager.
///
/// Only a missing current session means nothing is playing. Failing to
/// reach the manager or to read the session is a real failure.
pub(crate) fn read_current<M, S, E, C, R>(
    manager: Result<M, E>,
    current: C,
    read: R,
) -> Result<RawPayload, ProviderError>
where
    E: Debug,
    C: FnOnce(&M) -> Result<S, E>,
    R: FnOnce(&S) -> Result<RawPayload, E>,
{
    let manager =
        manager.map_err(|e| ProviderError::Failed(format!("session manager: {e:?}")))?;
    let session = current(&manager).map_err(|_| ProviderError::Idle)?;
    read(&session).map_err(|e| ProviderError::Failed(format!("{e:?}")))
}
