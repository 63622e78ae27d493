//! Per-tick selection among the observations of concurrent providers.

use std::cmp::Reverse;

use tracing::debug;

use crate::observation::Observation;

/// Pick the one observation of this tick that the stabilizer gets to see.
///
/// Candidates are ranked by confidence, then recency. The best-ranked
/// active (playing or paused) candidate wins; if nobody is active, the
/// best-ranked candidate overall does. Providers that failed this tick are
/// simply absent from `observations`.
pub fn arbitrate(mut observations: Vec<Observation>) -> Option<Observation> {
    if observations.is_empty() {
        return None;
    }
    observations.sort_by_key(|o| (Reverse(o.confidence), Reverse(o.observed_at)));

    let idx = observations
        .iter()
        .position(|o| o.status.is_active())
        .unwrap_or(0);
    let picked = observations.swap_remove(idx);
    debug!(
        source = %picked.source_id,
        confidence = picked.confidence,
        status = ?picked.status,
        outranked = observations.len(),
        "arbiter picked observation"
    );
    Some(picked)
}
