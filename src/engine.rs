//! Task layout of the running engine.
//!
//! Every provider is polled by its own task on its own interval, with each
//! poll bounded by the provider timeout. Normalized reports travel over one
//! channel to the stabilization task, the only owner of the canonical
//! state. On each of its ticks it arbitrates the latest report per
//! provider, steps the stabilizer and publishes. Cancelling the engine
//! stops all of it; no event is published after that.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::arbiter::arbitrate;
use crate::config::EngineConfig;
use crate::error::{ConfigError, ProviderError};
use crate::normalize::normalize;
use crate::observation::{Observation, PlayState, TrackMetadata};
use crate::provider::SourceProvider;
use crate::publisher::{EventPublisher, PlaybackEvent, PlaybackSnapshot};
use crate::stabilizer::{Stabilizer, StepOutcome};

const REPORTS_PER_PROVIDER: usize = 4;

/// Engine time. Follows the Tokio clock so paused-time tests stay exact.
pub fn now() -> Instant {
    time::Instant::now().into_std()
}

struct ProviderReport {
    source_id: String,
    result: Result<Observation, ProviderError>,
}

pub struct Engine {
    config: EngineConfig,
    providers: Vec<Arc<dyn SourceProvider>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            providers: Vec::new(),
        })
    }

    pub fn with_provider(mut self, provider: impl SourceProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn add_provider(&mut self, provider: Arc<dyn SourceProvider>) {
        self.providers.push(provider);
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Spawn the provider tasks and the stabilization task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> EngineHandle {
        let cancel = CancellationToken::new();
        let capacity = (self.providers.len() * REPORTS_PER_PROVIDER).max(1);
        let (report_tx, report_rx) = mpsc::channel(capacity);

        let stabilizer = Stabilizer::new(&self.config, now());
        let publisher = EventPublisher::new(self.config.event_capacity, stabilizer.state());
        let events = publisher.event_sender();
        let snapshots = publisher.snapshots();

        info!(
            providers = self.providers.len(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            promotion_threshold = self.config.promotion_threshold,
            "starting now-playing engine"
        );

        let mut tasks = Vec::with_capacity(self.providers.len() + 1);
        for provider in self.providers {
            let interval = provider.poll_interval().unwrap_or(self.config.poll_interval);
            tasks.push(tokio::spawn(run_provider(
                provider,
                interval,
                self.config.provider_timeout,
                report_tx.clone(),
                cancel.clone(),
            )));
        }
        drop(report_tx);

        tasks.push(tokio::spawn(run_stabilizer(
            self.config,
            stabilizer,
            publisher,
            report_rx,
            cancel.clone(),
        )));

        EngineHandle {
            events,
            snapshots,
            cancel,
            tasks,
        }
    }
}

/// Consumer side of a running engine. All reads are non-blocking and
/// return the latest stable snapshot.
pub struct EngineHandle {
    events: broadcast::Sender<PlaybackEvent>,
    snapshots: watch::Receiver<PlaybackSnapshot>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Events in tick order. A subscriber that falls more than
    /// `event_capacity` events behind observes `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Receiver that is notified after every tick.
    pub fn snapshots(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Metadata of the accepted track, if there is one.
    pub fn current_metadata(&self) -> Option<TrackMetadata> {
        let snapshot = self.snapshots.borrow();
        snapshot.identity.as_ref().map(|_| snapshot.metadata.clone())
    }

    pub fn play_state(&self) -> PlayState {
        self.snapshots.borrow().play_state
    }

    pub fn estimate_position(&self, at: Instant) -> Duration {
        self.snapshots.borrow().estimate_position(at)
    }

    pub fn position(&self) -> Duration {
        self.estimate_position(now())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancel every task, abandoning polls in flight, and wait for them.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(%err, "engine task ended abnormally");
            }
        }
        info!("now-playing engine stopped");
    }
}

async fn run_provider(
    provider: Arc<dyn SourceProvider>,
    interval: Duration,
    timeout: Duration,
    reports: mpsc::Sender<ProviderReport>,
    cancel: CancellationToken,
) {
    let source_id = provider.id().to_string();
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(source = %source_id, interval_ms = interval.as_millis() as u64, "provider task started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            polled = time::timeout(timeout, provider.poll(timeout)) => polled,
        };

        let result = match polled {
            Ok(Ok(raw)) => Ok(normalize(raw, &source_id, now(), provider.priority())),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ProviderError::Timeout(timeout)),
        };

        let report = ProviderReport {
            source_id: source_id.clone(),
            result,
        };
        if reports.send(report).await.is_err() {
            break;
        }
    }
    debug!(source = %source_id, "provider task stopped");
}

async fn run_stabilizer(
    config: EngineConfig,
    mut stabilizer: Stabilizer,
    mut publisher: EventPublisher,
    mut reports: mpsc::Receiver<ProviderReport>,
    cancel: CancellationToken,
) {
    // Tick after providers had their chance to answer or time out.
    let first_tick = time::Instant::now() + config.provider_timeout;
    let mut ticker = time::interval_at(first_tick, config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending: HashMap<String, Observation> = HashMap::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(report) = reports.recv() => match report.result {
                Ok(observation) => {
                    pending.insert(report.source_id, observation);
                }
                Err(ProviderError::Idle) => {
                    trace!(source = %report.source_id, "provider idle");
                }
                Err(err) => {
                    warn!(source = %report.source_id, %err, "provider skipped this tick");
                }
            },
            _ = ticker.tick() => {
                let observations: Vec<Observation> = pending.drain().map(|(_, o)| o).collect();
                let outcome = stabilizer.step(arbitrate(observations), now());
                if outcome != StepOutcome::Idle {
                    debug!(?outcome, "stabilizer tick");
                }
                publisher.publish(&mut stabilizer);
            }
        }
    }
}
