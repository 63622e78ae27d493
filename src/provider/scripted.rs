use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::SourceProvider;
use crate::error::ProviderError;
use crate::normalize::RawPayload;

/// One scripted answer.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub response: Result<RawPayload, ProviderError>,
    /// How long the provider takes to answer.
    pub delay: Duration,
}

/// Replays a fixed sequence of answers, one per poll, then reports
/// [`ProviderError::Idle`]. Used for demos and tests.
pub struct ScriptedProvider {
    id: String,
    priority: i32,
    poll_interval: Option<Duration>,
    steps: Mutex<VecDeque<ScriptStep>>,
}

impl ScriptedProvider {
    pub fn new(id: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            priority,
            poll_interval: None,
            steps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn then(self, payload: RawPayload) -> Self {
        self.then_step(ScriptStep {
            response: Ok(payload),
            delay: Duration::ZERO,
        })
    }

    pub fn then_error(self, error: ProviderError) -> Self {
        self.then_step(ScriptStep {
            response: Err(error),
            delay: Duration::ZERO,
        })
    }

    /// Answer `payload`, but only after `delay`.
    pub fn then_slow(self, payload: RawPayload, delay: Duration) -> Self {
        self.then_step(ScriptStep {
            response: Ok(payload),
            delay,
        })
    }

    pub fn repeat(mut self, payload: RawPayload, times: usize) -> Self {
        for _ in 0..times {
            self = self.then(payload.clone());
        }
        self
    }

    pub fn then_step(self, step: ScriptStep) -> Self {
        self.push(step);
        self
    }

    /// Append to the script of a provider that is already running.
    pub fn push(&self, step: ScriptStep) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SourceProvider for ScriptedProvider {
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
        let step = self
            .steps
            .lock()
            .map_err(|_| ProviderError::Failed("script lock poisoned".into()))?
            .pop_front();
        let Some(step) = step else {
            return Err(ProviderError::Idle);
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.response
    }
}
