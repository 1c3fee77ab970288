//! Shared test fixtures: a recording mock provider.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use stratum_core::{ProviderError, ProviderFactory, ResourceDiff, ResourceProvider, ResourceState};

/// Provider that records every call in a shared log.
///
/// Resource kinds double as identities in the log, so tests give each
/// resource its own kind (`mock_a`, `mock_b`, ...).
#[derive(Clone, Default)]
pub struct MockProvider {
    calls: Arc<Mutex<Vec<String>>>,
    fail_kind: Option<String>,
    delay: Duration,
    cancel_on_apply: Option<CancellationToken>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    next_id: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every apply of resources of `kind`.
    pub fn failing(mut self, kind: &str) -> Self {
        self.fail_kind = Some(kind.to_string());
        self
    }

    /// Sleep inside every apply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cancel `token` from inside the first apply.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_apply = Some(token);
        self
    }

    pub fn factory(&self) -> ProviderFactory {
        let mock = self.clone();
        Arc::new(move || Ok(Arc::new(mock.clone()) as Arc<dyn ResourceProvider>))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Position of the first call equal to `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Highest number of applies observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl ResourceProvider for MockProvider {
    fn configure(&self, _config: &Value) -> Result<(), ProviderError> {
        self.record("configure".to_string());
        Ok(())
    }

    fn refresh(
        &self,
        kind: &str,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        self.record(format!("refresh:{kind}"));
        Ok(Some(state.clone()))
    }

    fn apply(
        &self,
        kind: &str,
        state: Option<&ResourceState>,
        diff: &ResourceDiff,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if let Some(token) = &self.cancel_on_apply {
            token.cancel();
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let result = if self.fail_kind.as_deref() == Some(kind) {
            self.record(format!("fail:{kind}"));
            Err(ProviderError::new(format!("{kind} exploded")))
        } else if diff.destroy {
            self.record(format!("destroy:{kind}"));
            Ok(None)
        } else {
            self.record(format!("apply:{kind}"));
            let mut next = state.cloned().unwrap_or_else(|| {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                ResourceState::new(format!("{kind}-{id}"))
            });
            for (name, change) in &diff.attributes {
                if let (false, Some(value)) = (name == "id", &change.new) {
                    next.attributes.insert(name.clone(), value.clone());
                }
            }
            Ok(Some(next))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
