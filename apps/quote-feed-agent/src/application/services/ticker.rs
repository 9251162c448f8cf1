//! Metrics Ticker
//!
//! Periodically drains the feed client's message counter and republishes the
//! count as the agent's `messagesPerSecond` value.
//!
//! The ticker sleeps for one interval, samples, then schedules the next
//! interval. It stops rescheduling as soon as its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::application::services::session::FeedSessionController;
use crate::infrastructure::metrics;

/// Default sampling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

// =============================================================================
// Throughput State
// =============================================================================

/// Last-write-wins observable holding the latest throughput sample.
#[derive(Debug, Clone)]
pub struct ThroughputState {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for ThroughputState {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputState {
    /// Create the observable with an initial value of `0`.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current value and notify observers.
    pub fn publish(&self, messages_per_second: u64) {
        self.tx.send_replace(messages_per_second);
    }

    /// Latest published value.
    #[must_use]
    pub fn latest(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Receiver notified on every publish.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Stream of published values, starting with the current one.
    #[must_use]
    pub fn stream(&self) -> WatchStream<u64> {
        WatchStream::new(self.subscribe())
    }
}

// =============================================================================
// Metrics Ticker
// =============================================================================

/// Recurring sampler of the session's message counter.
pub struct MetricsTicker {
    controller: Arc<FeedSessionController>,
    state: ThroughputState,
    interval: Duration,
}

impl MetricsTicker {
    /// Create a ticker publishing into `state` every `interval`.
    #[must_use]
    pub const fn new(
        controller: Arc<FeedSessionController>,
        state: ThroughputState,
        interval: Duration,
    ) -> Self {
        Self {
            controller,
            state,
            interval,
        }
    }

    /// Sample the counter once and publish the value.
    pub fn tick(&self) -> u64 {
        let count = self.controller.drain_message_count();
        self.state.publish(count);
        metrics::set_messages_per_second(count);
        tracing::trace!(messages_per_second = count, "Throughput sampled");
        count
    }

    /// Run until `cancel` fires, sampling once per interval.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::debug!(interval_ms = self.interval.as_millis(), "Metrics ticker started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!("Metrics ticker cancelled");
                    break;
                }
                () = tokio::time::sleep(self.interval) => {
                    self.tick();
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

// =============================================================================
// Tests
// =============================================================================
