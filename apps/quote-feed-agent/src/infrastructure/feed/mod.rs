//! Simulated Feed Client
//!
//! A self-contained [`FeedClient`] that generates synthetic message traffic
//! for every subscribed symbol. Used by the binary's demo mode and by tests
//! that need a live message stream without an upstream provider.
//!
//! Messages are counted into a [`RateCounter`] from a background generator
//! task, the same way a real client counts messages from its socket reader.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedClient, FeedError, FeedEvent};
use crate::domain::rate::RateCounter;
use crate::domain::subscription::{SubscriptionBatch, Symbol};

/// Generator tick.
const GENERATOR_TICK: Duration = Duration::from_millis(100);

/// Jitter applied to each tick's message count (±20%).
const JITTER: f64 = 0.2;

/// Feed client producing synthetic traffic.
pub struct SimulatedFeedClient {
    counter: Arc<RateCounter>,
    symbols: Arc<RwLock<BTreeSet<Symbol>>>,
    events: mpsc::Sender<FeedEvent>,
    rate_per_symbol: u32,
    generator: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SimulatedFeedClient {
    /// Create a client emitting `rate_per_symbol` messages per second for
    /// each subscribed symbol.
    #[must_use]
    pub fn new(events: mpsc::Sender<FeedEvent>, rate_per_symbol: u32) -> Self {
        Self {
            counter: Arc::new(RateCounter::new()),
            symbols: Arc::new(RwLock::new(BTreeSet::new())),
            events,
            rate_per_symbol,
            generator: Mutex::new(None),
        }
    }

    /// Number of distinct symbols subscribed so far.
    #[must_use]
    pub fn subscribed(&self) -> usize {
        self.symbols.read().len()
    }

    /// Whether the generator is running.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.generator.lock().is_some()
    }

    fn notify(&self, event: FeedEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::debug!(error = %e, "Dropping feed event");
        }
    }

    fn require_symbol(request: &Value) -> Result<&str, FeedError> {
        request
            .get("symbol")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| FeedError::Rejected("request has no symbol".to_string()))
    }
}

/// Messages generated in one tick for `symbols` subscriptions.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn messages_per_tick(symbols: usize, rate_per_symbol: u32, jitter: f64) -> u64 {
    let ticks_per_second = 1000.0 / GENERATOR_TICK.as_millis() as f64;
    let expected = symbols as f64 * f64::from(rate_per_symbol) / ticks_per_second;
    (expected * (1.0 + jitter)).round().max(0.0) as u64
}

async fn generate(
    counter: Arc<RateCounter>,
    symbols: Arc<RwLock<BTreeSet<Symbol>>>,
    rate_per_symbol: u32,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(GENERATOR_TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let subscribed = symbols.read().len();
                let jitter = rand::rng().random_range(-JITTER..=JITTER);
                counter.add(messages_per_tick(subscribed, rate_per_symbol, jitter));
            }
        }
    }
}

#[async_trait]
impl FeedClient for SimulatedFeedClient {
    async fn connect(&self) -> Result<(), FeedError> {
        {
            let mut generator = self.generator.lock();
            if generator.is_some() {
                return Ok(());
            }

            let cancel = CancellationToken::new();
            let handle = tokio::spawn(generate(
                Arc::clone(&self.counter),
                Arc::clone(&self.symbols),
                self.rate_per_symbol,
                cancel.clone(),
            ));
            *generator = Some((cancel, handle));
        }

        tracing::info!(rate_per_symbol = self.rate_per_symbol, "Simulated feed connected");
        self.notify(FeedEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) {
        let Some((cancel, handle)) = self.generator.lock().take() else {
            return;
        };

        cancel.cancel();
        handle.abort();
        tracing::info!("Simulated feed disconnected");
        self.notify(FeedEvent::Disconnected);
    }

    async fn subscribe(&self, batch: &SubscriptionBatch) -> Result<(), FeedError> {
        self.symbols
            .write()
            .extend(batch.symbols().iter().cloned());
        tracing::debug!(symbols = %batch.to_param(), "Simulated subscribe");
        Ok(())
    }

    async fn time_series(&self, request: &Value) -> Result<(), FeedError> {
        let symbol = Self::require_symbol(request)?;
        let interval = request
            .get("interval")
            .and_then(Value::as_str)
            .unwrap_or("1min");
        tracing::info!(symbol, interval, "Simulated time series request");
        Ok(())
    }

    async fn profile(&self, request: &Value) -> Result<(), FeedError> {
        let symbol = Self::require_symbol(request)?;
        tracing::info!(symbol, "Simulated profile request");
        Ok(())
    }

    fn get_and_reset_messages_per_second(&self) -> u64 {
        self.counter.sample()
    }
}

impl Drop for SimulatedFeedClient {
    fn drop(&mut self) {
        if let Some((cancel, handle)) = self.generator.get_mut().take() {
            cancel.cancel();
            handle.abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(list: &str) -> SubscriptionBatch {
        SubscriptionBatch::new(Symbol::parse_list(list)).unwrap()
    }

    #[test]
    fn messages_per_tick_scales_with_symbols() {
        assert_eq!(messages_per_tick(0, 5, 0.0), 0);
        assert_eq!(messages_per_tick(2, 5, 0.0), 1);
        assert_eq!(messages_per_tick(100, 5, 0.0), 50);
        assert_eq!(messages_per_tick(100, 5, 0.2), 60);
        assert_eq!(messages_per_tick(100, 5, -0.2), 40);
    }

    #[tokio::test]
    async fn subscribe_deduplicates_symbols() {
        let (tx, _rx) = mpsc::channel(8);
        let client = SimulatedFeedClient::new(tx, 5);

        client.subscribe(&batch("AAPL,MSFT")).await.unwrap();
        client.subscribe(&batch("MSFT,TSLA")).await.unwrap();

        assert_eq!(client.subscribed(), 3);
    }

    #[tokio::test]
    async fn connect_reports_event_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let client = SimulatedFeedClient::new(tx, 5);

        client.connect().await.unwrap();
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(rx.recv().await, Some(FeedEvent::Connected));

        client.disconnect().await;
        assert!(!client.is_connected());
        assert_eq!(rx.recv().await, Some(FeedEvent::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn generator_counts_messages_for_subscriptions() {
        let (tx, _rx) = mpsc::channel(8);
        let client = SimulatedFeedClient::new(tx, 5);
        client.subscribe(&batch("AAPL,MSFT")).await.unwrap();

        client.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let count = client.get_and_reset_messages_per_second();
        assert!((9..=12).contains(&count), "unexpected count {count}");
        assert_eq!(client.get_and_reset_messages_per_second(), 0);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn queries_require_symbol() {
        let (tx, _rx) = mpsc::channel(8);
        let client = SimulatedFeedClient::new(tx, 5);

        assert!(client.profile(&json!({"symbol": "AAPL"})).await.is_ok());
        assert!(
            client
                .time_series(&json!({"symbol": "AAPL", "interval": "5min"}))
                .await
                .is_ok()
        );
        assert!(matches!(
            client.time_series(&json!({})).await,
            Err(FeedError::Rejected(_))
        ));
    }
}
