//! Throughput Ticker Integration Tests
//!
//! Runs a started agent on a paused clock and observes the published
//! `messagesPerSecond` value.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use quote_feed_agent::{
    AgentConfig, FeedAgent, FeedClient, FeedError, FeedEvent, RateCounter, SessionState,
    SimulatedFeedClient, SubscriptionBatch,
};

/// Feed client whose message count is driven by the test.
struct ScriptedFeed {
    counter: Arc<RateCounter>,
}

#[async_trait]
impl FeedClient for ScriptedFeed {
    async fn connect(&self) -> Result<(), FeedError> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn subscribe(&self, _batch: &SubscriptionBatch) -> Result<(), FeedError> {
        Ok(())
    }

    async fn time_series(&self, _request: &Value) -> Result<(), FeedError> {
        Ok(())
    }

    async fn profile(&self, _request: &Value) -> Result<(), FeedError> {
        Ok(())
    }

    fn get_and_reset_messages_per_second(&self) -> u64 {
        self.counter.sample()
    }
}

fn config() -> AgentConfig {
    AgentConfig {
        token: Some("test-token".to_string()),
        ..AgentConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn seven_messages_publish_seven_then_zero() {
    let counter = Arc::new(RateCounter::new());
    let feed_counter = Arc::clone(&counter);

    let agent = FeedAgent::start(&config(), move |_, _| {
        Arc::new(ScriptedFeed {
            counter: feed_counter,
        }) as Arc<dyn FeedClient>
    })
    .await
    .unwrap();

    let mut rx = agent.throughput().subscribe();
    for _ in 0..7 {
        counter.increment();
    }

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), 7);

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), 0);

    agent.stop().await;
}

#[tokio::test(start_paused = true)]
async fn no_samples_after_stop() {
    let counter = Arc::new(RateCounter::new());
    let feed_counter = Arc::clone(&counter);

    let agent = FeedAgent::start(&config(), move |_, _| {
        Arc::new(ScriptedFeed {
            counter: feed_counter,
        }) as Arc<dyn FeedClient>
    })
    .await
    .unwrap();

    let throughput = agent.throughput().clone();
    agent.stop().await;

    counter.add(3);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(throughput.latest(), 0);
    assert_eq!(counter.peek(), 3);
}

#[tokio::test(start_paused = true)]
async fn simulated_feed_reaches_connected_and_streams_throughput() {
    let config = AgentConfig {
        symbols: quote_feed_agent::Symbol::parse_list("AAPL,MSFT"),
        ..config()
    };

    let agent = FeedAgent::start(&config, |_, events: mpsc::Sender<FeedEvent>| {
        Arc::new(SimulatedFeedClient::new(events, 5)) as Arc<dyn FeedClient>
    })
    .await
    .unwrap();
    agent.connection_open().await;

    let mut samples = agent.throughput().stream().skip(1);
    let first = samples.next().await.unwrap();

    assert!((9..=12).contains(&first), "unexpected sample {first}");
    assert_eq!(agent.controller().state(), SessionState::Connected);

    agent.stop().await;
}
