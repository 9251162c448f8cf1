//! Prometheus Metrics Module
//!
//! Exposes agent metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Throughput**: Messages per second sampled by the metrics ticker
//! - **Subscriptions**: Subscribe batches issued, by outcome
//! - **Tasks**: Offloaded queries, by kind and outcome
//! - **Commands**: Commands accepted at the agent boundary
//! - **Session**: Current feed session state
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::session::SessionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder was already installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_gauge!(
        "quote_feed_agent_messages_per_second",
        "Feed messages received during the last sampling interval"
    );
    describe_counter!(
        "quote_feed_agent_subscribe_batches_total",
        "Subscribe batches issued to the feed client by outcome"
    );
    describe_counter!(
        "quote_feed_agent_tasks_total",
        "Offloaded upstream queries by kind and outcome"
    );
    describe_counter!(
        "quote_feed_agent_commands_total",
        "Commands accepted at the agent boundary"
    );
    describe_gauge!(
        "quote_feed_agent_session_state",
        "Feed session state (0=uninitialized, 1=connecting, 2=connected, 3=closed)"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Outcome label for subscribe batches and offloaded tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Completed without error.
    Ok,
    /// Returned an error.
    Failed,
    /// Panicked inside the worker.
    Panicked,
    /// Refused before execution (queue full or shut down).
    Rejected,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Panicked => "panicked",
            Self::Rejected => "rejected",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Publish the latest throughput sample.
#[allow(clippy::cast_precision_loss)]
pub fn set_messages_per_second(value: u64) {
    gauge!("quote_feed_agent_messages_per_second").set(value as f64);
}

/// Record one subscribe batch.
pub fn record_subscribe_batch(outcome: Outcome) {
    counter!(
        "quote_feed_agent_subscribe_batches_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record one offloaded task.
pub fn record_task(kind: &'static str, outcome: Outcome) {
    counter!(
        "quote_feed_agent_tasks_total",
        "kind" => kind,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record one accepted command.
pub fn record_command(command: &'static str) {
    counter!(
        "quote_feed_agent_commands_total",
        "command" => command
    )
    .increment(1);
}

/// Update the session state gauge.
pub fn set_session_state(state: SessionState) {
    gauge!("quote_feed_agent_session_state").set(f64::from(state.ordinal()));
}

// =============================================================================
// Tests
// =============================================================================
