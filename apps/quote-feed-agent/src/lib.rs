#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Feed Agent - Streaming Market Data Ingestion
//!
//! Maintains a single connection to a real-time quote feed, accepts
//! subscription and query commands, forwards them to the feed client, and
//! republishes message throughput to observers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core ingestion rules
//!   - `subscription`: Symbols and fixed-size subscribe batches
//!   - `rate`: Concurrent message counter with reset-on-read
//!   - `session`: Feed session state machine
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Feed client interface and connection events
//!   - `services`: Worker pool, session controller, metrics ticker, agent
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `config`: Environment configuration
//!   - `feed`: Simulated feed client
//!   - `health`: Health check and metrics HTTP endpoint
//!   - `metrics`, `telemetry`: Prometheus and tracing setup
//!
//! # Data Flow
//!
//! ```text
//!                ┌──────────────┐  batches   ┌──────────────┐
//! subscribe ────►│SymbolBatcher │───────────►│              │
//!                └──────────────┘            │    Feed      │     ┌────────────┐
//! profile ──────────────────────────────────►│   Session    │────►│ FeedClient │
//!                ┌──────────────┐            │  Controller  │     └─────┬──────┘
//! timeSeries ───►│AsyncDispatch │───────────►│              │           │ messages
//!                └──────────────┘            └──────┬───────┘           ▼
//!                                                   │ drain       ┌────────────┐
//!                                    ┌──────────────┴──┐          │RateCounter │
//! messagesPerSecond ◄────────────────│  MetricsTicker  │◄─────────┴────────────┘
//!                                    └─────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core ingestion types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::rate::RateCounter;
pub use domain::session::{SessionEvent, SessionState};
pub use domain::subscription::{
    BATCH_SIZE, BatchFailure, BatchReport, SubscriptionBatch, Symbol, SymbolBatcher,
};

// Ports
pub use application::ports::{FeedClient, FeedError, FeedEvent};

// Services
pub use application::services::{
    AgentCommand, AgentError, AgentHandle, AsyncDispatcher, DispatchError, DispatcherStats,
    FeedAgent, FeedSessionController, MetricsTicker, ThroughputState,
};

// Infrastructure config
pub use infrastructure::config::{AgentConfig, ConfigError, Credential};

// Feed adapters
pub use infrastructure::feed::SimulatedFeedClient;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
