//! Quote Feed Agent Binary
//!
//! Runs the agent against the simulated feed client.
//!
//! # Usage
//!
//! ```bash
//! TOKEN=demo AGENT_SYMBOLS=AAPL,MSFT,EUR/USD cargo run --bin quote-feed-agent
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TOKEN`: Feed API credential
//!
//! ## Optional
//! - `AGENT_SYMBOLS`: Comma separated symbol universe (default: empty)
//! - `AGENT_SYMBOLS_FILE`: JSON array of symbols, overrides `AGENT_SYMBOLS`
//! - `AGENT_WORKER_THREADS`: Query worker pool size (default: 4)
//! - `AGENT_TASK_QUEUE_CAPACITY`: Query queue bound (default: 1024)
//! - `AGENT_METRICS_INTERVAL_MS`: Throughput sampling interval (default: 1000)
//! - `AGENT_COMMAND_QUEUE_CAPACITY`: Command intake bound (default: 256)
//! - `AGENT_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `AGENT_SIMULATED_RATE`: Messages/sec per symbol (default: 5)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: quote-feed-agent)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use quote_feed_agent::infrastructure::health::{HealthServer, HealthServerState};
use quote_feed_agent::infrastructure::telemetry;
use quote_feed_agent::{
    AgentConfig, AgentHandle, FeedAgent, FeedClient, SimulatedFeedClient, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting quote feed agent");

    let _metrics_handle = init_metrics();

    let config = AgentConfig::from_env()?;
    log_config(&config);

    let rate = config.feed.simulated_rate;
    let agent = FeedAgent::start(&config, |_credential, events| {
        Arc::new(SimulatedFeedClient::new(events, rate)) as Arc<dyn FeedClient>
    })
    .await?;

    let shutdown_token = CancellationToken::new();

    if config.server.health_port > 0 {
        let state = Arc::new(HealthServerState::for_agent(
            env!("CARGO_PKG_VERSION").to_string(),
            &agent,
        ));
        let health_server = HealthServer::new(config.server.health_port, state, shutdown_token.clone());

        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let (handle, commands) = AgentHandle::channel(config.command_queue_capacity);
    handle.connection_open().await?;

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    tracing::info!("Quote feed agent ready");

    agent.run(commands, shutdown_token).await;
    agent.stop().await;

    tracing::info!("Quote feed agent stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &AgentConfig) {
    tracing::info!(
        symbols = config.symbols.len(),
        workers = config.dispatcher.worker_threads,
        queue_capacity = config.dispatcher.queue_capacity,
        metrics_interval_ms = config.metrics_interval.as_millis(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
