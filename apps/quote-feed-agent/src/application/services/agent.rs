//! Feed Agent
//!
//! Startup and shutdown orchestration plus the agent's command surface.
//!
//! # Lifecycle
//!
//! [`FeedAgent::start`] validates the credential before anything else is
//! built, so a missing token never produces a feed session. It then starts the
//! worker pool, opens the session and schedules the first throughput sample.
//!
//! [`FeedAgent::stop`] shuts the worker pool down first (queued work is
//! discarded), stops the ticker, then closes the session.
//!
//! # Commands
//!
//! Commands are processed one at a time, in arrival order:
//!
//! | Command | Path |
//! |---------|------|
//! | `Subscribe` | batcher, then one subscribe call per batch |
//! | `ConnectionOpen` | configured universe through the same batching path |
//! | `TimeSeries` | offloaded to the worker pool |
//! | `Profile` | awaited directly on the intake path |

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedClient, FeedEvent};
use crate::application::services::dispatcher::AsyncDispatcher;
use crate::application::services::session::FeedSessionController;
use crate::application::services::ticker::{MetricsTicker, ThroughputState};
use crate::domain::subscription::{BatchReport, Symbol, SymbolBatcher};
use crate::infrastructure::config::{AgentConfig, ConfigError, Credential};
use crate::infrastructure::metrics::{self, Outcome};

/// Capacity of the feed client's event channel.
const FEED_EVENT_CAPACITY: usize = 64;

// =============================================================================
// Commands
// =============================================================================

/// A command accepted at the agent boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCommand {
    /// Subscribe to the symbols carried by the payload.
    Subscribe(Value),
    /// Replay the configured symbol universe.
    ConnectionOpen,
    /// Fetch historical time series for the request.
    TimeSeries(Value),
    /// Fetch a company profile for the request.
    Profile(Value),
}

impl AgentCommand {
    /// Metric label for this command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::ConnectionOpen => "connection_open",
            Self::TimeSeries(_) => "time_series",
            Self::Profile(_) => "profile",
        }
    }
}

/// Agent errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Configuration prevented activation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The agent is no longer accepting commands.
    #[error("agent command channel closed")]
    CommandChannelClosed,
}

// =============================================================================
// Agent Handle
// =============================================================================

/// Cloneable sender side of the agent's command intake.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentCommand>,
}

impl AgentHandle {
    /// Create a handle and the receiver to pass to [`FeedAgent::run`].
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AgentCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Send a raw command.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::CommandChannelClosed`] if the agent stopped.
    pub async fn send(&self, command: AgentCommand) -> Result<(), AgentError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AgentError::CommandChannelClosed)
    }

    /// Subscribe to the symbols in `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::CommandChannelClosed`] if the agent stopped.
    pub async fn subscribe(&self, payload: Value) -> Result<(), AgentError> {
        self.send(AgentCommand::Subscribe(payload)).await
    }

    /// Replay the configured universe.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::CommandChannelClosed`] if the agent stopped.
    pub async fn connection_open(&self) -> Result<(), AgentError> {
        self.send(AgentCommand::ConnectionOpen).await
    }

    /// Request a time series.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::CommandChannelClosed`] if the agent stopped.
    pub async fn time_series(&self, request: Value) -> Result<(), AgentError> {
        self.send(AgentCommand::TimeSeries(request)).await
    }

    /// Request a profile.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::CommandChannelClosed`] if the agent stopped.
    pub async fn profile(&self, request: Value) -> Result<(), AgentError> {
        self.send(AgentCommand::Profile(request)).await
    }
}

// =============================================================================
// Feed Agent
// =============================================================================

/// The running agent: session, worker pool and throughput ticker.
pub struct FeedAgent {
    controller: Arc<FeedSessionController>,
    dispatcher: Arc<AsyncDispatcher>,
    batcher: SymbolBatcher,
    universe: Vec<Symbol>,
    throughput: ThroughputState,
    ticker_cancel: CancellationToken,
    ticker: JoinHandle<()>,
    event_loop: JoinHandle<()>,
}

impl FeedAgent {
    /// Activate the agent.
    ///
    /// `connect` builds the feed client from the validated credential and
    /// the sender for its connection events. It is not called when the
    /// credential is missing or empty.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the credential is missing or empty.
    pub async fn start<F>(config: &AgentConfig, connect: F) -> Result<Self, AgentError>
    where
        F: FnOnce(&Credential, mpsc::Sender<FeedEvent>) -> Arc<dyn FeedClient>,
    {
        let credential = config.credential().inspect_err(|e| {
            tracing::error!(error = %e, "Refusing to start without a feed credential");
        })?;

        let dispatcher = Arc::new(AsyncDispatcher::start(
            config.dispatcher.worker_threads,
            config.dispatcher.queue_capacity,
        ));

        let (event_tx, event_rx) = mpsc::channel(FEED_EVENT_CAPACITY);
        let client = connect(&credential, event_tx);

        let controller = Arc::new(FeedSessionController::new(client));
        let event_loop = controller.spawn_event_loop(event_rx);
        controller.open().await;

        let throughput = ThroughputState::new();
        let ticker_cancel = CancellationToken::new();
        let ticker = MetricsTicker::new(
            Arc::clone(&controller),
            throughput.clone(),
            config.metrics_interval,
        )
        .spawn(ticker_cancel.clone());

        tracing::info!(
            universe = config.symbols.len(),
            workers = config.dispatcher.worker_threads,
            "Feed agent started"
        );

        Ok(Self {
            controller,
            dispatcher,
            batcher: SymbolBatcher::new(),
            universe: config.symbols.clone(),
            throughput,
            ticker_cancel,
            ticker,
            event_loop,
        })
    }

    /// The session controller.
    #[must_use]
    pub const fn controller(&self) -> &Arc<FeedSessionController> {
        &self.controller
    }

    /// The worker pool.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<AsyncDispatcher> {
        &self.dispatcher
    }

    /// The published throughput observable.
    #[must_use]
    pub const fn throughput(&self) -> &ThroughputState {
        &self.throughput
    }

    /// Process one command.
    pub async fn handle(&self, command: AgentCommand) {
        metrics::record_command(command.name());

        match command {
            AgentCommand::Subscribe(payload) => {
                let symbols = Symbol::from_payload(&payload);
                self.subscribe(&symbols).await;
            }
            AgentCommand::ConnectionOpen => {
                self.connection_open().await;
            }
            AgentCommand::TimeSeries(request) => self.time_series(request),
            AgentCommand::Profile(request) => {
                if let Err(e) = self.controller.query_profile(&request).await {
                    tracing::warn!(error = %e, "Profile request failed");
                }
            }
        }
    }

    /// Subscribe to `symbols` in batches, strictly in sequence.
    ///
    /// A rejected batch is logged and the remaining batches are still sent.
    pub async fn subscribe(&self, symbols: &[Symbol]) -> BatchReport {
        if symbols.is_empty() {
            tracing::debug!("No symbols to subscribe");
            return BatchReport::default();
        }

        let controller = &self.controller;
        let report = self
            .batcher
            .dispatch(symbols, move |batch| async move {
                let result = controller.subscribe_batch(&batch).await;
                metrics::record_subscribe_batch(if result.is_ok() {
                    Outcome::Ok
                } else {
                    Outcome::Failed
                });
                result
            })
            .await;

        for failure in &report.failures {
            tracing::warn!(
                batch = failure.index,
                symbols = failure.size,
                error = %failure.reason,
                "Subscribe batch failed"
            );
        }

        tracing::info!(
            symbols = report.symbols,
            batches = report.batches,
            failed = report.failures.len(),
            "Subscribed"
        );
        report
    }

    /// Replay the configured universe through the batching path.
    pub async fn connection_open(&self) -> BatchReport {
        tracing::info!(universe = self.universe.len(), "Replaying symbol universe");
        self.subscribe(&self.universe).await
    }

    /// Queue a time-series request on the worker pool.
    fn time_series(&self, request: Value) {
        let controller = Arc::clone(&self.controller);

        let submitted = self.dispatcher.submit("time_series", async move {
            controller.query_time_series(&request).await?;
            Ok::<(), anyhow::Error>(())
        });

        if let Ok(task_id) = submitted {
            tracing::debug!(task_id = %task_id, "Time series request queued");
        }
    }

    /// Process commands in arrival order until `shutdown` fires or every
    /// [`AgentHandle`] is dropped.
    pub async fn run(&self, mut commands: mpsc::Receiver<AgentCommand>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::debug!("Command intake cancelled");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        tracing::debug!("Command channel closed");
                        break;
                    }
                },
            }
        }
    }

    /// Tear the agent down.
    ///
    /// Queued worker-pool tasks are discarded, not awaited.
    pub async fn stop(self) {
        tracing::info!("Stopping feed agent");

        let discarded = self.dispatcher.shutdown();

        self.ticker_cancel.cancel();
        if let Err(e) = self.ticker.await {
            tracing::warn!(error = %e, "Metrics ticker ended abnormally");
        }

        self.controller.close().await;
        if let Err(e) = self.event_loop.await {
            tracing::warn!(error = %e, "Feed event loop ended abnormally");
        }

        tracing::info!(discarded, "Feed agent stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
