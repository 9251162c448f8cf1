//! Feed Session Controller
//!
//! Owns the single upstream feed session for the agent's lifetime. Every
//! subscribe and query call is routed through here, and only this controller
//! opens or closes the session.
//!
//! Connection progress is reported by the feed client as [`FeedEvent`]s and
//! applied by the controller's event loop, which is cancelled on close.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedClient, FeedError, FeedEvent};
use crate::domain::session::{SessionEvent, SessionState};
use crate::domain::subscription::{SubscriptionBatch, Symbol};
use crate::infrastructure::metrics;

/// Point-in-time view of the feed session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Current lifecycle state.
    pub state: SessionState,
    /// When the client last reported a connection.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Reconnect attempt reported by the client (0 once connected).
    pub reconnect_attempts: u32,
    /// Distinct symbols accepted by upstream subscribe calls.
    pub subscribed_symbols: usize,
    /// Last error reported by the client.
    pub last_error: Option<String>,
}

/// Lifecycle owner and call router for the upstream feed session.
pub struct FeedSessionController {
    client: Arc<dyn FeedClient>,
    state: RwLock<SessionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    subscribed: RwLock<HashSet<Symbol>>,
    cancel: CancellationToken,
}

impl FeedSessionController {
    /// Create a controller in the `Uninitialized` state.
    #[must_use]
    pub fn new(client: Arc<dyn FeedClient>) -> Self {
        Self {
            client,
            state: RwLock::new(SessionState::Uninitialized),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            subscribed: RwLock::new(HashSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Snapshot of the session for health reporting.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            subscribed_symbols: self.subscribed.read().len(),
            last_error: self.last_error.read().clone(),
        }
    }

    /// Apply a state machine event. Returns `false` if it was not valid in
    /// the current state.
    fn apply(&self, event: SessionEvent) -> bool {
        let mut state = self.state.write();
        let from = *state;

        let Some(to) = from.transition(event) else {
            tracing::debug!(from = from.as_str(), ?event, "Ignoring session event");
            return false;
        };

        *state = to;
        drop(state);

        if from != to {
            tracing::info!(from = from.as_str(), to = to.as_str(), "Feed session state changed");
            metrics::set_session_state(to);
        }
        true
    }

    /// Initiate the upstream connection (`Uninitialized → Connecting`).
    ///
    /// A failed initiation is logged, not returned: reconnection belongs to
    /// the feed client.
    pub async fn open(&self) {
        if !self.apply(SessionEvent::Start) {
            tracing::warn!(state = self.state().as_str(), "Feed session already started");
            return;
        }

        tracing::info!("Connecting to feed");
        if let Err(e) = self.client.connect().await {
            tracing::warn!(error = %e, "Feed connection initiation failed");
            *self.last_error.write() = Some(e.to_string());
        }
    }

    /// Spawn the loop that applies client-reported connection events.
    ///
    /// The loop ends when the session is closed or the client drops its
    /// sender.
    pub fn spawn_event_loop(self: &Arc<Self>, mut events: mpsc::Receiver<FeedEvent>) -> JoinHandle<()> {
        let controller = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = controller.cancel.cancelled() => {
                        tracing::debug!("Feed event loop cancelled");
                        break;
                    }
                    event = events.recv() => {
                        match event {
                            Some(event) => controller.handle_event(event),
                            None => {
                                tracing::debug!("Feed event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    /// Apply one feed client event.
    pub fn handle_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Connected => {
                if self.apply(SessionEvent::Connected) {
                    *self.last_connected_at.write() = Some(Utc::now());
                    *self.last_error.write() = None;
                    self.reconnect_attempts.store(0, Ordering::Relaxed);
                    tracing::info!("Feed connected");
                }
            }
            FeedEvent::Disconnected => {
                if self.apply(SessionEvent::Disconnected) {
                    tracing::warn!("Feed disconnected");
                }
            }
            FeedEvent::Reconnecting { attempt } => {
                if self.apply(SessionEvent::Disconnected) {
                    self.reconnect_attempts.store(attempt, Ordering::Relaxed);
                    tracing::info!(attempt, "Feed reconnecting");
                }
            }
            FeedEvent::Error(msg) => {
                tracing::error!(error = %msg, "Feed error");
                *self.last_error.write() = Some(msg);
            }
        }
    }

    fn ensure_open(&self) -> Result<(), FeedError> {
        if self.state().accepts_calls() {
            Ok(())
        } else {
            Err(FeedError::SessionClosed)
        }
    }

    /// Forward one batch as a single upstream subscribe call.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::SessionClosed`] after close, or the client's
    /// error.
    pub async fn subscribe_batch(&self, batch: &SubscriptionBatch) -> Result<(), FeedError> {
        self.ensure_open()?;

        tracing::debug!(symbols = batch.len(), "Subscribing batch");
        self.client.subscribe(batch).await?;

        self.subscribed
            .write()
            .extend(batch.symbols().iter().cloned());
        Ok(())
    }

    /// Forward a time-series request.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::SessionClosed`] after close, or the client's
    /// error.
    pub async fn query_time_series(&self, request: &Value) -> Result<(), FeedError> {
        self.ensure_open()?;
        self.client.time_series(request).await
    }

    /// Forward a profile request.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::SessionClosed`] after close, or the client's
    /// error.
    pub async fn query_profile(&self, request: &Value) -> Result<(), FeedError> {
        self.ensure_open()?;
        self.client.profile(request).await
    }

    /// Messages counted by the client since the previous drain.
    #[must_use]
    pub fn drain_message_count(&self) -> u64 {
        self.client.get_and_reset_messages_per_second()
    }

    /// Close the session (`→ Closed`), stop the event loop and release the
    /// client connection. Idempotent.
    pub async fn close(&self) {
        if !self.apply(SessionEvent::Shutdown) {
            return;
        }

        self.cancel.cancel();
        self.client.disconnect().await;
        tracing::info!("Feed session closed");
    }
}

// =============================================================================
// Tests
// =============================================================================
