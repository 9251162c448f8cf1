//! Port Interfaces
//!
//! Contracts for the collaborators the agent drives but does not implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`FeedClient`]: the upstream market-data client. Owns the wire protocol,
//!   reconnection policy and per-message counting.
//!
//! ## Events (Inbound)
//!
//! - [`FeedEvent`]: connection lifecycle notifications the client reports
//!   back to the session controller.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::subscription::SubscriptionBatch;

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by a feed client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The client has no live connection and does not queue calls.
    #[error("feed client is not connected")]
    NotConnected,

    /// The session was closed at shutdown.
    #[error("feed session is closed")]
    SessionClosed,

    /// The upstream API rejected the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

// =============================================================================
// Feed Events
// =============================================================================

/// Connection lifecycle events emitted by a feed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Connection established.
    Connected,
    /// Connection lost.
    Disconnected,
    /// Client is reconnecting.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Non-fatal error reported by the upstream.
    Error(String),
}

// =============================================================================
// Feed Client
// =============================================================================

/// Upstream real-time quote feed.
///
/// One instance backs the agent's single feed session. Calls made before the
/// connection is established are queued or dropped by the implementation;
/// they must not panic.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Initiate the upstream connection. Success is reported later through
    /// [`FeedEvent::Connected`].
    async fn connect(&self) -> Result<(), FeedError>;

    /// Release the connection and stop any reconnection activity.
    async fn disconnect(&self);

    /// Subscribe to one batch of symbols.
    async fn subscribe(&self, batch: &SubscriptionBatch) -> Result<(), FeedError>;

    /// Fetch a historical time series for an opaque request payload.
    async fn time_series(&self, request: &Value) -> Result<(), FeedError>;

    /// Fetch a company profile for an opaque request payload.
    async fn profile(&self, request: &Value) -> Result<(), FeedError>;

    /// Messages received since the previous call; resets the count.
    fn get_and_reset_messages_per_second(&self) -> u64;
}
