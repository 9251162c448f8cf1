//! Application Services
//!
//! Services that orchestrate domain logic around the feed client port.
//!
//! - `dispatcher`: bounded worker pool for slow upstream queries
//! - `session`: owner of the single upstream feed session
//! - `ticker`: periodic throughput sampling and publication
//! - `agent`: startup/shutdown orchestration and the command surface

pub mod agent;
pub mod dispatcher;
pub mod session;
pub mod ticker;

pub use agent::{AgentCommand, AgentError, AgentHandle, FeedAgent};
pub use dispatcher::{AsyncDispatcher, DispatchError, DispatcherStats};
pub use session::FeedSessionController;
pub use ticker::{MetricsTicker, ThroughputState};
