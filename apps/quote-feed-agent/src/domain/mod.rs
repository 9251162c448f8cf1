//! Domain Layer - Core ingestion types and rules.
//!
//! Pure types with no runtime dependencies: symbol batching, message rate
//! counting and the feed session state machine.

/// Inbound message rate counting.
pub mod rate;

/// Feed session lifecycle state machine.
pub mod session;

/// Symbols and subscription batching.
pub mod subscription;
