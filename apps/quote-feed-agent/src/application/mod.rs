//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the agent's services and the port interface of the
//! upstream feed client they drive.

/// Port interfaces for external systems (feed client).
pub mod ports;

/// Application services: dispatcher, session, ticker and agent lifecycle.
pub mod services;
