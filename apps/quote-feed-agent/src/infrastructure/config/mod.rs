//! Configuration Module
//!
//! Configuration loading for the quote feed agent.

mod settings;

pub use settings::{
    AgentConfig, ConfigError, Credential, DispatcherSettings, FeedSettings, ServerSettings,
    TOKEN_VAR,
};
