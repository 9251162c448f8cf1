//! Agent Configuration Settings
//!
//! Configuration types for the quote feed agent, loaded from environment
//! variables.

use std::path::Path;
use std::time::Duration;

use crate::application::services::dispatcher::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::application::services::ticker::DEFAULT_INTERVAL;
use crate::domain::subscription::Symbol;

/// Environment variable holding the feed credential.
pub const TOKEN_VAR: &str = "TOKEN";

/// Feed API credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Validate a raw token read from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] if absent and
    /// [`ConfigError::EmptyValue`] if blank.
    pub fn from_raw(token: Option<&str>) -> Result<Self, ConfigError> {
        let token = token.ok_or_else(|| ConfigError::MissingEnvVar(TOKEN_VAR.to_string()))?;
        let token = token.trim();

        if token.is_empty() {
            return Err(ConfigError::EmptyValue(TOKEN_VAR.to_string()));
        }

        Ok(Self(token.to_string()))
    }

    /// Get the token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}

/// Worker pool settings for offloaded queries.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Number of worker tasks.
    pub worker_threads: usize,
    /// Maximum queued tasks before submissions are rejected.
    pub queue_capacity: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health and metrics HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Settings for the simulated feed used in demo mode.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Messages per second generated for each subscribed symbol.
    pub simulated_rate: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self { simulated_rate: 5 }
    }
}

/// Complete agent configuration.
#[derive(Clone)]
pub struct AgentConfig {
    /// Raw feed credential. Validated when the agent starts.
    pub token: Option<String>,
    /// Symbol universe replayed on connection open.
    pub symbols: Vec<Symbol>,
    /// Throughput sampling interval.
    pub metrics_interval: Duration,
    /// Bound of the command intake channel.
    pub command_queue_capacity: usize,
    /// Worker pool settings.
    pub dispatcher: DispatcherSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Simulated feed settings.
    pub feed: FeedSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            token: None,
            symbols: Vec::new(),
            metrics_interval: DEFAULT_INTERVAL,
            command_queue_capacity: 256,
            dispatcher: DispatcherSettings::default(),
            server: ServerSettings::default(),
            feed: FeedSettings::default(),
        }
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("symbols", &self.symbols)
            .field("metrics_interval", &self.metrics_interval)
            .field("command_queue_capacity", &self.command_queue_capacity)
            .field("dispatcher", &self.dispatcher)
            .field("server", &self.server)
            .field("feed", &self.feed)
            .finish()
    }
}

impl AgentConfig {
    /// Create configuration from environment variables.
    ///
    /// The credential is not required here; [`AgentConfig::credential`]
    /// enforces it when the agent starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbols file cannot be read or parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbols file cannot be read or parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let symbols = match lookup("AGENT_SYMBOLS_FILE").filter(|p| !p.trim().is_empty()) {
            Some(path) => load_symbols_file(Path::new(path.trim()))?,
            None => lookup("AGENT_SYMBOLS")
                .map(|list| Symbol::parse_list(&list))
                .unwrap_or_default(),
        };

        let dispatcher = DispatcherSettings {
            worker_threads: parse_or(
                &lookup,
                "AGENT_WORKER_THREADS",
                defaults.dispatcher.worker_threads,
            ),
            queue_capacity: parse_or(
                &lookup,
                "AGENT_TASK_QUEUE_CAPACITY",
                defaults.dispatcher.queue_capacity,
            ),
        };

        let metrics_interval = lookup("AGENT_METRICS_INTERVAL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map_or(defaults.metrics_interval, Duration::from_millis);

        Ok(Self {
            token: lookup(TOKEN_VAR),
            symbols,
            metrics_interval,
            command_queue_capacity: parse_or(
                &lookup,
                "AGENT_COMMAND_QUEUE_CAPACITY",
                defaults.command_queue_capacity,
            )
            .max(1),
            dispatcher,
            server: ServerSettings {
                health_port: parse_or(&lookup, "AGENT_HEALTH_PORT", defaults.server.health_port),
            },
            feed: FeedSettings {
                simulated_rate: parse_or(
                    &lookup,
                    "AGENT_SIMULATED_RATE",
                    defaults.feed.simulated_rate,
                ),
            },
        })
    }

    /// Validate the configured credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is missing or empty.
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        Credential::from_raw(self.token.as_deref())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be interpreted.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
    /// Symbols file unreadable or malformed.
    #[error("failed to load symbols file {path}: {reason}")]
    SymbolsFile {
        /// File path.
        path: String,
        /// Underlying error.
        reason: String,
    },
}

/// Read a JSON array of symbol strings.
fn load_symbols_file(path: &Path) -> Result<Vec<Symbol>, ConfigError> {
    let symbols_file_error = |reason: String| ConfigError::SymbolsFile {
        path: path.display().to_string(),
        reason,
    };

    let contents = std::fs::read_to_string(path).map_err(|e| symbols_file_error(e.to_string()))?;
    let raw: Vec<String> =
        serde_json::from_str(&contents).map_err(|e| symbols_file_error(e.to_string()))?;

    Ok(raw.iter().filter_map(|s| Symbol::new(s)).collect())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            let error = ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
            };
            tracing::warn!(error = %error, "Falling back to default");
            default
        }),
        None => default,
    }
}
