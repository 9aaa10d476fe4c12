//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `cm-gateway.toml` configuration file
//! 3. Default values
//!
//! `${VAR_NAME}` inside the configuration file is replaced with the value of
//! the environment variable, so connection strings can stay out of the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::Error;

/// Default configuration file name
pub const CONFIG_FILE: &str = "cm-gateway.toml";

/// Memory (chat history) configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    /// Connection string of the document database. `None` leaves the
    /// conversation buffer unbound: reads are empty, writes are skipped.
    pub endpoint: Option<String>,

    /// Database name
    #[serde(default = "default_database")]
    pub database: String,

    /// Collection holding one document per session
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Default session identifier (generated when absent)
    pub session_id: Option<String>,

    /// Key under which the history is exposed to prompt templates
    #[serde(default = "default_memory_key")]
    pub memory_key: String,

    /// Deadline for each connect/read/append/delete, unbounded when `None`
    pub operation_timeout_ms: Option<u64>,

    /// Deadline for the liveness probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            database: default_database(),
            collection: default_collection(),
            session_id: None,
            memory_key: default_memory_key(),
            operation_timeout_ms: None,
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl MemoryConfig {
    /// Configured endpoint, ignoring blank strings
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Whether a collection can be bound
    pub fn is_bound(&self) -> bool {
        self.endpoint().is_some()
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Retry policy used while establishing a connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Retries after the first attempt
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Lower bound of the randomized delay between attempts
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized delay between attempts
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffConfig {
    /// Total number of attempts (first try plus retries)
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(Error::Config(format!(
                "backoff min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

fn default_database() -> String {
    "chat_memory".to_string()
}

fn default_collection() -> String {
    "chat_history".to_string()
}

fn default_memory_key() -> String {
    "chat_history".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_retries() -> u32 {
    2
}

fn default_min_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    5_000
}

/// Main configuration for cm-gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Connection retry policy
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Config {
    /// Replace `${VAR_NAME}` with the value of the environment variable
    ///
    /// Unknown variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file
    ///
    /// `${VAR_NAME}` in the file is expanded, then environment variables
    /// override file values.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let expanded_content = Self::expand_env_vars(&toml_content);

        let config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut cfg = Self::from_toml_config(config);
        cfg.apply_env_overrides();
        cfg.backoff.validate()?;

        Ok(cfg)
    }

    /// Load configuration from the default location
    ///
    /// Uses `./cm-gateway.toml` when present, otherwise environment variables only.
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.backoff.validate()?;
        Ok(cfg)
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let memory = toml.memory.unwrap_or_default();
        let memory_config = MemoryConfig {
            endpoint: memory.endpoint,
            database: memory.database.unwrap_or_else(default_database),
            collection: memory.collection.unwrap_or_else(default_collection),
            session_id: memory.session_id,
            memory_key: memory.memory_key.unwrap_or_else(default_memory_key),
            operation_timeout_ms: memory.operation_timeout_ms,
            probe_timeout_ms: memory
                .probe_timeout_ms
                .unwrap_or_else(default_probe_timeout_ms),
        };

        let backoff = toml.backoff.unwrap_or_default();
        let backoff_config = BackoffConfig {
            retries: backoff.retries.unwrap_or_else(default_retries),
            min_delay_ms: backoff.min_delay_ms.unwrap_or_else(default_min_delay_ms),
            max_delay_ms: backoff.max_delay_ms.unwrap_or_else(default_max_delay_ms),
        };

        Config {
            memory: memory_config,
            backoff: backoff_config,
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup (the process environment in practice)
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = non_empty("MEMORY_ENDPOINT") {
            self.memory.endpoint = Some(endpoint);
        }
        if let Some(database) = non_empty("MEMORY_DATABASE") {
            self.memory.database = database;
        }
        if let Some(collection) = non_empty("MEMORY_COLLECTION") {
            self.memory.collection = collection;
        }
        if let Some(session_id) = non_empty("MEMORY_SESSION_ID") {
            self.memory.session_id = Some(session_id);
        }
        if let Some(key) = non_empty("MEMORY_KEY") {
            self.memory.memory_key = key;
        }
        if let Some(ms) = parse_var(&non_empty, "MEMORY_OPERATION_TIMEOUT_MS") {
            self.memory.operation_timeout_ms = Some(ms);
        }
        if let Some(ms) = parse_var(&non_empty, "MEMORY_PROBE_TIMEOUT_MS") {
            self.memory.probe_timeout_ms = ms;
        }
        if let Some(retries) = parse_var(&non_empty, "MEMORY_CONNECT_RETRIES") {
            self.backoff.retries = retries;
        }
        if let Some(ms) = parse_var(&non_empty, "MEMORY_RETRY_MIN_DELAY_MS") {
            self.backoff.min_delay_ms = ms;
        }
        if let Some(ms) = parse_var(&non_empty, "MEMORY_RETRY_MAX_DELAY_MS") {
            self.backoff.max_delay_ms = ms;
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    memory: Option<TomlMemoryConfig>,
    backoff: Option<TomlBackoffConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlMemoryConfig {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    memory_key: Option<String>,
    #[serde(default)]
    operation_timeout_ms: Option<u64>,
    #[serde(default)]
    probe_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlBackoffConfig {
    retries: Option<u32>,
    min_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}
