use crate::FlightError;
use std::fs;
use std::path::Path;

/// What the query executor does when a statement fails.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and hand back an empty result.
    DegradeToEmpty,
    /// Return the error to the caller.
    Propagate,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::DegradeToEmpty
    }
}

/// Settings for the data source and the executor.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FlightsConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Number of pooled read connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// How long SQLite waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// How long `acquire` waits for a free pooled connection, in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_db_path() -> String {
    String::from("flights.sqlite3")
}

const fn default_pool_size() -> usize {
    4
}

const fn default_busy_timeout_ms() -> u64 {
    5000
}

const fn default_acquire_timeout_ms() -> u64 {
    30000
}

impl Default for FlightsConfig {
    fn default() -> Self {
        FlightsConfig {
            db_path: default_db_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl FlightsConfig {
    /// Config for the given database with every other setting at its default.
    pub fn new(db_path: &str) -> Self {
        FlightsConfig {
            db_path: db_path.to_string(),
            ..FlightsConfig::default()
        }
    }

    /// Loads and validates a JSON config file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FlightError> {
        let contents = fs::read_to_string(path)?;
        let config: FlightsConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FlightError> {
        if self.db_path.trim().is_empty() {
            return Err(FlightError::ConfigError(String::from(
                "db_path must not be empty",
            )));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(FlightError::ConfigError(String::from(
                "acquire_timeout_ms must be greater than zero",
            )));
        }
        if self.pool_size == 0 {
            return Err(FlightError::ConfigError(String::from(
                "pool_size must be greater than zero",
            )));
        }
        Ok(())
    }
}
