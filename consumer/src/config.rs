use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Raw configuration as extracted from the environment. Exactly one of the
/// request pair and one of the widget pair must be set; [`Config::resolve`]
/// enforces this before the polling loop is allowed to start.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub request_bucket: Option<String>,
    pub request_queue: Option<String>,

    pub widget_bucket: Option<String>,
    pub widget_table: Option<String>,

    // The number of consecutive unproductive polls before terminating
    #[serde(default = "default_max_idle_polls")]
    pub max_idle_polls: u32,
    // Pause between unproductive polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_max_idle_polls() -> u32 {
    15
}

const fn default_poll_interval_ms() -> u64 {
    100
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing the request location: set REQUEST_BUCKET or REQUEST_QUEUE")]
    MissingSource,
    #[error(
        "mismatched options: REQUEST_BUCKET and REQUEST_QUEUE are mutually exclusive"
    )]
    AmbiguousSource,
    #[error("missing the widget location: set WIDGET_BUCKET or WIDGET_TABLE")]
    MissingSink,
    #[error(
        "mismatched options: WIDGET_BUCKET and WIDGET_TABLE are mutually exclusive"
    )]
    AmbiguousSink,
}

/// Where pending requests are polled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Bucket(String),
    Queue(String),
}

/// Where widgets are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    Bucket(String),
    Table(String),
}

/// Fully resolved settings for one consumer run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub max_idle_polls: u32,
    pub poll_interval: Duration,
}

impl Config {
    /// Resolve the raw either-or pairs into tagged variants. An empty string
    /// counts as unset so that `REQUEST_BUCKET=""` does not mask a missing
    /// location.
    ///
    /// # Errors
    /// When both or neither of a pair is configured.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let source = match (
            non_empty(&self.request_bucket),
            non_empty(&self.request_queue),
        ) {
            (Some(bucket), None) => SourceConfig::Bucket(bucket.to_string()),
            (None, Some(queue)) => SourceConfig::Queue(queue.to_string()),
            (Some(_), Some(_)) => return Err(ConfigError::AmbiguousSource),
            (None, None) => return Err(ConfigError::MissingSource),
        };

        let sink = match (
            non_empty(&self.widget_bucket),
            non_empty(&self.widget_table),
        ) {
            (Some(bucket), None) => SinkConfig::Bucket(bucket.to_string()),
            (None, Some(table)) => SinkConfig::Table(table.to_string()),
            (Some(_), Some(_)) => return Err(ConfigError::AmbiguousSink),
            (None, None) => return Err(ConfigError::MissingSink),
        };

        Ok(Settings {
            source,
            sink,
            max_idle_polls: self.max_idle_polls,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

impl fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bucket(bucket) => write!(f, "request bucket '{bucket}'"),
            Self::Queue(queue) => write!(f, "request queue '{queue}'"),
        }
    }
}

impl fmt::Display for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bucket(bucket) => write!(f, "widget bucket '{bucket}'"),
            Self::Table(table) => write!(f, "widget table '{table}'"),
        }
    }
}
