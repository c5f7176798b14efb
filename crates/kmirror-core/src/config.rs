//! Worker configuration.
//!
//! [`WorkerConfig`] carries the knobs the mirroring core itself consumes;
//! cluster-level tuning lives in the per-adapter property maps (see
//! [`crate::kafka::KafkaConsumerConfig`] and
//! [`crate::kafka::KafkaProducerConfig`]). Property files are plain
//! `key=value` lines, the same family as the topic-mapping file.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::MirrorError;

/// Worker-level key: abort the process on any send failure.
pub const ABORT_ON_SEND_FAILURE: &str = "abort.on.send.failure";
/// Worker-level key: interval between offset commits, in milliseconds.
pub const OFFSET_COMMIT_INTERVAL_MS: &str = "offset.commit.interval.ms";
/// Worker-level key in the consumer properties: stream poll timeout.
pub const CONSUMER_TIMEOUT_MS: &str = "consumer.timeout.ms";
/// Worker-level key in the producer properties: close grace period.
pub const PRODUCER_CLOSE_TIMEOUT_MS: &str = "producer.close.timeout.ms";

/// Configuration consumed by the mirroring core.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Treat any producer send failure as fatal to the process. When
    /// `false`, failed records are counted as dropped and the barrier
    /// may commit offsets past them, leaving a gap in the mirrored
    /// stream.
    pub abort_on_send_failure: bool,
    /// Minimum interval between offset commits.
    pub offset_commit_interval: Duration,
    /// How long a single stream poll waits before signalling a timeout.
    pub consumer_poll_timeout: Duration,
    /// Grace period for closing the producer on clean shutdown. The
    /// abort path always uses zero grace.
    pub producer_close_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            abort_on_send_failure: true,
            offset_commit_interval: Duration::from_millis(60_000),
            consumer_poll_timeout: Duration::from_millis(10_000),
            producer_close_timeout: Duration::from_millis(30_000),
        }
    }
}

impl WorkerConfig {
    /// Creates a config from the CLI-level knobs, leaving the rest at
    /// their defaults.
    #[must_use]
    pub fn new(abort_on_send_failure: bool, offset_commit_interval: Duration) -> Self {
        Self {
            abort_on_send_failure,
            offset_commit_interval,
            ..Self::default()
        }
    }

    /// Applies worker-level keys found in the consumer properties
    /// (`consumer.timeout.ms`, defaulted to 10000 when unset).
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Configuration`] if a value fails to parse.
    pub fn apply_consumer_properties(
        mut self,
        properties: &HashMap<String, String>,
    ) -> Result<Self, MirrorError> {
        if let Some(ms) = parse_millis(properties, CONSUMER_TIMEOUT_MS)? {
            self.consumer_poll_timeout = ms;
        }
        Ok(self)
    }

    /// Applies worker-level keys found in the producer properties
    /// (`producer.close.timeout.ms`).
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Configuration`] if a value fails to parse.
    pub fn apply_producer_properties(
        mut self,
        properties: &HashMap<String, String>,
    ) -> Result<Self, MirrorError> {
        if let Some(ms) = parse_millis(properties, PRODUCER_CLOSE_TIMEOUT_MS)? {
            self.producer_close_timeout = ms;
        }
        Ok(self)
    }
}

fn parse_millis(
    properties: &HashMap<String, String>,
    key: &str,
) -> Result<Option<Duration>, MirrorError> {
    match properties.get(key) {
        None => Ok(None),
        Some(value) => value
            .parse::<u64>()
            .map(Duration::from_millis)
            .map(Some)
            .map_err(|e| {
                MirrorError::Configuration(format!("invalid value for '{key}': {e}"))
            }),
    }
}

/// Loads a `key=value` properties file.
///
/// Blank lines and lines starting with `#` are skipped. The value may
/// contain `=`; only the first one splits key from value.
///
/// # Errors
///
/// Returns [`MirrorError::Io`] if the file cannot be read, or
/// [`MirrorError::Configuration`] for a non-comment line without `=`.
pub fn load_properties(path: &Path) -> Result<HashMap<String, String>, MirrorError> {
    let contents = std::fs::read_to_string(path)?;
    parse_properties(&contents)
}

/// Parses `key=value` properties file contents.
///
/// # Errors
///
/// Returns [`MirrorError::Configuration`] for a non-comment line
/// without `=`.
pub fn parse_properties(contents: &str) -> Result<HashMap<String, String>, MirrorError> {
    let mut properties = HashMap::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(MirrorError::Configuration(format!(
                "line {}: expected key=value, got '{line}'",
                idx + 1
            )));
        };
        properties.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(properties)
}
