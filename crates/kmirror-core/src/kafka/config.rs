//! Kafka adapter configuration.
//!
//! [`KafkaConsumerConfig`] and [`KafkaProducerConfig`] are parsed from
//! `key=value` property maps. Arbitrary librdkafka properties pass
//! through; the handful the mirroring contract depends on are enforced,
//! and a user override of an enforced producer default is honoured with
//! a warning naming the property — the user is taking on possible data
//! loss or reordering.

use std::collections::HashMap;

use rdkafka::ClientConfig;
use tracing::warn;

use crate::config::{CONSUMER_TIMEOUT_MS, PRODUCER_CLOSE_TIMEOUT_MS};
use crate::error::MirrorError;

/// Producer defaults required for at-least-once, in-order mirroring.
/// Applied only when the user's properties leave them unset.
const PRODUCER_DEFAULTS: &[(&str, &str)] = &[
    // All in-sync replicas must acknowledge.
    ("acks", "all"),
    // Effectively unbounded retries; durability over latency.
    ("message.send.max.retries", "2147483647"),
    // One in-flight request preserves per-partition order under retries.
    ("max.in.flight.requests.per.connection", "1"),
    // Never time a record out locally.
    ("message.timeout.ms", "0"),
];

/// Keys consumed by the worker itself, never passed to librdkafka.
const WORKER_KEYS: &[&str] = &[CONSUMER_TIMEOUT_MS, PRODUCER_CLOSE_TIMEOUT_MS];

/// Configuration for the source-cluster consumer.
#[derive(Debug, Clone)]
pub struct KafkaConsumerConfig {
    /// Source cluster broker addresses.
    pub bootstrap_servers: String,
    /// Consumer group identifier.
    pub group_id: String,
    /// Consumer client identifier, used for metric tagging.
    pub client_id: String,
    /// Additional librdkafka properties (pass-through).
    pub properties: HashMap<String, String>,
}

impl KafkaConsumerConfig {
    /// Parses a consumer config from a property map.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::MissingConfig`] if `bootstrap.servers` or
    /// `group.id` is absent.
    pub fn from_properties(
        mut properties: HashMap<String, String>,
    ) -> Result<Self, MirrorError> {
        let bootstrap_servers = properties
            .remove("bootstrap.servers")
            .ok_or_else(|| MirrorError::MissingConfig("bootstrap.servers".into()))?;
        let group_id = properties
            .remove("group.id")
            .ok_or_else(|| MirrorError::MissingConfig("group.id".into()))?;
        let client_id = properties
            .remove("client.id")
            .unwrap_or_else(|| "kmirror-consumer".to_string());

        for key in WORKER_KEYS {
            properties.remove(*key);
        }

        Ok(Self {
            bootstrap_servers,
            group_id,
            client_id,
            properties,
        })
    }

    /// Builds the rdkafka client configuration.
    ///
    /// Auto-commit is forced off: the worker drives every commit through
    /// the flush-commit barrier. A user attempt to enable it is logged
    /// and overridden.
    #[must_use]
    pub fn to_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", &self.group_id)
            .set("client.id", &self.client_id);

        for (key, value) in &self.properties {
            if key == "enable.auto.commit" {
                warn!(
                    property = key.as_str(),
                    "consumer property is forced to false, user value ignored"
                );
                continue;
            }
            config.set(key, value);
        }
        config.set("enable.auto.commit", "false");

        config
    }
}

/// Configuration for the destination-cluster producer.
#[derive(Debug, Clone)]
pub struct KafkaProducerConfig {
    /// Destination cluster broker addresses.
    pub bootstrap_servers: String,
    /// Producer client identifier.
    pub client_id: String,
    /// Additional librdkafka properties (pass-through).
    pub properties: HashMap<String, String>,
}

impl KafkaProducerConfig {
    /// Parses a producer config from a property map.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::MissingConfig`] if `bootstrap.servers` is
    /// absent.
    pub fn from_properties(
        mut properties: HashMap<String, String>,
    ) -> Result<Self, MirrorError> {
        let bootstrap_servers = properties
            .remove("bootstrap.servers")
            .ok_or_else(|| MirrorError::MissingConfig("bootstrap.servers".into()))?;
        let client_id = properties
            .remove("client.id")
            .unwrap_or_else(|| "kmirror-producer".to_string());

        for key in WORKER_KEYS {
            properties.remove(*key);
        }

        Ok(Self {
            bootstrap_servers,
            client_id,
            properties,
        })
    }

    /// Builds the rdkafka client configuration.
    ///
    /// The mirroring defaults (`acks=all`, unbounded retries, one
    /// in-flight request, no local record timeout) are applied only
    /// where the user's properties leave them unset; each override is
    /// logged with the property name.
    #[must_use]
    pub fn to_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id);

        for (key, value) in &self.properties {
            config.set(key, value);
        }

        for (key, value) in PRODUCER_DEFAULTS {
            if let Some(user_value) = self.properties.get(*key) {
                warn!(
                    property = *key,
                    value = user_value.as_str(),
                    default = *value,
                    "producer override of a mirroring default, data loss or reordering possible"
                );
            } else {
                config.set(*key, *value);
            }
        }

        config
    }
}
