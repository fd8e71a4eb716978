// Copyright 2025 Ferry Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Kafka publisher configuration.

use ferry_core::publisher::PublishError;
use rdkafka::ClientConfig;
use std::time::Duration;

/// Default client id reported to the brokers.
pub const DEFAULT_CLIENT_ID: &str = "ferry";

/// Default time librdkafka keeps trying to deliver one record.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// How many broker acknowledgements a record needs before it counts as delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acks {
    /// Fire and forget. Delivery ids carry offset `-1`.
    None,

    /// The partition leader has written the record.
    Leader,

    /// Every in-sync replica has written the record.
    #[default]
    All,
}

impl Acks {
    /// Returns the librdkafka value for `acks`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "0",
            Self::Leader => "1",
            Self::All => "all",
        }
    }
}

/// Configuration for [`KafkaPublisher`](super::KafkaPublisher).
///
/// # Examples
///
/// ```rust
/// use ferry_publishers::kafka::KafkaConfig;
///
/// let config = KafkaConfig::builder()
///     .brokers("localhost:9092")
///     .topic("movies-cdc")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.client_id, "ferry");
/// assert!(config.enable_idempotence);
/// ```
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers (required).
    pub brokers: String,

    /// Target topic (required).
    pub topic: String,

    /// Client id (default: `ferry`).
    pub client_id: String,

    /// Acknowledgement level (default: [`Acks::All`]).
    pub acks: Acks,

    /// Delivery timeout per record (default: 5s).
    ///
    /// Maps to `message.timeout.ms`. A record that is not acknowledged in time
    /// fails with [`PublishError::Timeout`].
    pub message_timeout: Duration,

    /// Idempotent producer (default: true).
    ///
    /// Prevents duplicates from librdkafka's own retries. Requires `acks=all`.
    pub enable_idempotence: bool,

    /// Extra librdkafka properties, applied last.
    pub properties: Vec<(String, String)>,
}

impl KafkaConfig {
    /// Creates a new builder for `KafkaConfig`.
    #[must_use]
    pub fn builder() -> KafkaConfigBuilder {
        KafkaConfigBuilder::default()
    }

    /// Builds the librdkafka client configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("acks", self.acks.as_str())
            .set(
                "message.timeout.ms",
                self.message_timeout.as_millis().to_string(),
            )
            .set("enable.idempotence", self.enable_idempotence.to_string());

        for (key, value) in &self.properties {
            client.set(key, value);
        }

        client
    }
}

/// Builder for [`KafkaConfig`].
#[derive(Debug, Default)]
pub struct KafkaConfigBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    client_id: Option<String>,
    acks: Option<Acks>,
    message_timeout: Option<Duration>,
    enable_idempotence: Option<bool>,
    properties: Vec<(String, String)>,
}

impl KafkaConfigBuilder {
    /// Sets the bootstrap servers (required).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Sets the target topic (required).
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the client id (default: `ferry`).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the acknowledgement level (default: [`Acks::All`]).
    #[must_use]
    pub fn acks(mut self, acks: Acks) -> Self {
        self.acks = Some(acks);
        self
    }

    /// Sets the per-record delivery timeout (default: 5s).
    #[must_use]
    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = Some(timeout);
        self
    }

    /// Enables or disables the idempotent producer (default: enabled).
    #[must_use]
    pub fn enable_idempotence(mut self, enabled: bool) -> Self {
        self.enable_idempotence = Some(enabled);
        self
    }

    /// Adds a raw librdkafka property.
    ///
    /// Properties are applied after the typed settings and override them.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Builds the `KafkaConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Configuration`] if:
    /// - `brokers` or `topic` is missing or empty
    /// - `message_timeout` is zero
    /// - idempotence is enabled with an acknowledgement level other than `all`
    pub fn build(self) -> Result<KafkaConfig, PublishError> {
        let brokers = required(self.brokers, "brokers")?;
        let topic = required(self.topic, "topic")?;

        let client_id = self
            .client_id
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        let acks = self.acks.unwrap_or_default();
        let message_timeout = self.message_timeout.unwrap_or(DEFAULT_MESSAGE_TIMEOUT);
        let enable_idempotence = self.enable_idempotence.unwrap_or(true);

        if message_timeout.is_zero() {
            return Err(PublishError::configuration(
                "message_timeout must be greater than zero",
                Some("message_timeout".to_string()),
            ));
        }

        if enable_idempotence && acks != Acks::All {
            return Err(PublishError::configuration(
                format!(
                    "idempotent producer requires acks=all, got acks={}",
                    acks.as_str()
                ),
                Some("acks".to_string()),
            ));
        }

        Ok(KafkaConfig {
            brokers,
            topic,
            client_id,
            acks,
            message_timeout,
            enable_idempotence,
            properties: self.properties,
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, PublishError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(PublishError::configuration(
            format!("{name} cannot be empty"),
            Some(name.to_string()),
        )),
        None => Err(PublishError::configuration(
            format!("{name} is required"),
            Some(name.to_string()),
        )),
    }
}
