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

//! Kafka publisher implementation.

use crate::kafka::config::KafkaConfig;
use async_trait::async_trait;
use ferry_core::classify::OutboundMessage;
use ferry_core::publisher::{DeliveryId, PublishError, Publisher};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Header carrying the change operation.
pub const OPERATION_HEADER: &str = "operation";

/// Publishes change events to a single Kafka topic.
///
/// Cloning is cheap; clones share the underlying producer.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    config: KafkaConfig,
}

impl std::fmt::Debug for KafkaPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaPublisher")
            .field("brokers", &self.config.brokers)
            .field("topic", &self.config.topic)
            .finish_non_exhaustive()
    }
}

impl KafkaPublisher {
    /// Creates a producer for the configured brokers.
    ///
    /// librdkafka connects lazily, so an unreachable broker is not reported
    /// here; the first `publish` times out instead.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Configuration`] if librdkafka rejects the
    /// client configuration.
    pub fn new(config: KafkaConfig) -> Result<Self, PublishError> {
        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            acks = config.acks.as_str(),
            "Initializing Kafka publisher"
        );

        let producer: FutureProducer = config.client_config().create().map_err(|e| {
            PublishError::configuration(
                format!("Failed to create Kafka producer: {e}"),
                Some("kafka_client".to_string()),
            )
        })?;

        Ok(Self { producer, config })
    }

    /// Target topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Classifies librdkafka errors into `PublishError` variants.
    fn classify_kafka_error(error: KafkaError, timeout: Duration) -> PublishError {
        let Some(code) = error.rdkafka_error_code() else {
            return match error {
                KafkaError::Canceled => PublishError::connection_msg("Kafka producer was shut down"),
                other => PublishError::rejected(other, false),
            };
        };

        match code {
            RDKafkaErrorCode::MessageTimedOut | RDKafkaErrorCode::RequestTimedOut => {
                PublishError::Timeout(timeout)
            }

            // Broker or network trouble
            RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::NetworkException => PublishError::Connection {
                message: error.to_string(),
                source: Some(Box::new(error)),
            },

            // Transient broker-side conditions
            RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::NotEnoughReplicas
            | RDKafkaErrorCode::NotEnoughReplicasAfterAppend
            | RDKafkaErrorCode::UnknownTopicOrPartition => PublishError::rejected(error, true),

            RDKafkaErrorCode::MessageSizeTooLarge | RDKafkaErrorCode::InvalidMessageSize => {
                PublishError::Serialization(error.to_string())
            }

            RDKafkaErrorCode::TopicAuthorizationFailed
            | RDKafkaErrorCode::ClusterAuthorizationFailed
            | RDKafkaErrorCode::InvalidTopic => PublishError::configuration(
                error.to_string(),
                Some("topic".to_string()),
            ),

            _ => PublishError::rejected(error, false),
        }
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, message: &OutboundMessage) -> Result<DeliveryId, PublishError> {
        let operation = message.operation().as_str();
        let headers = OwnedHeaders::new().insert(Header {
            key: OPERATION_HEADER,
            value: Some(operation.as_bytes()),
        });

        let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(&self.config.topic)
            .payload(message.payload())
            .headers(headers);
        if let Some(key) = message.key() {
            record = record.key(key);
        }

        let timeout = self.config.message_timeout;
        match self.producer.send(record, timeout).await {
            Ok((partition, offset)) => {
                debug!(
                    topic = %self.config.topic,
                    partition,
                    offset,
                    operation,
                    "Record acknowledged"
                );
                Ok(DeliveryId::new(format!("{partition}:{offset}")))
            }
            Err((error, _)) => {
                warn!(
                    topic = %self.config.topic,
                    operation,
                    error = %error,
                    "Kafka publish failed"
                );
                Err(Self::classify_kafka_error(error, timeout))
            }
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<(), PublishError> {
        let producer = self.producer.clone();
        let in_flight = producer.in_flight_count();
        debug!(in_flight, "Flushing Kafka producer");

        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| PublishError::connection_msg(format!("Flush task failed: {e}")))?
            .map_err(|e| Self::classify_kafka_error(e, timeout))
    }

    fn name(&self) -> &str {
        "kafka"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_retryable() {
        let err = KafkaPublisher::classify_kafka_error(
            KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut),
            Duration::from_secs(5),
        );
        assert!(matches!(err, PublishError::Timeout(d) if d == Duration::from_secs(5)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_broker_down_is_connection_error() {
        let err = KafkaPublisher::classify_kafka_error(
            KafkaError::MessageProduction(RDKafkaErrorCode::AllBrokersDown),
            Duration::from_secs(5),
        );
        assert_eq!(err.category(), "connection");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_queue_full_is_retryable_rejection() {
        let err = KafkaPublisher::classify_kafka_error(
            KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull),
            Duration::from_secs(5),
        );
        assert_eq!(err.category(), "rejected");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_oversized_record_is_not_retryable() {
        let err = KafkaPublisher::classify_kafka_error(
            KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge),
            Duration::from_secs(5),
        );
        assert_eq!(err.category(), "serialization");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_authorization_failure_is_configuration_error() {
        let err = KafkaPublisher::classify_kafka_error(
            KafkaError::MessageProduction(RDKafkaErrorCode::TopicAuthorizationFailed),
            Duration::from_secs(5),
        );
        assert!(matches!(err, PublishError::Configuration { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_canceled_producer_is_connection_error() {
        let err = KafkaPublisher::classify_kafka_error(KafkaError::Canceled, Duration::from_secs(5));
        assert_eq!(err.category(), "connection");
    }
}
