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

//! Tests for the Kafka publisher that need no running broker.

use bson::doc;
use ferry_core::classify::{classify, ClassifyPolicy, OutboundMessage};
use ferry_core::event::{ChangeEvent, Namespace, OperationType, ResumeToken};
use ferry_core::publisher::{PublishError, Publisher};
use ferry_publishers::kafka::{KafkaConfig, KafkaPublisher};
use std::time::Duration;

fn insert_message() -> OutboundMessage {
    let event = ChangeEvent {
        operation: OperationType::Insert,
        namespace: Namespace::new("sample_mflix", "movies"),
        document_key: Some(doc! { "_id": 1 }),
        full_document: Some(doc! { "_id": 1, "title": "Inception" }),
        update_description: None,
        cluster_time: None,
        resume_token: ResumeToken::from_data("T100"),
    };
    classify(&event, &ClassifyPolicy::default()).expect("insert is publishable")
}

#[test]
fn test_config_builder_missing_brokers() {
    let result = KafkaConfig::builder().topic("movies-cdc").build();

    let err = result.unwrap_err();
    assert!(err.to_string().contains("brokers"));
    assert!(!err.is_retryable());
}

#[test]
fn test_config_builder_empty_topic() {
    let result = KafkaConfig::builder()
        .brokers("localhost:9092")
        .topic("  ")
        .build();

    assert!(result.unwrap_err().to_string().contains("empty"));
}

#[test]
fn test_publisher_creation_is_lazy() {
    let config = KafkaConfig::builder()
        .brokers("127.0.0.1:1")
        .topic("movies-cdc")
        .build()
        .unwrap();

    let publisher = KafkaPublisher::new(config).expect("producer is created without a broker");
    assert_eq!(publisher.name(), "kafka");
    assert_eq!(publisher.topic(), "movies-cdc");
}

#[tokio::test]
async fn test_unreachable_broker_times_out() {
    let config = KafkaConfig::builder()
        .brokers("127.0.0.1:1")
        .topic("movies-cdc")
        .message_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let publisher = KafkaPublisher::new(config).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(15), publisher.publish(&insert_message()))
        .await
        .expect("librdkafka resolves the delivery future after message.timeout.ms");

    let err = result.unwrap_err();
    assert!(matches!(err, PublishError::Timeout(_)), "unexpected error: {err:?}");
    assert!(err.is_retryable());
}
