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

//! Integration tests for the Kafka publisher.
//!
//! These tests start a Kafka broker in Docker. Run them with:
//!
//! ```bash
//! cargo test --package ferry-publishers --test kafka_integration_test -- --ignored
//! ```

use bson::doc;
use ferry_core::classify::{classify, ClassifyPolicy, OutboundMessage};
use ferry_core::event::{ChangeEvent, Namespace, OperationType, ResumeToken};
use ferry_core::publisher::Publisher;
use ferry_publishers::kafka::{KafkaConfig, KafkaPublisher};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Headers;
use rdkafka::{ClientConfig, Message};
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::{Kafka, KAFKA_PORT};

fn event(operation: OperationType, id: i32, token: &str) -> ChangeEvent {
    let full_document = match operation {
        OperationType::Delete => None,
        _ => Some(doc! { "_id": id, "title": "Inception", "year": 2010 }),
    };
    ChangeEvent {
        operation,
        namespace: Namespace::new("sample_mflix", "movies"),
        document_key: Some(doc! { "_id": id }),
        full_document,
        update_description: None,
        cluster_time: None,
        resume_token: ResumeToken::from_data(token),
    }
}

fn message(operation: OperationType, id: i32, token: &str) -> OutboundMessage {
    classify(&event(operation, id, token), &ClassifyPolicy::default()).expect("publishable")
}

fn consumer(brokers: &str, topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", "ferry-test")
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()
        .expect("failed to create consumer");
    consumer.subscribe(&[topic]).expect("failed to subscribe");
    consumer
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_publish_and_consume() {
    let kafka_node = Kafka::default()
        .start()
        .await
        .expect("failed to start Kafka container");
    let port = kafka_node
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("failed to get port");
    let brokers = format!("127.0.0.1:{port}");

    let config = KafkaConfig::builder()
        .brokers(&brokers)
        .topic("movies-cdc")
        .message_timeout(Duration::from_secs(30))
        .build()
        .expect("valid config");
    let publisher = KafkaPublisher::new(config).expect("failed to create publisher");

    let first = publisher
        .publish(&message(OperationType::Insert, 1, "T1"))
        .await
        .expect("insert delivered");
    let second = publisher
        .publish(&message(OperationType::Delete, 1, "T2"))
        .await
        .expect("tombstone delivered");

    let (partition, offset) = first.as_str().split_once(':').expect("partition:offset");
    assert_eq!(partition, "0");
    assert_eq!(offset, "0");
    assert_eq!(second.as_str(), "0:1");

    publisher
        .flush(Duration::from_secs(5))
        .await
        .expect("flush succeeds");

    let consumer = consumer(&brokers, "movies-cdc");
    let mut received = Vec::new();
    while received.len() < 2 {
        let record = tokio::time::timeout(Duration::from_secs(30), consumer.recv())
            .await
            .expect("record arrives in time")
            .expect("consumer error");

        let payload = String::from_utf8(record.payload().unwrap_or_default().to_vec()).unwrap();
        let key = String::from_utf8(record.key().unwrap_or_default().to_vec()).unwrap();
        let operation = record
            .headers()
            .and_then(|headers| headers.iter().find(|h| h.key == "operation"))
            .and_then(|h| h.value)
            .map(|v| String::from_utf8(v.to_vec()).unwrap());

        received.push((payload, key, operation));
    }

    assert_eq!(
        received[0],
        (
            r#"{"_id":1,"title":"Inception","year":2010}"#.to_string(),
            r#"{"_id":1}"#.to_string(),
            Some("insert".to_string()),
        )
    );
    assert_eq!(
        received[1],
        (
            r#"{"_id":{"_id":1},"operationType":"DELETE"}"#.to_string(),
            r#"{"_id":1}"#.to_string(),
            Some("delete".to_string()),
        )
    );
}
