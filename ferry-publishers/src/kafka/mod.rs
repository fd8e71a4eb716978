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

//! Kafka publisher for forwarding change events to a topic.
//!
//! Every [`OutboundMessage`](ferry_core::classify::OutboundMessage) becomes one
//! Kafka record:
//!
//! - **value**: the JSON payload (full document, or a tombstone for deletes)
//! - **key**: the document key as JSON, so changes to one document keep their order
//! - **header** `operation`: the change operation (`insert`, `update`, ...)
//!
//! `publish` resolves once the broker acknowledges the record, and the delivery
//! id is `"<partition>:<offset>"`.
//!
//! # Examples
//!
//! ## Durable delivery with a custom client id
//!
//! ```rust,no_run
//! use ferry_publishers::kafka::{KafkaConfig, KafkaPublisher};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KafkaConfig::builder()
//!     .brokers("kafka-1:9092,kafka-2:9092")
//!     .topic("movies-cdc")
//!     .client_id("ferry-movies")
//!     .message_timeout(Duration::from_secs(10))
//!     .property("compression.type", "lz4")
//!     .build()?;
//!
//! let publisher = KafkaPublisher::new(config)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod publisher;

pub use config::{KafkaConfig, KafkaConfigBuilder};
pub use publisher::KafkaPublisher;
