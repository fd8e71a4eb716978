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

//! Publisher implementations for Ferry.
//!
//! This crate provides transports for the
//! [`Publisher`](ferry_core::publisher::Publisher) trait. A publisher takes the
//! JSON payload built for one change event and resolves once the transport has
//! confirmed or rejected it; the forwarder only advances its checkpoint on
//! confirmation.
//!
//! # Available Publishers
//!
//! - **Kafka**: one topic, keyed by document key so every change to a document
//!   lands on the same partition
//!
//! # Feature Flags
//!
//! - `kafka` (default): Enables the Kafka publisher (builds librdkafka)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ferry_publishers::kafka::{KafkaConfig, KafkaPublisher};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KafkaConfig::builder()
//!     .brokers("localhost:9092")
//!     .topic("movies-cdc")
//!     .build()?;
//!
//! let publisher = KafkaPublisher::new(config)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

#[cfg(feature = "kafka")]
pub mod kafka;
