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

//! Ferry Core - change stream to topic forwarding
//!
//! This crate provides the types, collaborator traits and the forwarding loop
//! that moves `MongoDB` change notifications onto a pub/sub topic with a
//! durable resume checkpoint.
//!
//! # Key Components
//!
//! - **Events**: [`event`] defines change notifications and resume tokens
//! - **Classification**: [`classify`] turns a notification into a payload or a skip
//! - **Collaborators**: [`source::ChangeSource`], [`checkpoint::CheckpointStore`]
//!   and [`publisher::Publisher`]
//! - **MongoDB**: [`stream::MongoChangeSource`]
//! - **Loop**: [`forwarder::Forwarder`]
//!
//! # Example
//!
//! ```rust
//! use ferry_core::classify::{classify, ClassifyPolicy, SkipReason};
//! use ferry_core::event::ChangeEvent;
//!
//! fn describe(event: &ChangeEvent) -> String {
//!     match classify(event, &ClassifyPolicy::reference()) {
//!         Ok(message) => format!("publish {} bytes", message.len()),
//!         Err(SkipReason::DeleteSuppressed) => "delete dropped".to_string(),
//!         Err(reason) => format!("skip: {reason}"),
//!     }
//! }
//! ```

pub mod checkpoint;
pub mod classify;
pub mod event;
pub mod forwarder;
pub mod metrics;
pub mod publisher;
pub mod source;
pub mod stream;
