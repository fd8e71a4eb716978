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

//! Checkpoint store implementations for Ferry.
//!
//! This crate provides backends for the
//! [`CheckpointStore`](ferry_core::checkpoint::CheckpointStore) trait, which
//! persists the forwarder's last confirmed resume token.
//!
//! # Available Stores
//!
//! - **Memory**: process-local, for tests and demos
//! - **MongoDB**: a single document in a checkpoint collection (the default
//!   for the `ferry` binary)
//! - **Redis** (`redis-store` feature): a single key per checkpoint id
//!
//! # Feature Flags
//!
//! - `redis-store`: Enables the Redis-backed store (requires a Redis server)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod memory;
pub mod mongodb;

#[cfg(feature = "redis-store")]
pub mod redis;
