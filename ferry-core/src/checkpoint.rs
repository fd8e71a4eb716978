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

//! Durable storage for the forwarder's resume position.
//!
//! A [`CheckpointStore`] holds a single record, addressed by a fixed id chosen
//! when the store is built. The [`Forwarder`](crate::forwarder::Forwarder) reads
//! it once at startup and overwrites it after every confirmed publish.
//!
//! # Invariant
//!
//! The stored token is either absent or the position of a notification whose
//! publish resolved successfully before the write. It is never the position of
//! a publish still in flight.
//!
//! # Example
//!
//! ```rust
//! use ferry_core::checkpoint::{CheckpointError, CheckpointStore};
//! use ferry_core::event::ResumeToken;
//! use tokio::sync::Mutex;
//!
//! #[derive(Default)]
//! struct SingleSlot {
//!     token: Mutex<Option<ResumeToken>>,
//! }
//!
//! #[async_trait::async_trait]
//! impl CheckpointStore for SingleSlot {
//!     async fn load(&self) -> Result<Option<ResumeToken>, CheckpointError> {
//!         Ok(self.token.lock().await.clone())
//!     }
//!
//!     async fn save(&self, token: &ResumeToken) -> Result<(), CheckpointError> {
//!         *self.token.lock().await = Some(token.clone());
//!         Ok(())
//!     }
//!
//!     async fn clear(&self) -> Result<(), CheckpointError> {
//!         *self.token.lock().await = None;
//!         Ok(())
//!     }
//! }
//! ```

use crate::event::ResumeToken;
use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Default id of the checkpoint record.
pub const DEFAULT_CHECKPOINT_ID: &str = "ferry_checkpoint";

/// Shape of the persisted checkpoint record.
///
/// Document stores write this as
/// `{ "_id": <id>, "token": <resume token>, "updatedAt": <write time> }`.
/// Records written without `updatedAt` still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Fixed, well-known record id
    #[serde(rename = "_id")]
    pub id: String,

    /// Last confirmed stream position
    pub token: ResumeToken,

    /// When the record was written
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl Checkpoint {
    /// Creates a checkpoint record stamped with the current time.
    pub fn new(id: impl Into<String>, token: ResumeToken) -> Self {
        Self {
            id: id.into(),
            token,
            updated_at: Some(DateTime::now()),
        }
    }
}

/// Trait for checkpoint storage backends.
///
/// Implementations must persist the token durably enough to survive a
/// process restart.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns the stored position, or `None` if nothing was ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached. An empty but
    /// reachable backend is `Ok(None)`, never an error.
    async fn load(&self) -> Result<Option<ResumeToken>, CheckpointError>;

    /// Upserts the checkpoint record.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be written.
    async fn save(&self, token: &ResumeToken) -> Result<(), CheckpointError>;

    /// Removes the checkpoint record so the next run starts from the stream tail.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be removed.
    async fn clear(&self) -> Result<(), CheckpointError>;

    /// Releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be closed cleanly.
    async fn close(&self) -> Result<(), CheckpointError> {
        Ok(())
    }
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Token could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend unreachable or connection dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Store settings are invalid
    #[error("Configuration error: {0}")]
    Configuration(String),
}
