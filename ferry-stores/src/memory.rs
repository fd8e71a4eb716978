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

//! In-memory checkpoint store.
//!
//! # Use Cases
//!
//! - **Local development and testing** - No external dependencies required
//! - **Demos** - Run the forwarder without a second database
//!
//! # Limitations
//!
//! ⚠️ **Important**: nothing survives a restart. A forwarder backed by this
//! store starts from the stream tail every time it boots. Use
//! [`MongoStore`](crate::mongodb::MongoStore) in production.
//!
//! # Example
//!
//! ```rust
//! use ferry_stores::memory::MemoryStore;
//! use ferry_core::checkpoint::CheckpointStore;
//! use ferry_core::event::ResumeToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//!
//! store.save(&ResumeToken::from_data("T100")).await?;
//! assert_eq!(store.load().await?, Some(ResumeToken::from_data("T100")));
//!
//! store.clear().await?;
//! assert_eq!(store.load().await?, None);
//! # Ok(())
//! # }
//! ```
//!
//! # Sharing
//!
//! Clones share the same map. [`MemoryStore::for_id`] returns a handle onto the
//! same map under another record id, the way several forwarders would share one
//! checkpoint collection.

use ferry_core::checkpoint::{CheckpointError, CheckpointStore, DEFAULT_CHECKPOINT_ID};
use ferry_core::event::ResumeToken;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// In-memory checkpoint store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    id: String,
    tokens: Arc<RwLock<HashMap<String, ResumeToken>>>,
}

impl MemoryStore {
    /// Creates an empty store using [`DEFAULT_CHECKPOINT_ID`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(DEFAULT_CHECKPOINT_ID)
    }

    /// Creates an empty store whose record is addressed by `id`.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        let id = id.into();
        debug!(checkpoint_id = %id, "Creating in-memory checkpoint store");
        Self {
            id,
            tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a store that already holds `token`.
    #[must_use]
    pub fn with_token(token: ResumeToken) -> Self {
        let store = Self::new();
        let mut tokens = HashMap::new();
        tokens.insert(store.id.clone(), token);
        Self {
            tokens: Arc::new(RwLock::new(tokens)),
            ..store
        }
    }

    /// Returns a handle onto the same map, addressing the record `id`.
    #[must_use]
    pub fn for_id(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tokens: Arc::clone(&self.tokens),
        }
    }

    /// Record id this handle reads and writes.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of records across every id sharing this map.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Returns `true` if no id has a record.
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self) -> Result<Option<ResumeToken>, CheckpointError> {
        let token = self.tokens.read().await.get(&self.id).cloned();

        match &token {
            Some(token) => debug!(checkpoint_id = %self.id, resume_token = %token, "Found checkpoint in memory"),
            None => debug!(checkpoint_id = %self.id, "No checkpoint in memory"),
        }

        Ok(token)
    }

    async fn save(&self, token: &ResumeToken) -> Result<(), CheckpointError> {
        trace!(checkpoint_id = %self.id, resume_token = %token, "Saving checkpoint to memory");
        self.tokens
            .write()
            .await
            .insert(self.id.clone(), token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        let removed = self.tokens.write().await.remove(&self.id);
        debug!(
            checkpoint_id = %self.id,
            existed = removed.is_some(),
            "Cleared checkpoint from memory"
        );
        Ok(())
    }
}
