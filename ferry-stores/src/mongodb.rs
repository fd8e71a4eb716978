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

//! `MongoDB`-backed checkpoint store.
//!
//! The checkpoint lives in a small collection, by default `resume_tokens`, as a
//! single document addressed by a fixed id:
//!
//! ```text
//! { "_id": "ferry_checkpoint", "token": { "_data": "8265..." }, "updatedAt": ISODate(...) }
//! ```
//!
//! Every save is a `replaceOne` with upsert, so the record is created on first
//! write and overwritten afterwards.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferry_stores::mongodb::{MongoStore, MongoStoreConfig};
//! use ferry_core::checkpoint::CheckpointStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MongoStoreConfig::builder()
//!     .uri("mongodb://localhost:27017")
//!     .database("sample_mflix")
//!     .build()?;
//!
//! let store = MongoStore::connect(config).await?;
//! let token = store.load().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bson::{doc, Document};
use ferry_core::checkpoint::{Checkpoint, CheckpointError, CheckpointStore, DEFAULT_CHECKPOINT_ID};
use ferry_core::event::ResumeToken;
use mongodb::error::ErrorKind;
use mongodb::{Client, Collection};
use tracing::{debug, error, info};

/// Default name of the checkpoint collection.
pub const DEFAULT_CHECKPOINT_COLLECTION: &str = "resume_tokens";

/// Configuration for [`MongoStore`].
#[derive(Debug, Clone)]
pub struct MongoStoreConfig {
    /// `MongoDB` connection string
    pub uri: String,

    /// Database holding the checkpoint collection
    pub database: String,

    /// Checkpoint collection name (default: `resume_tokens`)
    pub collection: String,

    /// Id of the checkpoint record (default: `ferry_checkpoint`)
    pub checkpoint_id: String,
}

impl MongoStoreConfig {
    /// Creates a new builder for `MongoStoreConfig`.
    #[must_use]
    pub fn builder() -> MongoStoreConfigBuilder {
        MongoStoreConfigBuilder::default()
    }
}

/// Builder for [`MongoStoreConfig`].
#[derive(Debug, Default)]
pub struct MongoStoreConfigBuilder {
    uri: Option<String>,
    database: Option<String>,
    collection: Option<String>,
    checkpoint_id: Option<String>,
}

impl MongoStoreConfigBuilder {
    /// Sets the connection string.
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Sets the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the checkpoint collection name.
    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the checkpoint record id.
    #[must_use]
    pub fn checkpoint_id(mut self, id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(id.into());
        self
    }

    /// Builds the `MongoStoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI or database is missing, or if any value is empty.
    pub fn build(self) -> Result<MongoStoreConfig, CheckpointError> {
        let uri = required(self.uri, "uri")?;
        let database = required(self.database, "database")?;
        let collection = self
            .collection
            .unwrap_or_else(|| DEFAULT_CHECKPOINT_COLLECTION.to_string());
        let checkpoint_id = self
            .checkpoint_id
            .unwrap_or_else(|| DEFAULT_CHECKPOINT_ID.to_string());

        if collection.is_empty() || checkpoint_id.is_empty() {
            return Err(CheckpointError::Configuration(
                "collection and checkpoint_id must not be empty".to_string(),
            ));
        }

        Ok(MongoStoreConfig {
            uri,
            database,
            collection,
            checkpoint_id,
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, CheckpointError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(CheckpointError::Configuration(format!("{name} is required"))),
    }
}

/// Checkpoint store backed by a `MongoDB` collection.
#[derive(Debug, Clone)]
pub struct MongoStore {
    collection: Collection<Document>,
    checkpoint_id: String,
}

impl MongoStore {
    /// Creates a store over an existing collection handle.
    ///
    /// Useful when the checkpoint lives next to the watched collection and the
    /// client can be shared.
    #[must_use]
    pub fn new(collection: Collection<Document>, checkpoint_id: impl Into<String>) -> Self {
        Self {
            collection,
            checkpoint_id: checkpoint_id.into(),
        }
    }

    /// Connects and verifies the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Configuration`] if the URI cannot be parsed
    /// and [`CheckpointError::Connection`] if the server does not answer a
    /// `ping`.
    pub async fn connect(config: MongoStoreConfig) -> Result<Self, CheckpointError> {
        debug!(
            database = %config.database,
            collection = %config.collection,
            checkpoint_id = %config.checkpoint_id,
            "Initializing MongoDB checkpoint store"
        );

        let client = Client::with_uri_str(&config.uri).await.map_err(|e| {
            error!("Failed to create MongoDB client: {}", e);
            match *e.kind {
                ErrorKind::InvalidArgument { .. } => {
                    CheckpointError::Configuration(format!("Invalid connection string: {e}"))
                }
                _ => CheckpointError::Connection(format!("Failed to create client: {e}")),
            }
        })?;

        let database = client.database(&config.database);
        database.run_command(doc! { "ping": 1 }).await.map_err(|e| {
            error!("MongoDB ping failed: {}", e);
            CheckpointError::Connection(format!("MongoDB connection test failed: {e}"))
        })?;

        info!(
            namespace = %format!("{}.{}", config.database, config.collection),
            "MongoDB checkpoint store ready"
        );

        Ok(Self::new(
            database.collection(&config.collection),
            config.checkpoint_id,
        ))
    }

    /// Id of the checkpoint record.
    #[must_use]
    pub fn checkpoint_id(&self) -> &str {
        &self.checkpoint_id
    }

    fn filter(&self) -> Document {
        doc! { "_id": self.checkpoint_id.as_str() }
    }

    /// Pulls the token out of a stored record.
    ///
    /// A record without a `token` document is treated as no checkpoint.
    fn token_from_record(record: Document) -> Option<ResumeToken> {
        bson::from_document::<Checkpoint>(record)
            .ok()
            .map(|checkpoint| checkpoint.token)
    }

    fn record(&self, token: &ResumeToken) -> Result<Document, CheckpointError> {
        bson::to_document(&Checkpoint::new(self.checkpoint_id.as_str(), token.clone()))
            .map_err(|e| CheckpointError::Serialization(format!("Failed to encode checkpoint: {e}")))
    }
}

#[async_trait]
impl CheckpointStore for MongoStore {
    async fn load(&self) -> Result<Option<ResumeToken>, CheckpointError> {
        let record = self
            .collection
            .find_one(self.filter())
            .await
            .map_err(|e| CheckpointError::Connection(format!("Failed to read checkpoint: {e}")))?;

        let token = record.and_then(Self::token_from_record);
        match &token {
            Some(token) => debug!(checkpoint_id = %self.checkpoint_id, resume_token = %token, "Found checkpoint"),
            None => debug!(checkpoint_id = %self.checkpoint_id, "No checkpoint found"),
        }

        Ok(token)
    }

    async fn save(&self, token: &ResumeToken) -> Result<(), CheckpointError> {
        self.collection
            .replace_one(self.filter(), self.record(token)?)
            .upsert(true)
            .await
            .map_err(|e| CheckpointError::Connection(format!("Failed to write checkpoint: {e}")))?;

        debug!(checkpoint_id = %self.checkpoint_id, resume_token = %token, "Checkpoint written");
        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        let result = self
            .collection
            .delete_one(self.filter())
            .await
            .map_err(|e| CheckpointError::Connection(format!("Failed to clear checkpoint: {e}")))?;

        debug!(
            checkpoint_id = %self.checkpoint_id,
            deleted = result.deleted_count,
            "Checkpoint cleared"
        );
        Ok(())
    }
}
