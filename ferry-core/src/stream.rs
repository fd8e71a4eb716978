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

//! `MongoDB` change stream source.
//!
//! [`MongoChangeSource`] opens a change stream on one collection, requesting
//! full-document lookup for updates, and resumes strictly after a stored
//! token when one is given.
//!
//! ```text
//! ┌─────────────────┐  resume token   ┌───────────────────┐
//! │ CheckpointStore │ ──────────────► │ MongoChangeSource │
//! └─────────────────┘                 └─────────┬─────────┘
//!                                               │ ChangeEvent
//!                                               ▼
//!                                        ┌────────────┐
//!                                        │ Forwarder  │
//!                                        └────────────┘
//! ```
//!
//! There is no reconnection here. A transport error ends the stream; the
//! process is restarted and resumes from the last checkpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferry_core::source::ChangeSource;
//! use ferry_core::stream::{ChangeStreamConfig, MongoChangeSource};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = MongoChangeSource::connect(
//!     "mongodb://localhost:27017",
//!     "sample_mflix",
//!     "movies",
//!     ChangeStreamConfig::default(),
//! )
//! .await?;
//!
//! let mut stream = source.open(None).await?;
//! while let Some(event) = stream.next().await {
//!     let event = event?;
//!     println!("{} {}", event.operation, event.resume_token);
//! }
//! # Ok(())
//! # }
//! ```

use crate::event::{ChangeEvent, ResumeToken};
use crate::source::{ChangeSource, ChangeStream, SourceError};
use bson::Document;
use futures::StreamExt;
use mongodb::{
    change_stream::event::ResumeToken as MongoResumeToken,
    error::{Error as MongoError, ErrorKind as MongoErrorKind},
    options::{ChangeStreamOptions, FullDocumentType},
    Client, Collection,
};
use std::time::Duration;
use tracing::{debug, error, info};

/// Server code for `ChangeStreamFatalError`.
const CHANGE_STREAM_FATAL_ERROR: i32 = 280;

/// Server code for `ChangeStreamHistoryLost`.
const CHANGE_STREAM_HISTORY_LOST: i32 = 286;

impl From<MongoError> for SourceError {
    fn from(err: MongoError) -> Self {
        Self::from_mongo_error(err)
    }
}

impl SourceError {
    /// Classifies a `MongoDB` driver error.
    ///
    /// Codes 280 and 286 mean the resume point is gone from the oplog.
    #[must_use]
    pub fn from_mongo_error(err: MongoError) -> Self {
        if matches!(err.kind.as_ref(), MongoErrorKind::InvalidArgument { .. }) {
            return Self::Configuration(err.to_string());
        }

        let code = match err.kind.as_ref() {
            MongoErrorKind::Command(cmd_err) => Some(cmd_err.code),
            _ => None,
        };

        if matches!(
            code,
            Some(CHANGE_STREAM_FATAL_ERROR | CHANGE_STREAM_HISTORY_LOST)
        ) {
            return Self::ResumeTokenExpired {
                message: err.to_string(),
                code,
            };
        }

        Self::Connection {
            message: err.to_string(),
            code,
            source: Some(Box::new(err)),
        }
    }
}

/// Configuration for the `MongoDB` change stream.
///
/// ```rust
/// use ferry_core::stream::ChangeStreamConfig;
/// use std::time::Duration;
///
/// let config = ChangeStreamConfig::builder()
///     .batch_size(500)
///     .max_await_time(Duration::from_secs(1))
///     .build()
///     .unwrap();
///
/// assert!(config.full_document_on_update);
/// ```
#[derive(Debug, Clone)]
pub struct ChangeStreamConfig {
    /// Aggregation pipeline appended to the change stream
    pub pipeline: Vec<Document>,

    /// Whether updates carry the full post-change document
    pub full_document_on_update: bool,

    /// Server-side batch size
    pub batch_size: Option<u32>,

    /// How long the server waits for new changes before returning an empty batch
    pub max_await_time: Option<Duration>,
}

impl Default for ChangeStreamConfig {
    fn default() -> Self {
        Self {
            pipeline: Vec::new(),
            full_document_on_update: true,
            batch_size: None,
            max_await_time: None,
        }
    }
}

impl ChangeStreamConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> ChangeStreamConfigBuilder {
        ChangeStreamConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Configuration` if `batch_size` is 0.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.batch_size == Some(0) {
            return Err(SourceError::Configuration(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts this config to the driver's `ChangeStreamOptions`.
    fn to_mongo_options(
        &self,
        resume_from: Option<&ResumeToken>,
    ) -> Result<ChangeStreamOptions, SourceError> {
        let mut options = ChangeStreamOptions::default();

        if self.full_document_on_update {
            options.full_document = Some(FullDocumentType::UpdateLookup);
        }
        options.batch_size = self.batch_size;
        options.max_await_time = self.max_await_time;

        if let Some(token) = resume_from {
            let resume_after: MongoResumeToken = bson::from_document(token.as_document().clone())
                .map_err(|e| SourceError::ResumeTokenExpired {
                    message: format!("stored resume token {token} is not usable: {e}"),
                    code: None,
                })?;
            options.resume_after = Some(resume_after);
        }

        Ok(options)
    }
}

/// Builder for [`ChangeStreamConfig`].
#[derive(Debug, Default)]
pub struct ChangeStreamConfigBuilder {
    pipeline: Vec<Document>,
    disable_update_lookup: bool,
    batch_size: Option<u32>,
    max_await_time: Option<Duration>,
}

impl ChangeStreamConfigBuilder {
    /// Sets the aggregation pipeline for filtering events.
    #[must_use]
    pub fn pipeline(mut self, pipeline: Vec<Document>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Disables full-document lookup; updates then arrive without a document
    /// and are skipped by the classifier.
    #[must_use]
    pub fn without_update_lookup(mut self) -> Self {
        self.disable_update_lookup = true;
        self
    }

    /// Sets the server-side batch size.
    #[must_use]
    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Sets the maximum server await time per `getMore`.
    #[must_use]
    pub fn max_await_time(mut self, duration: Duration) -> Self {
        self.max_await_time = Some(duration);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Configuration` if validation fails.
    pub fn build(self) -> Result<ChangeStreamConfig, SourceError> {
        let config = ChangeStreamConfig {
            pipeline: self.pipeline,
            full_document_on_update: !self.disable_update_lookup,
            batch_size: self.batch_size,
            max_await_time: self.max_await_time,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Change source backed by a `MongoDB` collection.
#[derive(Debug, Clone)]
pub struct MongoChangeSource {
    collection: Collection<Document>,
    config: ChangeStreamConfig,
}

impl MongoChangeSource {
    /// Creates a source over an existing collection handle.
    #[must_use]
    pub fn new(collection: Collection<Document>, config: ChangeStreamConfig) -> Self {
        Self { collection, config }
    }

    /// Connects to `uri` and watches `database.collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is invalid or the configuration does not
    /// validate. The driver connects lazily; reachability is checked by `open`.
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        config: ChangeStreamConfig,
    ) -> Result<Self, SourceError> {
        config.validate()?;
        let client = Client::with_uri_str(uri).await?;
        let collection = client.database(database).collection(collection);
        Ok(Self::new(collection, config))
    }

    fn namespace(&self) -> String {
        format!(
            "{}.{}",
            self.collection.namespace().db,
            self.collection.namespace().coll
        )
    }
}

#[async_trait::async_trait]
impl ChangeSource for MongoChangeSource {
    async fn open(&self, resume_from: Option<&ResumeToken>) -> Result<ChangeStream, SourceError> {
        let namespace = self.namespace();
        info!(
            namespace = %namespace,
            resume_from = ?resume_from.map(ToString::to_string),
            update_lookup = self.config.full_document_on_update,
            "Opening change stream"
        );

        let options = self.config.to_mongo_options(resume_from)?;
        let stream = if self.config.pipeline.is_empty() {
            self.collection.watch().with_options(options).await?
        } else {
            self.collection
                .watch()
                .pipeline(self.config.pipeline.clone())
                .with_options(options)
                .await?
        };

        let stream = stream.map(move |item| {
            let event = ChangeEvent::try_from(item?)?;
            if event.is_invalidate() {
                let reason = format!("collection {namespace} was dropped or renamed");
                error!("{}", reason);
                return Err(SourceError::Invalidated { reason });
            }
            debug!(
                operation = %event.operation,
                resume_token = %event.resume_token,
                "Received change event"
            );
            Ok(event)
        });

        Ok(stream.boxed())
    }

    fn describe(&self) -> String {
        self.namespace()
    }
}
