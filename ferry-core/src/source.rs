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

//! Change source abstraction.
//!
//! A [`ChangeSource`] opens an ordered, resumable [`ChangeStream`]. Pulling the
//! next item blocks until a notification is available or the transport fails.
//! A stream is not restartable: after an error the caller opens a new one from
//! a stored position.
//!
//! [`MongoChangeSource`](crate::stream::MongoChangeSource) is the production
//! implementation. [`MemorySource`] replays a fixed history and is meant for
//! tests and demos.

use crate::event::{ChangeEvent, ConversionError, ResumeToken};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Lazy, unbounded sequence of change notifications in commit order.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent, SourceError>>;

/// Errors raised while opening or reading a change stream.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The resume position is no longer retained upstream (history truncated).
    ///
    /// Not retryable. An operator must choose between restarting from the
    /// current tail and resynchronizing from a snapshot.
    #[error("Resume token expired: {message}")]
    ResumeTokenExpired {
        /// Human-readable error message
        message: String,
        /// Server error code, if any
        code: Option<i32>,
    },

    /// Transport-level failure or disconnect
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message
        message: String,
        /// Server error code, if any
        code: Option<i32>,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Notification could not be converted
    #[error("Event conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    /// Stream was invalidated (collection dropped or renamed)
    #[error("Stream invalidated: {reason}")]
    Invalidated {
        /// What invalidated the stream
        reason: String,
    },

    /// The stream terminated without an error
    #[error("Change stream ended unexpectedly")]
    Ended,

    /// Invalid source configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SourceError {
    /// Creates a connection error with a custom message.
    #[must_use]
    pub fn connection_msg(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Returns true if the stored resume position can no longer be used.
    #[must_use]
    pub const fn is_resume_token_expired(&self) -> bool {
        matches!(self, Self::ResumeTokenExpired { .. })
    }

    /// Returns the error category for metrics and logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::ResumeTokenExpired { .. } => "resume_token_expired",
            Self::Connection { .. } => "connection",
            Self::Conversion(_) => "conversion",
            Self::Invalidated { .. } => "invalidated",
            Self::Ended => "ended",
            Self::Configuration(_) => "configuration",
        }
    }
}

/// Trait for change-capture sources.
#[async_trait::async_trait]
pub trait ChangeSource: Send + Sync {
    /// Opens a change stream.
    ///
    /// With `resume_from`, the stream starts strictly after that position.
    /// Updates carry the full post-change document when the source supports it.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ResumeTokenExpired`] if `resume_from` is no
    /// longer retrievable, or another [`SourceError`] if the stream cannot be
    /// established.
    async fn open(&self, resume_from: Option<&ResumeToken>) -> Result<ChangeStream, SourceError>;

    /// Short description of what is being watched, for logs.
    fn describe(&self) -> String {
        "change source".to_string()
    }
}

/// How a [`MemorySource`] stream behaves after its history is exhausted.
#[derive(Debug, Clone, Default)]
enum Tail {
    #[default]
    End,
    Fail(String),
    Hold,
}

/// In-memory change source that replays a fixed history.
///
/// Each `open` yields the history in order, starting strictly after the
/// resume token. A token that is not part of the history is treated as
/// truncated and fails with [`SourceError::ResumeTokenExpired`].
///
/// # Example
///
/// ```rust
/// use ferry_core::source::{ChangeSource, MemorySource};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MemorySource::new(vec![]).hold_open();
/// let mut stream = source.open(None).await?;
/// // `stream.next()` now waits forever, like an idle collection
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    history: Vec<ChangeEvent>,
    tail: Tail,
    opens: Arc<AtomicUsize>,
}

impl MemorySource {
    /// Creates a source that replays `history`, then ends.
    #[must_use]
    pub fn new(history: Vec<ChangeEvent>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    /// After the history, fail with a connection error.
    #[must_use]
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.tail = Tail::Fail(message.into());
        self
    }

    /// After the history, wait forever.
    #[must_use]
    pub fn hold_open(mut self) -> Self {
        self.tail = Tail::Hold;
        self
    }

    /// Number of times [`ChangeSource::open`] was called.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChangeSource for MemorySource {
    async fn open(&self, resume_from: Option<&ResumeToken>) -> Result<ChangeStream, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let start = match resume_from {
            None => 0,
            Some(token) => {
                let position = self
                    .history
                    .iter()
                    .position(|event| &event.resume_token == token)
                    .ok_or_else(|| SourceError::ResumeTokenExpired {
                        message: format!("resume point {token} is no longer in the history"),
                        code: None,
                    })?;
                position + 1
            }
        };

        let replay = stream::iter(self.history[start..].to_vec().into_iter().map(Ok));
        let stream = match &self.tail {
            Tail::End => replay.boxed(),
            Tail::Fail(message) => replay
                .chain(stream::once(futures::future::ready(Err(
                    SourceError::connection_msg(message.clone()),
                ))))
                .boxed(),
            Tail::Hold => replay.chain(stream::pending()).boxed(),
        };

        Ok(stream)
    }

    fn describe(&self) -> String {
        format!("memory source ({} events)", self.history.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Namespace, OperationType};
    use bson::doc;

    fn insert(data: &str) -> ChangeEvent {
        ChangeEvent {
            operation: OperationType::Insert,
            namespace: Namespace::new("db", "coll"),
            document_key: Some(doc! { "_id": data }),
            full_document: Some(doc! { "_id": data }),
            update_description: None,
            cluster_time: None,
            resume_token: ResumeToken::from_data(data),
        }
    }

    async fn drain(mut stream: ChangeStream) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(Ok(event)) = stream.next().await {
            seen.push(event.resume_token.to_string());
        }
        seen
    }

    #[tokio::test]
    async fn test_open_without_token_replays_everything() {
        let source = MemorySource::new(vec![insert("T1"), insert("T2")]);
        let stream = source.open(None).await.unwrap();
        assert_eq!(drain(stream).await, vec!["T1", "T2"]);
        assert_eq!(source.open_count(), 1);
    }

    #[tokio::test]
    async fn test_resume_starts_strictly_after_token() {
        let source = MemorySource::new(vec![insert("T1"), insert("T2"), insert("T3")]);
        let stream = source.open(Some(&ResumeToken::from_data("T1"))).await.unwrap();
        assert_eq!(drain(stream).await, vec!["T2", "T3"]);
    }

    #[tokio::test]
    async fn test_unknown_token_is_expired() {
        let source = MemorySource::new(vec![insert("T1")]);
        let err = source
            .open(Some(&ResumeToken::from_data("T999")))
            .await
            .err()
            .unwrap();
        assert!(err.is_resume_token_expired());
        assert_eq!(err.category(), "resume_token_expired");
    }

    #[tokio::test]
    async fn test_failing_tail() {
        let source = MemorySource::new(vec![insert("T1")]).then_fail("socket closed");
        let mut stream = source.open(None).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.category(), "connection");
    }
}
