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

//! Publisher gateway trait and error types.
//!
//! A [`Publisher`] hands one [`OutboundMessage`] to a pub/sub transport and
//! resolves once the transport has accepted or rejected it. Batching, internal
//! retries and flow control belong to the transport; the forwarder only needs
//! to know, per message, whether it may advance the checkpoint.
//!
//! # Implementing a Publisher
//!
//! ```rust
//! use ferry_core::classify::OutboundMessage;
//! use ferry_core::publisher::{DeliveryId, PublishError, Publisher};
//! use async_trait::async_trait;
//!
//! struct StdoutPublisher;
//!
//! #[async_trait]
//! impl Publisher for StdoutPublisher {
//!     async fn publish(&self, message: &OutboundMessage) -> Result<DeliveryId, PublishError> {
//!         println!("{}", String::from_utf8_lossy(message.payload()));
//!         Ok(DeliveryId::new(message.resume_token().to_string()))
//!     }
//!
//!     fn name(&self) -> &str {
//!         "stdout"
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! [`PublishError::is_retryable`] drives the forwarder's backoff loop:
//! connection failures and timeouts are retried, serialization and
//! configuration problems are not.

use crate::classify::OutboundMessage;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Transport-assigned identifier of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryId(String);

impl DeliveryId {
    /// Wraps a transport delivery identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur when publishing a message.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Connection to the transport failed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message
        message: String,
        /// The underlying connection error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The transport did not confirm delivery in time.
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    /// The transport rejected the message.
    #[error("Publish rejected: {message}")]
    Rejected {
        /// Human-readable error message
        message: String,
        /// Whether a retry may succeed
        retryable: bool,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The message could not be encoded for the transport.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid publisher configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable error message
        message: String,
        /// Configuration parameter name if applicable
        parameter: Option<String>,
    },
}

impl PublishError {
    /// Creates a connection error with a custom message.
    #[must_use]
    pub fn connection_msg(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a rejection from any error type.
    #[must_use]
    pub fn rejected(source: impl std::error::Error + Send + Sync + 'static, retryable: bool) -> Self {
        Self::Rejected {
            message: source.to_string(),
            retryable,
            source: Some(Box::new(source)),
        }
    }

    /// Creates a rejection with a custom message.
    #[must_use]
    pub fn rejected_msg(message: impl Into<String>, retryable: bool) -> Self {
        Self::Rejected {
            message: message.into(),
            retryable,
            source: None,
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>, parameter: Option<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            parameter,
        }
    }

    /// Returns whether retrying the same message may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout(_) => true,
            Self::Serialization(_) | Self::Configuration { .. } => false,
            Self::Rejected { retryable, .. } => *retryable,
        }
    }

    /// Returns the error category for metrics and logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Timeout(_) => "timeout",
            Self::Rejected { .. } => "rejected",
            Self::Serialization(_) => "serialization",
            Self::Configuration { .. } => "configuration",
        }
    }
}

/// Trait for pub/sub transports.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Submits one message and waits until the transport resolves it.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] if the transport rejects the message or does
    /// not confirm it.
    async fn publish(&self, message: &OutboundMessage) -> Result<DeliveryId, PublishError>;

    /// Waits for any transport-side buffering to drain.
    ///
    /// # Errors
    ///
    /// Returns an error if pending messages could not be delivered in time.
    async fn flush(&self, _timeout: Duration) -> Result<(), PublishError> {
        Ok(())
    }

    /// Short name of the transport, used as a metrics label.
    fn name(&self) -> &str;
}

#[derive(Debug, Default)]
struct MemoryPublisherState {
    delivered: Vec<OutboundMessage>,
    attempts: usize,
    flushes: usize,
}

/// In-memory publisher for testing.
///
/// Clones share state, so a test can keep one handle while the forwarder owns
/// another.
///
/// # Example
///
/// ```rust
/// use ferry_core::publisher::MemoryPublisher;
///
/// // First two attempts fail with a retryable error, then deliveries succeed
/// let publisher = MemoryPublisher::new().fail_next(2, true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    state: Arc<Mutex<MemoryPublisherState>>,
    scripted_failures: Vec<bool>,
    always_fail: Option<bool>,
    stalled: bool,
}

impl MemoryPublisher {
    /// Creates a publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` attempts, after any failures already scripted.
    ///
    /// Attempts are counted across clones.
    #[must_use]
    pub fn fail_next(mut self, count: usize, retryable: bool) -> Self {
        self.scripted_failures
            .extend(std::iter::repeat(retryable).take(count));
        self
    }

    /// Fails every attempt past the scripted ones.
    #[must_use]
    pub fn fail_always(mut self, retryable: bool) -> Self {
        self.always_fail = Some(retryable);
        self
    }

    /// Never resolves a publish, as if the transport hung.
    #[must_use]
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Messages accepted so far, in order.
    pub async fn delivered(&self) -> Vec<OutboundMessage> {
        self.state.lock().await.delivered.clone()
    }

    /// Payloads accepted so far, as UTF-8 strings.
    pub async fn payloads(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .delivered
            .iter()
            .map(|m| String::from_utf8_lossy(m.payload()).into_owned())
            .collect()
    }

    /// Total publish attempts, including failed ones.
    pub async fn attempts(&self) -> usize {
        self.state.lock().await.attempts
    }

    /// Number of flush calls.
    pub async fn flush_count(&self) -> usize {
        self.state.lock().await.flushes
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, message: &OutboundMessage) -> Result<DeliveryId, PublishError> {
        let attempt = {
            let mut state = self.state.lock().await;
            state.attempts += 1;
            state.attempts - 1
        };

        if self.stalled {
            futures::future::pending::<()>().await;
        }

        let failure = self
            .scripted_failures
            .get(attempt)
            .copied()
            .or(self.always_fail);
        if let Some(retryable) = failure {
            return Err(PublishError::rejected_msg("simulated publish failure", retryable));
        }

        let mut state = self.state.lock().await;
        state.delivered.push(message.clone());
        Ok(DeliveryId::new(format!("mem-{}", state.delivered.len())))
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), PublishError> {
        self.state.lock().await.flushes += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
