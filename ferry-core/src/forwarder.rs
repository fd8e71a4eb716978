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

//! The forwarding loop.
//!
//! [`Forwarder`] consumes one change stream strictly in order. For every
//! notification it classifies, publishes, waits for the publish to resolve
//! and only then writes the checkpoint.
//!
//! ```text
//!  Starting ──► Streaming ──► Publishing ──► Streaming ──► ...
//!     │             │   └──► Skipping ──────┘
//!     ▼             ▼
//!  Stopped ◄─── (fatal error or shutdown)
//! ```
//!
//! # Features
//!
//! - **Checkpoint ordering**: the stored position never passes a notification
//!   whose publish has not been confirmed
//! - **Retry Logic**: exponential backoff for retryable publish failures
//! - **Graceful Shutdown**: honored between notifications and during a publish;
//!   an abandoned publish is never checkpointed
//! - **Fatal stream errors**: a broken stream stops the run; restarting the
//!   process resumes from the last checkpoint
//!
//! # Example
//!
//! ```rust
//! use ferry_core::forwarder::{Forwarder, ForwarderConfig};
//! use ferry_core::publisher::MemoryPublisher;
//! use ferry_core::source::MemorySource;
//! # use ferry_core::checkpoint::{CheckpointError, CheckpointStore};
//! # use ferry_core::event::ResumeToken;
//! # #[derive(Default)]
//! # struct NullStore;
//! # #[async_trait::async_trait]
//! # impl CheckpointStore for NullStore {
//! #     async fn load(&self) -> Result<Option<ResumeToken>, CheckpointError> { Ok(None) }
//! #     async fn save(&self, _: &ResumeToken) -> Result<(), CheckpointError> { Ok(()) }
//! #     async fn clear(&self) -> Result<(), CheckpointError> { Ok(()) }
//! # }
//!
//! # async fn example() {
//! let source = MemorySource::new(vec![]).hold_open();
//! let mut forwarder = Forwarder::new(
//!     ForwarderConfig::default(),
//!     source,
//!     NullStore,
//!     MemoryPublisher::new(),
//! );
//!
//! let shutdown = forwarder.shutdown_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     shutdown.shutdown();
//! });
//!
//! forwarder.run().await.unwrap();
//! # }
//! ```

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::classify::{classify, tombstone_json, ClassifyPolicy, OutboundMessage, SkipReason};
use crate::event::{ChangeEvent, ResumeToken};
use crate::metrics::{self, ForwarderStatus};
use crate::publisher::{DeliveryId, PublishError, Publisher};
use crate::source::{ChangeSource, SourceError};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Configuration for the forwarding loop.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Classification policy
    pub classify: ClassifyPolicy,

    /// Whether skipped notifications advance the checkpoint
    pub checkpoint_skipped: bool,

    /// Maximum number of retries for a retryable publish failure
    pub max_publish_retries: usize,

    /// Initial retry delay (doubles with each retry)
    pub retry_delay: Duration,

    /// Maximum retry delay
    pub max_retry_delay: Duration,

    /// How long a graceful stop waits for the publisher to drain
    pub flush_timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            classify: ClassifyPolicy::default(),
            checkpoint_skipped: true,
            max_publish_retries: 3,
            retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(30),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

impl ForwarderConfig {
    /// Creates a new builder for `ForwarderConfig`.
    #[must_use]
    pub fn builder() -> ForwarderConfigBuilder {
        ForwarderConfigBuilder::default()
    }

    /// Deletes are dropped, skipped notifications do not move the
    /// checkpoint, and a failed publish is not retried.
    #[must_use]
    pub fn reference() -> Self {
        Self {
            classify: ClassifyPolicy::reference(),
            checkpoint_skipped: false,
            max_publish_retries: 0,
            ..Self::default()
        }
    }
}

/// Builder for `ForwarderConfig`.
#[derive(Debug, Default)]
pub struct ForwarderConfigBuilder {
    classify: Option<ClassifyPolicy>,
    checkpoint_skipped: Option<bool>,
    max_publish_retries: Option<usize>,
    retry_delay: Option<Duration>,
    max_retry_delay: Option<Duration>,
    flush_timeout: Option<Duration>,
}

impl ForwarderConfigBuilder {
    /// Sets the classification policy.
    #[must_use]
    pub fn classify(mut self, policy: ClassifyPolicy) -> Self {
        self.classify = Some(policy);
        self
    }

    /// Sets whether skipped notifications advance the checkpoint.
    #[must_use]
    pub fn checkpoint_skipped(mut self, enabled: bool) -> Self {
        self.checkpoint_skipped = Some(enabled);
        self
    }

    /// Sets the maximum number of publish retries.
    #[must_use]
    pub fn max_publish_retries(mut self, retries: usize) -> Self {
        self.max_publish_retries = Some(retries);
        self
    }

    /// Sets the initial retry delay.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Sets the maximum retry delay.
    #[must_use]
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = Some(delay);
        self
    }

    /// Sets the publisher flush timeout used on graceful stop.
    #[must_use]
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = Some(timeout);
        self
    }

    /// Builds the `ForwarderConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial retry delay exceeds the maximum.
    pub fn build(self) -> Result<ForwarderConfig, String> {
        let defaults = ForwarderConfig::default();
        let config = ForwarderConfig {
            classify: self.classify.unwrap_or(defaults.classify),
            checkpoint_skipped: self.checkpoint_skipped.unwrap_or(defaults.checkpoint_skipped),
            max_publish_retries: self
                .max_publish_retries
                .unwrap_or(defaults.max_publish_retries),
            retry_delay: self.retry_delay.unwrap_or(defaults.retry_delay),
            max_retry_delay: self.max_retry_delay.unwrap_or(defaults.max_retry_delay),
            flush_timeout: self.flush_timeout.unwrap_or(defaults.flush_timeout),
        };

        if config.retry_delay > config.max_retry_delay {
            return Err(format!(
                "retry_delay ({:?}) must not exceed max_retry_delay ({:?})",
                config.retry_delay, config.max_retry_delay
            ));
        }

        Ok(config)
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderState {
    /// Loading the checkpoint and opening the stream
    Starting,
    /// Waiting for the next notification
    Streaming,
    /// Handling a notification that produced no message
    Skipping,
    /// Waiting for a publish to resolve
    Publishing,
    /// Terminal: shut down or failed
    Stopped,
}

impl fmt::Display for ForwarderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Skipping => "skipping",
            Self::Publishing => "publishing",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Forwarder statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Notifications pulled from the stream
    pub received: u64,

    /// Messages confirmed by the publisher
    pub published: u64,

    /// Notifications that produced no message
    pub skipped: u64,

    /// Messages dropped after publishing failed
    pub publish_failures: u64,

    /// Publish retry attempts
    pub publish_retries: u64,

    /// Checkpoint writes that failed
    pub checkpoint_failures: u64,
}

/// Requests a graceful stop of a running [`Forwarder`].
///
/// Cloning is cheap; every clone stops the same forwarder.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Asks the forwarder to stop.
    ///
    /// A publish in flight is abandoned and its notification is not
    /// checkpointed, so it is delivered again after restart.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once a stop has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Fatal forwarder errors.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    /// The checkpoint could not be read at startup
    #[error("Checkpoint store unreachable: {0}")]
    StoreUnreachable(#[source] CheckpointError),

    /// The stored position is no longer retained upstream
    #[error("Resume token {token} expired; restart from the stream tail or resynchronize")]
    ResumeTokenExpired {
        /// Position that could not be resumed
        token: ResumeToken,
        /// The underlying source error
        #[source]
        source: SourceError,
    },

    /// The change stream could not be opened
    #[error("Failed to open change stream: {0}")]
    Open(#[source] SourceError),

    /// The change stream failed while streaming
    #[error("Change stream error: {0}")]
    Stream(#[source] SourceError),
}

impl ForwarderError {
    /// Returns true if an operator must act before the forwarder can run again.
    #[must_use]
    pub const fn requires_operator(&self) -> bool {
        matches!(self, Self::ResumeTokenExpired { .. })
    }
}

/// What the loop does after handling one notification.
enum Flow {
    Continue,
    Stop,
}

/// Forwards change notifications from a source to a publisher.
pub struct Forwarder<C, S, P> {
    config: ForwarderConfig,
    source: C,
    store: S,
    publisher: P,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    state: ForwarderState,
    stats: ForwarderStats,
    last_position: Option<ResumeToken>,
    last_checkpoint: Option<ResumeToken>,
}

impl<C: ChangeSource, S: CheckpointStore, P: Publisher> Forwarder<C, S, P> {
    /// Creates a forwarder. Nothing is contacted until [`run`](Self::run).
    pub fn new(config: ForwarderConfig, source: C, store: S, publisher: P) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            source,
            store,
            publisher,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            state: ForwarderState::Starting,
            stats: ForwarderStats::default(),
            last_position: None,
            last_checkpoint: None,
        }
    }

    /// Returns a handle that stops this forwarder.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Runs until shutdown or a fatal error.
    ///
    /// Returns `Ok(())` only after a requested shutdown.
    ///
    /// # Errors
    ///
    /// - [`ForwarderError::StoreUnreachable`] if the checkpoint cannot be read
    /// - [`ForwarderError::ResumeTokenExpired`] if the stored position is gone upstream
    /// - [`ForwarderError::Open`] if the stream cannot be opened
    /// - [`ForwarderError::Stream`] if the stream fails or ends
    #[instrument(skip(self), fields(source = %self.source.describe(), publisher = self.publisher.name()))]
    pub async fn run(&mut self) -> Result<(), ForwarderError> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        self.set_state(ForwarderState::Starting);

        let resume_from = match self.store.load().await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Failed to load checkpoint");
                return Err(self.fail(ForwarderError::StoreUnreachable(e)));
            }
        };

        match &resume_from {
            Some(token) => info!(resume_token = %token, "Resuming from saved checkpoint"),
            None => info!("No checkpoint found, starting from the stream tail"),
        }

        let mut stream = match self.source.open(resume_from.as_ref()).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Failed to open change stream");
                let err = match (e.is_resume_token_expired(), resume_from) {
                    (true, Some(token)) => ForwarderError::ResumeTokenExpired { token, source: e },
                    _ => ForwarderError::Open(e),
                };
                return Err(self.fail(err));
            }
        };

        self.last_position.clone_from(&resume_from);
        self.last_checkpoint = resume_from;
        self.set_state(ForwarderState::Streaming);
        info!("Forwarder streaming");

        loop {
            let next = tokio::select! {
                biased;
                () = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("Received shutdown signal");
                    break;
                }
                next = stream.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    error!(error = %e, category = e.category(), "Change stream failed");
                    let err = match (e.is_resume_token_expired(), self.last_position.clone()) {
                        (true, Some(token)) => {
                            ForwarderError::ResumeTokenExpired { token, source: e }
                        }
                        _ => ForwarderError::Stream(e),
                    };
                    return Err(self.fail(err));
                }
                None => {
                    error!("Change stream ended unexpectedly");
                    return Err(self.fail(ForwarderError::Stream(SourceError::Ended)));
                }
            };

            if let Flow::Stop = self.handle_event(event, &mut shutdown_rx).await {
                break;
            }
        }

        self.stop().await;
        Ok(())
    }

    /// Classifies one notification and publishes or skips it.
    async fn handle_event(
        &mut self,
        event: ChangeEvent,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Flow {
        self.stats.received += 1;
        metrics::increment_events_received(event.operation.as_str());

        let message = match classify(&event, &self.config.classify) {
            Ok(message) => message,
            Err(reason) => {
                self.skip(&event, &reason).await;
                return Flow::Continue;
            }
        };

        self.set_state(ForwarderState::Publishing);
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            () = wait_for_shutdown(shutdown_rx) => None,
            result = Self::publish_with_retry(
                &self.publisher,
                &self.config,
                &mut self.stats,
                &message,
            ) => Some(result),
        };

        let Some(result) = outcome else {
            warn!(
                resume_token = %event.resume_token,
                "Shutdown requested while publishing, checkpoint not advanced"
            );
            return Flow::Stop;
        };

        metrics::record_publish_duration(started.elapsed(), self.publisher.name());

        match result {
            Ok(delivery_id) => {
                self.stats.published += 1;
                metrics::increment_events_published(self.publisher.name(), event.operation.as_str());
                metrics::record_payload_bytes(message.len(), self.publisher.name());
                debug!(
                    operation = %event.operation,
                    key = message.key().unwrap_or_default(),
                    delivery_id = %delivery_id,
                    bytes = message.len(),
                    "Message published"
                );
                self.checkpoint(&event.resume_token).await;
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                metrics::increment_publish_failures(self.publisher.name(), e.category());
                error!(
                    operation = %event.operation,
                    key = message.key().unwrap_or_default(),
                    resume_token = %event.resume_token,
                    error = %e,
                    "Publish failed, message dropped and checkpoint not advanced"
                );
            }
        }

        self.set_state(ForwarderState::Streaming);
        Flow::Continue
    }

    async fn skip(&mut self, event: &ChangeEvent, reason: &SkipReason) {
        self.set_state(ForwarderState::Skipping);
        self.stats.skipped += 1;
        metrics::increment_events_skipped(reason.as_str());

        if matches!(reason, SkipReason::DeleteSuppressed) {
            info!(
                tombstone = %tombstone_json(event).unwrap_or_default(),
                resume_token = %event.resume_token,
                "Delete not published"
            );
        } else {
            info!(
                operation = %event.operation,
                resume_token = %event.resume_token,
                %reason,
                "Skipping change notification"
            );
        }

        if self.config.checkpoint_skipped {
            self.checkpoint(&event.resume_token).await;
        }

        self.set_state(ForwarderState::Streaming);
    }

    /// Publishes with exponential backoff retry.
    #[instrument(skip_all, fields(operation = %message.operation(), bytes = message.len()))]
    async fn publish_with_retry(
        publisher: &P,
        config: &ForwarderConfig,
        stats: &mut ForwarderStats,
        message: &OutboundMessage,
    ) -> Result<DeliveryId, PublishError> {
        let mut retry_delay = config.retry_delay;
        let mut attempt = 0;

        loop {
            match publisher.publish(message).await {
                Ok(delivery_id) => {
                    if attempt > 0 {
                        info!(attempts = attempt + 1, "Publish succeeded after retries");
                    }
                    return Ok(delivery_id);
                }
                Err(e) => {
                    attempt += 1;

                    if !e.is_retryable() {
                        return Err(e);
                    }

                    if attempt > config.max_publish_retries {
                        if config.max_publish_retries > 0 {
                            error!(attempts = attempt, error = %e, "Publish failed after max retries");
                        }
                        return Err(e);
                    }

                    stats.publish_retries += 1;
                    metrics::increment_publish_retries(e.category());
                    warn!(
                        attempt,
                        max_retries = config.max_publish_retries,
                        retry_delay_ms = retry_delay.as_millis(),
                        error = %e,
                        "Publish failed, retrying"
                    );

                    tokio::time::sleep(retry_delay).await;
                    retry_delay = std::cmp::min(retry_delay * 2, config.max_retry_delay);
                }
            }
        }
    }

    /// Records `token` as the latest position and tries to persist it.
    ///
    /// A failed write is logged and counted; the loop keeps going and the next
    /// successful write supersedes it.
    async fn checkpoint(&mut self, token: &ResumeToken) {
        self.last_position = Some(token.clone());

        match self.store.save(token).await {
            Ok(()) => {
                metrics::increment_checkpoints_saved();
                self.last_checkpoint = Some(token.clone());
                debug!(resume_token = %token, "Checkpoint saved");
            }
            Err(e) => {
                self.stats.checkpoint_failures += 1;
                metrics::increment_checkpoint_failures();
                warn!(resume_token = %token, error = %e, "Failed to save checkpoint");
            }
        }
    }

    /// Graceful stop: drain the publisher and release the store.
    async fn stop(&mut self) {
        if let Err(e) = self.publisher.flush(self.config.flush_timeout).await {
            warn!(error = %e, "Publisher did not drain before shutdown");
        }
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "Failed to close checkpoint store");
        }

        self.set_state(ForwarderState::Stopped);
        metrics::set_forwarder_status(ForwarderStatus::Stopped);

        info!(
            received = self.stats.received,
            published = self.stats.published,
            skipped = self.stats.skipped,
            publish_failures = self.stats.publish_failures,
            publish_retries = self.stats.publish_retries,
            checkpoint_failures = self.stats.checkpoint_failures,
            last_checkpoint = ?self.last_checkpoint.as_ref().map(ToString::to_string),
            "Forwarder stopped"
        );
    }

    fn fail(&mut self, err: ForwarderError) -> ForwarderError {
        self.set_state(ForwarderState::Stopped);
        metrics::set_forwarder_status(ForwarderStatus::Error);
        err
    }

    fn set_state(&mut self, state: ForwarderState) {
        if state == ForwarderState::Streaming && self.state == ForwarderState::Starting {
            metrics::set_forwarder_status(ForwarderStatus::Streaming);
        }
        self.state = state;
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ForwarderState {
        self.state
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> &ForwarderStats {
        &self.stats
    }

    /// Latest known position: the loaded checkpoint, then every position the
    /// loop tried to checkpoint, whether or not the write succeeded.
    #[must_use]
    pub fn last_position(&self) -> Option<&ResumeToken> {
        self.last_position.as_ref()
    }

    /// Latest position that was durably written.
    #[must_use]
    pub fn last_checkpoint(&self) -> Option<&ResumeToken> {
        self.last_checkpoint.as_ref()
    }

    /// Returns the checkpoint store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the publisher.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

/// Resolves once shutdown has been requested.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: nobody can request a stop any more.
            futures::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_tombstones_and_checkpoints_skips() {
        let config = ForwarderConfig::default();
        assert_eq!(config.classify, ClassifyPolicy::default());
        assert!(config.checkpoint_skipped);
        assert_eq!(config.max_publish_retries, 3);
    }

    #[test]
    fn test_reference_config() {
        let config = ForwarderConfig::reference();
        assert_eq!(config.classify, ClassifyPolicy::reference());
        assert!(!config.checkpoint_skipped);
        assert_eq!(config.max_publish_retries, 0);
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let config = ForwarderConfig::builder()
            .classify(ClassifyPolicy::reference())
            .checkpoint_skipped(false)
            .max_publish_retries(0)
            .retry_delay(Duration::from_millis(10))
            .max_retry_delay(Duration::from_millis(40))
            .build()
            .unwrap();

        assert_eq!(config.classify, ClassifyPolicy::reference());
        assert!(!config.checkpoint_skipped);
        assert_eq!(config.max_publish_retries, 0);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.flush_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_rejects_inverted_delays() {
        let result = ForwarderConfig::builder()
            .retry_delay(Duration::from_secs(10))
            .max_retry_delay(Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_shutdown_handle_is_shared() {
        let (tx, _rx) = watch::channel(false);
        let handle = ShutdownHandle { tx: Arc::new(tx) };
        let clone = handle.clone();
        assert!(!clone.is_shutdown_requested());
        handle.shutdown();
        assert!(clone.is_shutdown_requested());
    }

    #[test]
    fn test_requires_operator() {
        let expired = ForwarderError::ResumeTokenExpired {
            token: ResumeToken::from_data("T999"),
            source: SourceError::ResumeTokenExpired {
                message: "history lost".into(),
                code: Some(286),
            },
        };
        assert!(expired.requires_operator());
        assert!(expired.to_string().contains("T999"));

        let stream = ForwarderError::Stream(SourceError::Ended);
        assert!(!stream.requires_operator());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves_after_signal() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { wait_for_shutdown(&mut rx).await });
        tx.send_replace(true);
        waiter.await.unwrap();
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ForwarderState::Publishing.to_string(), "publishing");
        assert_eq!(ForwarderState::Stopped.to_string(), "stopped");
    }
}
