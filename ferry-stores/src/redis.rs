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

//! Redis-backed checkpoint store.
//!
//! # Features
//!
//! - **Connection Pooling**: Uses `deadpool-redis` for connection management
//! - **TTL Support**: Optional expiration so abandoned checkpoints do not linger
//! - **Retry Logic**: Automatic retries on transient connection failures
//!
//! # Example
//!
//! ```rust,no_run
//! use ferry_stores::redis::{RedisConfig, RedisStore};
//! use ferry_core::checkpoint::CheckpointStore;
//! use ferry_core::event::ResumeToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::builder()
//!     .url("redis://localhost:6379")
//!     .checkpoint_id("movies_forwarder")
//!     .build()?;
//!
//! let store = RedisStore::new(config).await?;
//! store.save(&ResumeToken::from_data("8265F0A1")).await?;
//! assert!(store.load().await?.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! # Key Pattern
//!
//! ```text
//! ferry:checkpoint:{checkpoint_id}
//! ```
//!
//! The value is the BSON encoding of the resume token document.

use async_trait::async_trait;
use bson::Document;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use ferry_core::checkpoint::{CheckpointError, CheckpointStore, DEFAULT_CHECKPOINT_ID};
use ferry_core::event::ResumeToken;
use redis::{AsyncCommands, RedisError};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Key prefix for all Ferry checkpoints in Redis.
const KEY_PREFIX: &str = "ferry:checkpoint";

/// Maximum number of retry attempts for transient Redis errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_RETRY_DELAY_MS: u64 = 100;

/// Configuration for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,

    /// Id of the checkpoint record (default: `ferry_checkpoint`)
    pub checkpoint_id: String,

    /// Connection pool size (default: 4)
    pub pool_size: usize,

    /// Optional TTL for the checkpoint key, refreshed on every save
    pub ttl: Option<Duration>,

    /// Connection timeout (default: 5 seconds)
    pub connection_timeout: Duration,

    /// Maximum number of retries for transient errors (default: 3)
    pub max_retries: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            checkpoint_id: DEFAULT_CHECKPOINT_ID.to_string(),
            pool_size: 4,
            ttl: None,
            connection_timeout: Duration::from_secs(5),
            max_retries: MAX_RETRIES,
        }
    }
}

impl RedisConfig {
    /// Creates a new builder for `RedisConfig`.
    #[must_use]
    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder::default()
    }
}

/// Builder for [`RedisConfig`] with validation.
#[derive(Debug, Default)]
pub struct RedisConfigBuilder {
    url: Option<String>,
    checkpoint_id: Option<String>,
    pool_size: Option<usize>,
    ttl: Option<Duration>,
    connection_timeout: Option<Duration>,
    max_retries: Option<u32>,
}

impl RedisConfigBuilder {
    /// Sets the Redis connection URL.
    ///
    /// # Formats
    ///
    /// - Standalone: `redis://localhost:6379`
    /// - With auth: `redis://:password@localhost:6379`
    /// - With database: `redis://localhost:6379/0`
    /// - TLS: `rediss://localhost:6380`
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the checkpoint record id.
    #[must_use]
    pub fn checkpoint_id(mut self, id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(id.into());
        self
    }

    /// Sets the connection pool size.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Sets the TTL for the checkpoint key.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the maximum number of retries for transient errors.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Builds the `RedisConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - URL is not provided
    /// - Pool size is 0
    /// - Checkpoint id is empty
    /// - TTL is shorter than one second
    pub fn build(self) -> Result<RedisConfig, CheckpointError> {
        let url = self
            .url
            .ok_or_else(|| CheckpointError::Configuration("Redis URL is required".to_string()))?;

        let pool_size = self.pool_size.unwrap_or(4);
        if pool_size == 0 {
            return Err(CheckpointError::Configuration(
                "Pool size must be greater than 0".to_string(),
            ));
        }

        let checkpoint_id = self
            .checkpoint_id
            .unwrap_or_else(|| DEFAULT_CHECKPOINT_ID.to_string());
        if checkpoint_id.is_empty() {
            return Err(CheckpointError::Configuration(
                "Checkpoint id must not be empty".to_string(),
            ));
        }

        if matches!(self.ttl, Some(ttl) if ttl.as_secs() == 0) {
            return Err(CheckpointError::Configuration(
                "TTL must be at least one second".to_string(),
            ));
        }

        Ok(RedisConfig {
            url,
            checkpoint_id,
            pool_size,
            ttl: self.ttl,
            connection_timeout: self.connection_timeout.unwrap_or(Duration::from_secs(5)),
            max_retries: self.max_retries.unwrap_or(MAX_RETRIES),
        })
    }
}

/// Redis-backed checkpoint store.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    key: String,
    config: RedisConfig,
}

impl RedisStore {
    /// Creates a new `RedisStore` and verifies connectivity with `PING`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or Redis does not answer.
    pub async fn new(config: RedisConfig) -> Result<Self, CheckpointError> {
        debug!(checkpoint_id = %config.checkpoint_id, "Initializing Redis checkpoint store");

        let mut pool_config = PoolConfig::from_url(&config.url);

        if let Some(pool) = pool_config.pool.as_mut() {
            pool.max_size = config.pool_size;
            pool.timeouts.wait = Some(config.connection_timeout);
            pool.timeouts.create = Some(config.connection_timeout);
            pool.timeouts.recycle = Some(config.connection_timeout);
        }

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| {
                error!("Failed to create Redis connection pool: {}", e);
                CheckpointError::Connection(format!("Failed to create pool: {e}"))
            })?;

        let mut conn = pool.get().await.map_err(|e| {
            error!("Failed to get connection from pool: {}", e);
            CheckpointError::Connection(format!("Failed to connect to Redis: {e}"))
        })?;

        redis::cmd("PING")
            .query_async::<()>(&mut *conn)
            .await
            .map_err(|e| {
                error!("Redis PING failed: {}", e);
                CheckpointError::Connection(format!("Redis connection test failed: {e}"))
            })?;

        debug!("Redis checkpoint store initialized");

        Ok(Self {
            pool,
            key: Self::make_key(&config.checkpoint_id),
            config,
        })
    }

    /// Generates the Redis key for a checkpoint id.
    fn make_key(checkpoint_id: &str) -> String {
        format!("{KEY_PREFIX}:{checkpoint_id}")
    }

    /// Executes a Redis operation with retry logic for transient errors.
    async fn with_retry<F, T, Fut>(&self, operation: F) -> Result<T, CheckpointError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::is_retryable(&e) && retries < self.config.max_retries => {
                    retries += 1;
                    let delay = Duration::from_millis(BASE_RETRY_DELAY_MS * 2_u64.pow(retries - 1));
                    warn!(
                        "Redis operation failed (attempt {}/{}), retrying in {:?}: {}",
                        retries, self.config.max_retries, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("Redis operation failed after {} retries: {}", retries, e);
                    return Err(CheckpointError::Connection(format!(
                        "Redis operation failed: {e}"
                    )));
                }
            }
        }
    }

    /// Determines if a Redis error is retryable.
    fn is_retryable(error: &RedisError) -> bool {
        matches!(
            error.kind(),
            redis::ErrorKind::IoError | redis::ErrorKind::ResponseError
        )
    }

    fn pool_error(e: impl std::fmt::Display) -> RedisError {
        RedisError::from((
            redis::ErrorKind::IoError,
            "Failed to get connection from pool",
            e.to_string(),
        ))
    }

    /// Serializes a resume token to BSON bytes.
    fn serialize_token(token: &ResumeToken) -> Result<Vec<u8>, CheckpointError> {
        bson::to_vec(token.as_document()).map_err(|e| {
            CheckpointError::Serialization(format!("Failed to serialize resume token: {e}"))
        })
    }

    /// Deserializes BSON bytes back to a resume token.
    fn deserialize_token(bytes: &[u8]) -> Result<ResumeToken, CheckpointError> {
        bson::from_slice::<Document>(bytes)
            .map(ResumeToken::new)
            .map_err(|e| {
                CheckpointError::Serialization(format!("Failed to deserialize resume token: {e}"))
            })
    }
}

#[async_trait]
impl CheckpointStore for RedisStore {
    async fn load(&self) -> Result<Option<ResumeToken>, CheckpointError> {
        let pool = self.pool.clone();
        let key = &self.key;

        let bytes: Option<Vec<u8>> = self
            .with_retry(|| async {
                let mut conn = pool.get().await.map_err(Self::pool_error)?;
                conn.get(key).await
            })
            .await?;

        match bytes {
            Some(data) => {
                let token = Self::deserialize_token(&data)?;
                debug!(key = %self.key, resume_token = %token, "Found checkpoint in Redis");
                Ok(Some(token))
            }
            None => {
                debug!(key = %self.key, "No checkpoint in Redis");
                Ok(None)
            }
        }
    }

    async fn save(&self, token: &ResumeToken) -> Result<(), CheckpointError> {
        let value = Self::serialize_token(token)?;
        let pool = self.pool.clone();
        let key = &self.key;
        let ttl = self.config.ttl;

        self.with_retry::<_, (), _>(|| async {
            let mut conn = pool.get().await.map_err(Self::pool_error)?;
            match ttl {
                Some(ttl) => conn.set_ex(key, &value, ttl.as_secs()).await,
                None => conn.set(key, &value).await,
            }
        })
        .await?;

        debug!(key = %self.key, resume_token = %token, "Checkpoint written to Redis");
        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        let pool = self.pool.clone();
        let key = &self.key;

        self.with_retry::<_, (), _>(|| async {
            let mut conn = pool.get().await.map_err(Self::pool_error)?;
            conn.del(key).await
        })
        .await?;

        debug!(key = %self.key, "Checkpoint cleared from Redis");
        Ok(())
    }

    async fn close(&self) -> Result<(), CheckpointError> {
        self.pool.close();
        debug!("Redis checkpoint store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_key() {
        assert_eq!(
            RedisStore::make_key("ferry_checkpoint"),
            "ferry:checkpoint:ferry_checkpoint"
        );
    }

    #[test]
    fn test_config_builder() {
        let config = RedisConfig::builder()
            .url("redis://localhost:6379")
            .checkpoint_id("movies_forwarder")
            .pool_size(2)
            .ttl(Duration::from_secs(3600))
            .build()
            .unwrap();

        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.checkpoint_id, "movies_forwarder");
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.ttl, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_config_builder_defaults_checkpoint_id() {
        let config = RedisConfig::builder()
            .url("redis://localhost:6379")
            .build()
            .unwrap();
        assert_eq!(config.checkpoint_id, DEFAULT_CHECKPOINT_ID);
        assert_eq!(config.max_retries, MAX_RETRIES);
    }

    #[test]
    fn test_config_builder_missing_url() {
        assert!(RedisConfig::builder().pool_size(10).build().is_err());
    }

    #[test]
    fn test_config_builder_zero_pool_size() {
        let result = RedisConfig::builder()
            .url("redis://localhost:6379")
            .pool_size(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_builder_sub_second_ttl() {
        let result = RedisConfig::builder()
            .url("redis://localhost:6379")
            .ttl(Duration::from_millis(500))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_deserialize_token() {
        let token = ResumeToken::from_data("8265F0A1B2000000012B0229296E04");
        let bytes = RedisStore::serialize_token(&token).unwrap();
        assert_eq!(RedisStore::deserialize_token(&bytes).unwrap(), token);
    }
}
