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

#![cfg(feature = "redis-store")]

use ferry_core::checkpoint::CheckpointStore;
use ferry_core::event::ResumeToken;
use ferry_stores::redis::{RedisConfig, RedisStore};
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::Redis;

/// Helper to create a Redis store connected to a test container.
async fn create_test_store(url: String, checkpoint_id: &str, ttl: Option<Duration>) -> RedisStore {
    let mut builder = RedisConfig::builder()
        .url(url)
        .checkpoint_id(checkpoint_id)
        .pool_size(2);
    if let Some(ttl) = ttl {
        builder = builder.ttl(ttl);
    }

    RedisStore::new(builder.build().expect("valid config"))
        .await
        .expect("failed to create store")
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_redis_checkpoint_lifecycle() {
    let redis_container = Redis::default()
        .start()
        .await
        .expect("failed to start Redis container");

    let host_port = redis_container
        .get_host_port_ipv4(6379)
        .await
        .expect("failed to get port");

    let url = format!("redis://127.0.0.1:{host_port}");
    let store = create_test_store(url, "movies_forwarder", None).await;

    assert_eq!(store.load().await.expect("load"), None);

    store
        .save(&ResumeToken::from_data("T100"))
        .await
        .expect("failed to save token");
    store
        .save(&ResumeToken::from_data("T101"))
        .await
        .expect("failed to save token");

    assert_eq!(
        store.load().await.expect("load"),
        Some(ResumeToken::from_data("T101"))
    );

    store.clear().await.expect("failed to clear");
    assert_eq!(store.load().await.expect("load"), None);

    store.close().await.expect("failed to close store");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_redis_checkpoint_ids_are_isolated() {
    let redis_container = Redis::default()
        .start()
        .await
        .expect("failed to start Redis container");

    let host_port = redis_container
        .get_host_port_ipv4(6379)
        .await
        .expect("failed to get port");

    let url = format!("redis://127.0.0.1:{host_port}");
    let movies = create_test_store(url.clone(), "movies", None).await;
    let comments = create_test_store(url, "comments", None).await;

    movies
        .save(&ResumeToken::from_data("M1"))
        .await
        .expect("save");

    assert_eq!(comments.load().await.expect("load"), None);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_redis_checkpoint_expires_with_ttl() {
    let redis_container = Redis::default()
        .start()
        .await
        .expect("failed to start Redis container");

    let host_port = redis_container
        .get_host_port_ipv4(6379)
        .await
        .expect("failed to get port");

    let url = format!("redis://127.0.0.1:{host_port}");
    let store = create_test_store(url, "short_lived", Some(Duration::from_secs(1))).await;

    store
        .save(&ResumeToken::from_data("T1"))
        .await
        .expect("save");
    assert!(store.load().await.expect("load").is_some());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(store.load().await.expect("load"), None);
}
