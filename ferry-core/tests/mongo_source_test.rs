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

//! Integration tests for the `MongoDB` change source.
//!
//! Change streams need a replica set, so these tests start a single-node
//! replica set in Docker. Run them with:
//!
//! ```bash
//! cargo test --package ferry-core --test mongo_source_test -- --ignored
//! ```

use bson::{doc, Document};
use ferry_core::event::OperationType;
use ferry_core::source::ChangeSource;
use ferry_core::stream::{ChangeStreamConfig, MongoChangeSource};
use futures::StreamExt;
use mongodb::{Client, Collection};
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mongo::Mongo;

async fn replica_set() -> (ContainerAsync<Mongo>, String) {
    let container = Mongo::repl_set()
        .start()
        .await
        .expect("failed to start MongoDB container");
    let port = container
        .get_host_port_ipv4(27017)
        .await
        .expect("failed to get port");
    (
        container,
        format!("mongodb://127.0.0.1:{port}/?directConnection=true"),
    )
}

async fn movies(uri: &str) -> Collection<Document> {
    Client::with_uri_str(uri)
        .await
        .expect("client")
        .database("sample_mflix")
        .collection("movies")
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_updates_arrive_with_full_document() {
    let (_container, uri) = replica_set().await;
    let collection = movies(&uri).await;
    let source = MongoChangeSource::new(collection.clone(), ChangeStreamConfig::default());

    let mut stream = source.open(None).await.expect("open");

    collection
        .insert_one(doc! { "_id": 1, "title": "Inception", "year": 2009 })
        .await
        .expect("insert");
    collection
        .update_one(doc! { "_id": 1 }, doc! { "$set": { "year": 2010 } })
        .await
        .expect("update");

    let insert = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("insert notification in time")
        .expect("stream open")
        .expect("valid event");
    assert_eq!(insert.operation, OperationType::Insert);
    assert_eq!(insert.namespace.full_name(), "sample_mflix.movies");

    let update = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("update notification in time")
        .expect("stream open")
        .expect("valid event");
    assert_eq!(update.operation, OperationType::Update);
    assert_eq!(
        update.full_document,
        Some(doc! { "_id": 1, "title": "Inception", "year": 2010 })
    );
    assert!(update.resume_token.data().is_some());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_resume_starts_after_token() {
    let (_container, uri) = replica_set().await;
    let collection = movies(&uri).await;
    let source = MongoChangeSource::new(collection.clone(), ChangeStreamConfig::default());

    let mut stream = source.open(None).await.expect("open");
    for id in 1..=3 {
        collection
            .insert_one(doc! { "_id": id, "title": format!("Movie {id}") })
            .await
            .expect("insert");
    }

    let first = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("notification in time")
        .expect("stream open")
        .expect("valid event");
    drop(stream);

    let mut resumed = source.open(Some(&first.resume_token)).await.expect("resume");
    let next = tokio::time::timeout(Duration::from_secs(10), resumed.next())
        .await
        .expect("notification in time")
        .expect("stream open")
        .expect("valid event");

    assert_eq!(next.document_key, Some(doc! { "_id": 2 }));
}
