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

//! Integration tests for the event and classify modules.

use bson::{doc, oid::ObjectId, Bson};
use ferry_core::classify::{classify, ClassifyPolicy, SkipReason};
use ferry_core::event::{ChangeEvent, Namespace, OperationType, ResumeToken, UpdateDescription};

#[test]
fn test_operation_type_serialization() {
    let json = serde_json::to_string(&OperationType::Insert).unwrap();
    assert_eq!(json, r#""insert""#);

    let op: OperationType = serde_json::from_str(r#""dropdatabase""#).unwrap();
    assert_eq!(op, OperationType::DropDatabase);
}

#[test]
fn test_operation_type_unknown_variant() {
    let op: OperationType = serde_json::from_str(r#""shardCollection""#).unwrap();
    assert!(op.is_unknown());
    assert_eq!(op.as_str(), "shardCollection");
}

#[test]
fn test_change_event_from_raw_document() {
    let raw = doc! {
        "_id": { "_data": "8265F0A1B2000000012B0229296E04" },
        "operationType": "update",
        "ns": { "db": "sample_mflix", "coll": "movies" },
        "documentKey": { "_id": 7 },
        "updateDescription": {
            "updatedFields": { "runtime": 148 },
            "removedFields": ["tomatoes"]
        },
        "fullDocument": { "_id": 7, "title": "Inception", "runtime": 148 }
    };

    let event: ChangeEvent = bson::from_document(raw).unwrap();

    assert!(event.is_update());
    assert_eq!(event.namespace.full_name(), "sample_mflix.movies");
    assert_eq!(event.document_id(), Some(&Bson::Int32(7)));
    assert_eq!(event.resume_token.data(), Some("8265F0A1B2000000012B0229296E04"));
    assert_eq!(
        event.update_description.as_ref().unwrap().removed_fields,
        vec!["tomatoes".to_string()]
    );
    assert!(event.cluster_time.is_none());
}

#[test]
fn test_resume_token_is_stored_as_plain_document() {
    let token = ResumeToken::from_data("T100");
    let as_bson = bson::to_bson(&token).unwrap();
    assert_eq!(as_bson, Bson::Document(doc! { "_data": "T100" }));

    let back: ResumeToken = bson::from_bson(as_bson).unwrap();
    assert_eq!(back, token);
}

#[test]
fn test_update_with_lookup_publishes_whole_document() {
    let id = ObjectId::parse_str("573a13b0f29313caabd35231").unwrap();
    let event = ChangeEvent {
        operation: OperationType::Update,
        namespace: Namespace::new("sample_mflix", "movies"),
        document_key: Some(doc! { "_id": id }),
        full_document: Some(doc! { "_id": id, "title": "Inception", "year": 2010 }),
        update_description: Some(UpdateDescription {
            updated_fields: doc! { "year": 2010 },
            removed_fields: vec![],
        }),
        cluster_time: None,
        resume_token: ResumeToken::from_data("T7"),
    };

    let message = classify(&event, &ClassifyPolicy::reference()).unwrap();

    assert_eq!(
        message.payload(),
        br#"{"_id":{"$oid":"573a13b0f29313caabd35231"},"title":"Inception","year":2010}"#
    );
    assert_eq!(message.key(), Some(r#"{"_id":{"$oid":"573a13b0f29313caabd35231"}}"#));
    assert_eq!(message.resume_token(), &ResumeToken::from_data("T7"));
}

#[test]
fn test_collection_events_are_never_published() {
    for operation in [
        OperationType::Drop,
        OperationType::Rename,
        OperationType::DropDatabase,
        OperationType::Invalidate,
    ] {
        let event = ChangeEvent {
            operation: operation.clone(),
            namespace: Namespace::new("sample_mflix", "movies"),
            document_key: None,
            full_document: None,
            update_description: None,
            cluster_time: None,
            resume_token: ResumeToken::from_data("T1"),
        };

        for policy in [ClassifyPolicy::reference(), ClassifyPolicy::default()] {
            assert_eq!(
                classify(&event, &policy),
                Err(SkipReason::UnsupportedOperation(operation.clone()))
            );
        }
    }
}
