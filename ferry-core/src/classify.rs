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

//! Event classification and payload building.
//!
//! [`classify`] maps one [`ChangeEvent`] to either an [`OutboundMessage`] or a
//! [`SkipReason`]. It is a pure function: no I/O, no clock, no randomness.
//!
//! | operation | full document? | outcome |
//! |---|---|---|
//! | insert / replace | yes | full document, verbatim |
//! | update | yes | full document, verbatim |
//! | update | no | skip ([`SkipReason::PartialUpdate`]) |
//! | delete | n/a | tombstone, or skip under [`DeletePolicy::Skip`] |
//! | anything else | n/a | skip ([`SkipReason::UnsupportedOperation`]) |
//!
//! Partial updates are never published. A later replace or update with lookup
//! carries the complete document for the same key.
//!
//! # Example
//!
//! ```rust
//! use ferry_core::classify::{classify, ClassifyPolicy};
//! use ferry_core::event::{ChangeEvent, Namespace, OperationType, ResumeToken};
//! use bson::doc;
//!
//! let event = ChangeEvent {
//!     operation: OperationType::Insert,
//!     namespace: Namespace::new("sample_mflix", "movies"),
//!     document_key: Some(doc! { "id": "42" }),
//!     full_document: Some(doc! { "id": "42", "title": "Inception" }),
//!     update_description: None,
//!     cluster_time: None,
//!     resume_token: ResumeToken::from_data("T100"),
//! };
//!
//! let message = classify(&event, &ClassifyPolicy::default()).unwrap();
//! assert_eq!(message.payload(), br#"{"id":"42","title":"Inception"}"#);
//! ```

use crate::event::{ChangeEvent, OperationType, ResumeToken};
use bson::{Bson, Document};
use serde_json::Value;

/// What to do with delete notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Log the tombstone, publish nothing.
    Skip,

    /// Publish `{"_id": <documentKey>, "operationType": "DELETE"}`.
    #[default]
    Tombstone,
}

/// Classification policy.
///
/// The default publishes deletes as tombstones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyPolicy {
    /// Handling of delete notifications
    pub deletes: DeletePolicy,
}

impl ClassifyPolicy {
    /// Deletes are logged and dropped; only insert, replace and looked-up
    /// updates are published.
    #[must_use]
    pub const fn reference() -> Self {
        Self {
            deletes: DeletePolicy::Skip,
        }
    }
}

/// Why a notification was not turned into a message.
///
/// Skips are policy outcomes, not failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    /// Update without a post-change document; only a partial payload could be built.
    #[error("update without full document (lookup disabled or document already gone)")]
    PartialUpdate,

    /// Delete under [`DeletePolicy::Skip`].
    #[error("delete suppressed by policy")]
    DeleteSuppressed,

    /// Collection- or database-level event, or an unknown operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(OperationType),

    /// Insert or replace that arrived without its document.
    #[error("{0} without full document")]
    MissingFullDocument(OperationType),

    /// Delete without a document key; no tombstone can be addressed.
    #[error("delete without document key")]
    MissingDocumentKey,
}

impl SkipReason {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PartialUpdate => "partial_update",
            Self::DeleteSuppressed => "delete_suppressed",
            Self::UnsupportedOperation(_) => "unsupported_operation",
            Self::MissingFullDocument(_) => "missing_full_document",
            Self::MissingDocumentKey => "missing_document_key",
        }
    }
}

/// A payload ready for publication.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    payload: Vec<u8>,
    key: Option<String>,
    operation: OperationType,
    resume_token: ResumeToken,
}

impl OutboundMessage {
    /// Serialized payload bytes (compact relaxed Extended JSON).
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Document key of the source notification as compact JSON, for tracing
    /// and as the transport ordering key.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Operation the payload was built from.
    #[must_use]
    pub fn operation(&self) -> &OperationType {
        &self.operation
    }

    /// Stream position of the source notification.
    #[must_use]
    pub fn resume_token(&self) -> &ResumeToken {
        &self.resume_token
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consumes the message, returning the payload bytes.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Classifies a notification and builds its outbound payload.
///
/// # Errors
///
/// Returns a [`SkipReason`] when the notification must not be published.
pub fn classify(event: &ChangeEvent, policy: &ClassifyPolicy) -> Result<OutboundMessage, SkipReason> {
    let payload = match &event.operation {
        OperationType::Insert | OperationType::Replace => match &event.full_document {
            Some(document) => document_json(document),
            None => return Err(SkipReason::MissingFullDocument(event.operation.clone())),
        },
        OperationType::Update => match &event.full_document {
            Some(document) => document_json(document),
            None => return Err(SkipReason::PartialUpdate),
        },
        OperationType::Delete => match policy.deletes {
            DeletePolicy::Skip => return Err(SkipReason::DeleteSuppressed),
            DeletePolicy::Tombstone => match &event.document_key {
                Some(key) => tombstone(key),
                None => return Err(SkipReason::MissingDocumentKey),
            },
        },
        other => return Err(SkipReason::UnsupportedOperation(other.clone())),
    };

    let payload = payload.to_string().into_bytes();
    let key = event
        .document_key
        .as_ref()
        .map(|key| document_json(key).to_string());

    Ok(OutboundMessage {
        payload,
        key,
        operation: event.operation.clone(),
        resume_token: event.resume_token.clone(),
    })
}

/// Renders the delete tombstone that would be published for `event`.
///
/// Used for logging under [`DeletePolicy::Skip`]; returns `None` when the
/// event carries no document key.
#[must_use]
pub fn tombstone_json(event: &ChangeEvent) -> Option<String> {
    event.document_key.as_ref().map(|key| tombstone(key).to_string())
}

fn tombstone(document_key: &Document) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("_id".to_string(), document_json(document_key));
    body.insert("operationType".to_string(), Value::from("DELETE"));
    Value::Object(body)
}

fn document_json(document: &Document) -> Value {
    Bson::Document(document.clone()).into_relaxed_extjson()
}
