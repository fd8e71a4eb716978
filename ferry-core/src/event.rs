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

//! Change notifications as they leave the change-capture source.
//!
//! A [`ChangeEvent`] is produced by a [`ChangeSource`](crate::source::ChangeSource),
//! consumed exactly once by the [`Forwarder`](crate::forwarder::Forwarder) and
//! never mutated in between.
//!
//! # Examples
//!
//! ```rust
//! use ferry_core::event::{ChangeEvent, Namespace, OperationType, ResumeToken};
//! use bson::doc;
//!
//! let event = ChangeEvent {
//!     operation: OperationType::Insert,
//!     namespace: Namespace::new("sample_mflix", "movies"),
//!     document_key: Some(doc! { "_id": "42" }),
//!     full_document: Some(doc! { "_id": "42", "title": "Inception" }),
//!     update_description: None,
//!     cluster_time: None,
//!     resume_token: ResumeToken::from_data("T100"),
//! };
//!
//! assert!(event.is_insert());
//! assert_eq!(event.resume_token.to_string(), "T100");
//! ```

use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error that can occur when converting from the MongoDB driver's change event.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionError {
    /// The resume token could not be represented as a BSON document.
    #[error("Failed to convert resume token: {0}")]
    ResumeTokenConversion(String),
}

/// Change stream operation types.
///
/// Only `Insert`, `Update`, `Replace` and `Delete` carry document data the
/// forwarder knows how to publish. Everything else is a collection- or
/// database-level event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum OperationType {
    /// A document was inserted
    Insert,

    /// A document was modified in place
    Update,

    /// A document was deleted
    Delete,

    /// A document was replaced entirely
    Replace,

    /// The change stream was invalidated (collection dropped, renamed, etc.)
    Invalidate,

    /// A collection was dropped
    Drop,

    /// A database was dropped
    #[serde(rename = "dropdatabase")]
    DropDatabase,

    /// A collection was renamed
    Rename,

    /// An operation type this crate does not know about.
    ///
    /// Contains the original operation type string for logging.
    #[serde(untagged)]
    Unknown(String),
}

impl OperationType {
    /// Returns true for the document-level kinds the classifier handles
    /// explicitly (insert, update, replace, delete).
    #[inline]
    pub fn is_document_change(&self) -> bool {
        matches!(
            self,
            OperationType::Insert
                | OperationType::Update
                | OperationType::Replace
                | OperationType::Delete
        )
    }

    /// Returns true if this is an unknown operation type.
    #[inline]
    pub fn is_unknown(&self) -> bool {
        matches!(self, OperationType::Unknown(_))
    }

    /// Returns a stable lowercase label, suitable for logs and metric labels.
    pub fn as_str(&self) -> &str {
        match self {
            OperationType::Insert => "insert",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Replace => "replace",
            OperationType::Invalidate => "invalidate",
            OperationType::Drop => "drop",
            OperationType::DropDatabase => "dropdatabase",
            OperationType::Rename => "rename",
            OperationType::Unknown(op) => op.as_str(),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace (database + collection) where an operation occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    /// Database name
    #[serde(rename = "db")]
    pub database: String,

    /// Collection name
    #[serde(rename = "coll")]
    pub collection: String,
}

impl Namespace {
    /// Creates a new namespace from database and collection names.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Returns the fully qualified namespace as "database.collection".
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }
}

/// Describes what changed in an in-place update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDescription {
    /// Fields that were added or modified, keyed by dotted path
    #[serde(rename = "updatedFields")]
    pub updated_fields: Document,

    /// Fields that were removed from the document
    #[serde(rename = "removedFields")]
    pub removed_fields: Vec<String>,
}

/// Opaque, totally ordered marker for a position in the change stream.
///
/// For MongoDB this is the `_id` of the change event, a document of the form
/// `{ "_data": "<hex>" }`. The forwarder never looks inside it; it only stores
/// it and hands it back to the source on restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeToken(Document);

impl ResumeToken {
    /// Wraps a raw resume token document.
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self(document)
    }

    /// Builds a token of the MongoDB shape `{ "_data": data }`.
    #[must_use]
    pub fn from_data(data: impl Into<String>) -> Self {
        let mut document = Document::new();
        document.insert("_data", data.into());
        Self(document)
    }

    /// Returns the `_data` string if the token has one.
    pub fn data(&self) -> Option<&str> {
        self.0.get_str("_data").ok()
    }

    /// Borrows the underlying document.
    pub fn as_document(&self) -> &Document {
        &self.0
    }

    /// Consumes the token, returning the underlying document.
    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Document> for ResumeToken {
    fn from(document: Document) -> Self {
        Self(document)
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data() {
            Some(data) => f.write_str(data),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A single change notification.
///
/// # Field presence
///
/// | operation | `full_document` | `update_description` |
/// |---|---|---|
/// | insert, replace | always | never |
/// | update | only with update lookup, and only if the document still exists | always |
/// | delete | never | never |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Type of operation that occurred
    #[serde(rename = "operationType")]
    pub operation: OperationType,

    /// Namespace where the operation occurred
    #[serde(rename = "ns")]
    pub namespace: Namespace,

    /// Document key (`_id` plus shard key if sharded)
    #[serde(rename = "documentKey", skip_serializing_if = "Option::is_none")]
    pub document_key: Option<Document>,

    /// Complete post-change document
    #[serde(rename = "fullDocument", skip_serializing_if = "Option::is_none")]
    pub full_document: Option<Document>,

    /// Changed fields for update operations
    #[serde(rename = "updateDescription", skip_serializing_if = "Option::is_none")]
    pub update_description: Option<UpdateDescription>,

    /// Commit time of the operation, second precision
    #[serde(rename = "clusterTime", skip_serializing_if = "Option::is_none")]
    pub cluster_time: Option<DateTime<Utc>>,

    /// This notification's position in the stream
    #[serde(rename = "_id")]
    pub resume_token: ResumeToken,
}

impl ChangeEvent {
    /// Returns true if this is an insert operation.
    #[inline]
    pub fn is_insert(&self) -> bool {
        self.operation == OperationType::Insert
    }

    /// Returns true if this is an update operation.
    #[inline]
    pub fn is_update(&self) -> bool {
        self.operation == OperationType::Update
    }

    /// Returns true if this is a delete operation.
    #[inline]
    pub fn is_delete(&self) -> bool {
        self.operation == OperationType::Delete
    }

    /// Returns true if this is a replace operation.
    #[inline]
    pub fn is_replace(&self) -> bool {
        self.operation == OperationType::Replace
    }

    /// Returns true if this is an invalidate operation.
    #[inline]
    pub fn is_invalidate(&self) -> bool {
        self.operation == OperationType::Invalidate
    }

    /// Returns the `_id` from the document key, if present.
    pub fn document_id(&self) -> Option<&Bson> {
        self.document_key.as_ref()?.get("_id")
    }

    /// Returns true if the post-change document is attached.
    #[inline]
    pub fn has_full_document(&self) -> bool {
        self.full_document.is_some()
    }
}

impl TryFrom<mongodb::change_stream::event::ChangeStreamEvent<Document>> for ChangeEvent {
    type Error = ConversionError;

    fn try_from(
        event: mongodb::change_stream::event::ChangeStreamEvent<Document>,
    ) -> Result<Self, Self::Error> {
        use mongodb::change_stream::event::OperationType as MongoOpType;

        let operation = match event.operation_type {
            MongoOpType::Insert => OperationType::Insert,
            MongoOpType::Update => OperationType::Update,
            MongoOpType::Delete => OperationType::Delete,
            MongoOpType::Replace => OperationType::Replace,
            MongoOpType::Invalidate => OperationType::Invalidate,
            MongoOpType::Drop => OperationType::Drop,
            MongoOpType::DropDatabase => OperationType::DropDatabase,
            MongoOpType::Rename => OperationType::Rename,
            other => OperationType::Unknown(format!("{other:?}")),
        };

        let namespace = event
            .ns
            .map(|ns| Namespace {
                database: ns.db,
                collection: ns.coll.unwrap_or_default(),
            })
            .unwrap_or_default();

        let update_description = event.update_description.map(|ud| UpdateDescription {
            updated_fields: ud.updated_fields,
            removed_fields: ud.removed_fields,
        });

        let cluster_time = event
            .cluster_time
            .and_then(|ts| DateTime::from_timestamp(i64::from(ts.time), 0));

        let resume_token = bson::to_document(&event.id)
            .map(ResumeToken::new)
            .map_err(|e| ConversionError::ResumeTokenConversion(e.to_string()))?;

        Ok(Self {
            operation,
            namespace,
            document_key: event.document_key,
            full_document: event.full_document,
            update_description,
            cluster_time,
            resume_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_resume_token_display_prefers_data() {
        let token = ResumeToken::from_data("826A1B2C");
        assert_eq!(token.to_string(), "826A1B2C");
        assert_eq!(token.data(), Some("826A1B2C"));

        let odd = ResumeToken::new(doc! { "ts": 7 });
        assert_eq!(odd.data(), None);
        assert!(odd.to_string().contains("ts"));
    }

    #[test]
    fn test_operation_labels() {
        assert_eq!(OperationType::DropDatabase.as_str(), "dropdatabase");
        assert_eq!(OperationType::Unknown("shardCollection".into()).as_str(), "shardCollection");
        assert!(OperationType::Delete.is_document_change());
        assert!(!OperationType::Rename.is_document_change());
    }
}
