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

//! Command-line and environment configuration for the `ferry` binary.
//!
//! Every option can be given as a flag or through its environment variable.
//! Required values that are present but empty are rejected by
//! [`Args::validate`], so a blank `TOPIC_ID=` in a deployment manifest fails
//! at startup instead of at the first publish.

use clap::{ArgAction, Parser, ValueEnum};
use ferry_core::checkpoint::{CheckpointError, DEFAULT_CHECKPOINT_ID};
use ferry_core::classify::{ClassifyPolicy, DeletePolicy};
use ferry_core::forwarder::ForwarderConfig;
use ferry_core::publisher::PublishError;
use ferry_publishers::kafka::KafkaConfig;
use ferry_stores::mongodb::{MongoStoreConfig, DEFAULT_CHECKPOINT_COLLECTION};
use std::net::SocketAddr;
use thiserror::Error;

/// Missing or invalid startup parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value is empty
    #[error("{parameter} must not be empty")]
    Empty {
        /// Environment variable name
        parameter: &'static str,
    },

    /// A value was rejected by the component it configures
    #[error("Invalid {component} configuration: {message}")]
    Invalid {
        /// Component the value belongs to
        component: &'static str,
        /// What was wrong
        message: String,
    },
}

impl From<PublishError> for ConfigError {
    fn from(err: PublishError) -> Self {
        Self::Invalid {
            component: "publisher",
            message: err.to_string(),
        }
    }
}

impl From<CheckpointError> for ConfigError {
    fn from(err: CheckpointError) -> Self {
        Self::Invalid {
            component: "checkpoint store",
            message: err.to_string(),
        }
    }
}

/// How deletes are forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeleteMode {
    /// Publish `{"_id": <documentKey>, "operationType": "DELETE"}`
    Tombstone,
    /// Log deletes and publish nothing
    Skip,
}

impl From<DeleteMode> for DeletePolicy {
    fn from(mode: DeleteMode) -> Self {
        match mode {
            DeleteMode::Tombstone => Self::Tombstone,
            DeleteMode::Skip => Self::Skip,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Forwards a `MongoDB` change stream to a Kafka topic.
#[derive(Debug, Clone, Parser)]
#[command(name = "ferry")]
#[command(author = "Ferry Contributors")]
#[command(version)]
#[command(about = "Forward a MongoDB change stream to a Kafka topic with a durable resume checkpoint", long_about = None)]
pub struct Args {
    /// `MongoDB` connection string (the deployment must be a replica set)
    #[arg(long, env = "CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: String,

    /// Database holding the watched collection and the checkpoint
    #[arg(long, env = "DATABASE")]
    pub database: String,

    /// Collection to watch
    #[arg(long, env = "COLLECTION")]
    pub collection: String,

    /// Kafka bootstrap servers
    #[arg(long, env = "KAFKA_BROKERS")]
    pub kafka_brokers: String,

    /// Target topic
    #[arg(long, env = "TOPIC_ID")]
    pub topic_id: String,

    /// Collection holding the checkpoint record
    #[arg(long, env = "CHECKPOINT_COLLECTION", default_value = DEFAULT_CHECKPOINT_COLLECTION)]
    pub checkpoint_collection: String,

    /// Id of the checkpoint record
    #[arg(long, env = "CHECKPOINT_ID", default_value = DEFAULT_CHECKPOINT_ID)]
    pub checkpoint_id: String,

    /// How deletes are forwarded
    #[arg(long, env = "DELETE_POLICY", value_enum, default_value_t = DeleteMode::Tombstone)]
    pub delete_policy: DeleteMode,

    /// Advance the checkpoint past notifications that are not published
    #[arg(long, env = "CHECKPOINT_SKIPPED", default_value_t = true, action = ArgAction::Set)]
    pub checkpoint_skipped: bool,

    /// Retries for a publish that failed with a transient error
    #[arg(long, env = "MAX_PUBLISH_RETRIES", default_value_t = 3)]
    pub max_publish_retries: usize,

    /// Delete the stored checkpoint before starting (resume from the stream tail)
    #[arg(long, env = "RESET_CHECKPOINT", default_value_t = false, action = ArgAction::Set)]
    pub reset_checkpoint: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Address for the Prometheus scrape endpoint (disabled when unset)
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Args {
    /// Rejects empty required values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Empty`] naming the first empty variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("CONNECTION_STRING", &self.connection_string),
            ("DATABASE", &self.database),
            ("COLLECTION", &self.collection),
            ("KAFKA_BROKERS", &self.kafka_brokers),
            ("TOPIC_ID", &self.topic_id),
            ("CHECKPOINT_COLLECTION", &self.checkpoint_collection),
            ("CHECKPOINT_ID", &self.checkpoint_id),
        ];

        for (parameter, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty { parameter });
            }
        }

        Ok(())
    }

    /// Forwarding loop configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the loop rejects the values.
    pub fn forwarder_config(&self) -> Result<ForwarderConfig, ConfigError> {
        ForwarderConfig::builder()
            .classify(ClassifyPolicy {
                deletes: self.delete_policy.into(),
            })
            .checkpoint_skipped(self.checkpoint_skipped)
            .max_publish_retries(self.max_publish_retries)
            .build()
            .map_err(|message| ConfigError::Invalid {
                component: "forwarder",
                message,
            })
    }

    /// Checkpoint store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the store rejects the values.
    pub fn store_config(&self) -> Result<MongoStoreConfig, ConfigError> {
        Ok(MongoStoreConfig::builder()
            .uri(&self.connection_string)
            .database(&self.database)
            .collection(&self.checkpoint_collection)
            .checkpoint_id(&self.checkpoint_id)
            .build()?)
    }

    /// Kafka publisher configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the publisher rejects the values.
    pub fn kafka_config(&self) -> Result<KafkaConfig, ConfigError> {
        Ok(KafkaConfig::builder()
            .brokers(&self.kafka_brokers)
            .topic(&self.topic_id)
            .client_id(format!("ferry-{}-{}", self.database, self.collection))
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 11] = [
        "ferry",
        "--connection-string",
        "mongodb://localhost:27017/?replicaSet=rs0",
        "--database",
        "sample_mflix",
        "--collection",
        "movies",
        "--kafka-brokers",
        "localhost:9092",
        "--topic-id",
        "movies-cdc",
    ];

    fn parse(extra: &[&str]) -> Args {
        let argv: Vec<&str> = REQUIRED.iter().chain(extra).copied().collect();
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);

        assert_eq!(args.checkpoint_collection, "resume_tokens");
        assert_eq!(args.checkpoint_id, "ferry_checkpoint");
        assert_eq!(args.delete_policy, DeleteMode::Tombstone);
        assert!(args.checkpoint_skipped);
        assert_eq!(args.max_publish_retries, 3);
        assert!(!args.reset_checkpoint);
        assert_eq!(args.log_format, LogFormat::Text);
        assert!(args.metrics_addr.is_none());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_reference_behavior_flags() {
        let args = parse(&[
            "--delete-policy",
            "skip",
            "--checkpoint-skipped",
            "false",
            "--max-publish-retries",
            "0",
        ]);

        let config = args.forwarder_config().unwrap();
        assert_eq!(config.classify, ClassifyPolicy::reference());
        assert!(!config.checkpoint_skipped);
        assert_eq!(config.max_publish_retries, 0);
    }

    #[test]
    fn test_empty_required_value_is_rejected() {
        let mut argv = REQUIRED;
        argv[10] = "";
        let args = Args::try_parse_from(argv).unwrap();

        let err = args.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Empty { parameter: "TOPIC_ID" }));
    }

    #[test]
    fn test_component_configs() {
        let args = parse(&["--checkpoint-id", "movies_cdc_resume_token"]);

        let store = args.store_config().unwrap();
        assert_eq!(store.database, "sample_mflix");
        assert_eq!(store.collection, "resume_tokens");
        assert_eq!(store.checkpoint_id, "movies_cdc_resume_token");

        let kafka = args.kafka_config().unwrap();
        assert_eq!(kafka.topic, "movies-cdc");
        assert_eq!(kafka.client_id, "ferry-sample_mflix-movies");
    }

    #[test]
    fn test_invalid_delete_policy() {
        let argv: Vec<&str> = REQUIRED
            .iter()
            .copied()
            .chain(["--delete-policy", "archive"])
            .collect();
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_metrics_addr() {
        let args = parse(&["--metrics-addr", "0.0.0.0:9000"]);
        assert_eq!(args.metrics_addr, Some(([0, 0, 0, 0], 9000).into()));
    }
}
