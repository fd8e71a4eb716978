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

//! Wires the configured collaborators together and runs the forwarder.

use crate::config::{Args, ConfigError};
use ferry_core::checkpoint::{CheckpointError, CheckpointStore};
use ferry_core::forwarder::{Forwarder, ForwarderError, ShutdownHandle};
use ferry_core::source::SourceError;
use ferry_core::stream::{ChangeStreamConfig, MongoChangeSource};
use ferry_publishers::kafka::KafkaPublisher;
use ferry_stores::mongodb::MongoStore;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};

/// Process exit code for a graceful stop.
pub const EXIT_OK: u8 = 0;
/// Process exit code for a fatal runtime error.
pub const EXIT_FATAL: u8 = 1;
/// Process exit code for missing or invalid configuration.
pub const EXIT_CONFIG: u8 = 2;
/// Process exit code when the stored resume token has expired.
pub const EXIT_RESUME_TOKEN_EXPIRED: u8 = 3;

/// Errors that stop the `ferry` process.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid startup parameters
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The metrics endpoint could not be started
    #[error("Failed to start metrics exporter: {0}")]
    Metrics(String),

    /// The checkpoint store could not be reached or reset
    #[error("Checkpoint store unreachable: {0}")]
    Store(#[source] CheckpointError),

    /// The change source could not be created
    #[error("Failed to create change source: {0}")]
    Source(#[source] SourceError),

    /// The forwarding loop stopped on a fatal error
    #[error(transparent)]
    Forwarder(#[from] ForwarderError),
}

impl AppError {
    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_)
            | Self::Store(CheckpointError::Configuration(_))
            | Self::Source(SourceError::Configuration(_)) => EXIT_CONFIG,
            Self::Forwarder(ForwarderError::ResumeTokenExpired { .. }) => {
                EXIT_RESUME_TOKEN_EXPIRED
            }
            Self::Metrics(_) | Self::Store(_) | Self::Source(_) | Self::Forwarder(_) => EXIT_FATAL,
        }
    }
}

/// Builds every collaborator from `args` and runs until shutdown or a fatal
/// error.
///
/// # Errors
///
/// Returns an [`AppError`]; [`AppError::exit_code`] maps it to the process
/// exit code.
pub async fn run(args: Args) -> Result<(), AppError> {
    args.validate()?;
    let forwarder_config = args.forwarder_config()?;
    let store_config = args.store_config()?;
    let kafka_config = args.kafka_config()?;

    crate::telemetry::init_metrics(args.metrics_addr)
        .map_err(|e| AppError::Metrics(e.to_string()))?;

    info!(
        namespace = %format!("{}.{}", args.database, args.collection),
        topic = %args.topic_id,
        delete_policy = ?args.delete_policy,
        checkpoint_skipped = args.checkpoint_skipped,
        "Starting ferry"
    );

    let publisher = KafkaPublisher::new(kafka_config).map_err(ConfigError::from)?;
    let store = MongoStore::connect(store_config).await.map_err(AppError::Store)?;

    if args.reset_checkpoint {
        warn!(checkpoint_id = %store.checkpoint_id(), "Clearing stored checkpoint");
        store.clear().await.map_err(AppError::Store)?;
    }

    let source = MongoChangeSource::connect(
        &args.connection_string,
        &args.database,
        &args.collection,
        ChangeStreamConfig::default(),
    )
    .await
    .map_err(AppError::Source)?;

    let mut forwarder = Forwarder::new(forwarder_config, source, store, publisher);
    tokio::spawn(shutdown_on_signal(forwarder.shutdown_handle()));

    let result = forwarder.run().await;
    info!(
        state = %forwarder.state(),
        last_checkpoint = ?forwarder.last_checkpoint().map(ToString::to_string),
        "Forwarder finished"
    );

    if let Err(ForwarderError::ResumeTokenExpired { token, .. }) = &result {
        error!(
            resume_token = %token,
            "Stored resume token is no longer in the oplog. Restart with RESET_CHECKPOINT=true \
             to continue from the stream tail, or resynchronize the topic from a snapshot"
        );
    }

    result.map_err(AppError::from)
}

/// Requests a graceful stop on SIGINT or SIGTERM.
async fn shutdown_on_signal(handle: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }

    handle.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::event::ResumeToken;

    #[test]
    fn test_exit_codes() {
        let config = AppError::Config(ConfigError::Empty {
            parameter: "TOPIC_ID",
        });
        assert_eq!(config.exit_code(), EXIT_CONFIG);

        let expired = AppError::Forwarder(ForwarderError::ResumeTokenExpired {
            token: ResumeToken::from_data("T999"),
            source: SourceError::ResumeTokenExpired {
                message: "history lost".to_string(),
                code: Some(286),
            },
        });
        assert_eq!(expired.exit_code(), EXIT_RESUME_TOKEN_EXPIRED);

        let store = AppError::Forwarder(ForwarderError::StoreUnreachable(
            CheckpointError::Connection("refused".to_string()),
        ));
        assert_eq!(store.exit_code(), EXIT_FATAL);

        let stream = AppError::Forwarder(ForwarderError::Stream(SourceError::Ended));
        assert_eq!(stream.exit_code(), EXIT_FATAL);

        let bad_source = AppError::Source(SourceError::Configuration("batch_size".to_string()));
        assert_eq!(bad_source.exit_code(), EXIT_CONFIG);

        let bad_uri = AppError::Store(CheckpointError::Configuration(
            "Invalid connection string".to_string(),
        ));
        assert_eq!(bad_uri.exit_code(), EXIT_CONFIG);

        let unreachable = AppError::Store(CheckpointError::Connection("refused".to_string()));
        assert_eq!(unreachable.exit_code(), EXIT_FATAL);
    }
}
