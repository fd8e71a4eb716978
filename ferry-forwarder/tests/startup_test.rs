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

//! Startup tests for the `ferry` process that need no running services.

use clap::Parser;
use ferry_core::checkpoint::CheckpointError;
use ferry_forwarder::app::{self, AppError, EXIT_CONFIG};
use ferry_forwarder::config::{Args, ConfigError};

fn args(connection_string: &str, database: &str) -> Args {
    Args::try_parse_from([
        "ferry",
        "--connection-string",
        connection_string,
        "--database",
        database,
        "--collection",
        "movies",
        "--kafka-brokers",
        "127.0.0.1:1",
        "--topic-id",
        "movies-cdc",
    ])
    .expect("arguments parse")
}

#[tokio::test]
async fn test_empty_database_exits_with_config_code() {
    let err = app::run(args("mongodb://localhost:27017", " "))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Config(ConfigError::Empty {
            parameter: "DATABASE"
        })
    ));
    assert_eq!(err.exit_code(), EXIT_CONFIG);
}

#[tokio::test]
async fn test_unparseable_connection_string_is_config_error() {
    let err = app::run(args("http://localhost:27017", "sample_mflix"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, AppError::Store(CheckpointError::Configuration(_))),
        "unexpected error: {err:?}"
    );
    assert_eq!(err.exit_code(), EXIT_CONFIG);
}
