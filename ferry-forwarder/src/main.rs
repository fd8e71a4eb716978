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

use clap::Parser;
use ferry_forwarder::app::{self, EXIT_OK};
use ferry_forwarder::config::Args;
use ferry_forwarder::telemetry;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    telemetry::init_logging(args.log_format);

    match app::run(args).await {
        Ok(()) => {
            info!("ferry stopped");
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "ferry stopped with an error");
            ExitCode::from(e.exit_code())
        }
    }
}
