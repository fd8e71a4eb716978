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

//! Logging and metrics bootstrap.

use crate::config::LogFormat;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`].
pub fn init_logging(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .flatten_event(true)
            .init(),
    }
}

/// Starts the Prometheus scrape endpoint and registers metric descriptions.
///
/// Without an address the descriptions are still registered; the `metrics`
/// facade then discards every sample.
///
/// # Errors
///
/// Returns an error if the HTTP listener cannot be installed.
pub fn init_metrics(addr: Option<SocketAddr>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    if let Some(addr) = addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "Prometheus metrics available at http://{}/metrics", addr);
    }

    ferry_core::metrics::init_metrics();
    Ok(())
}
