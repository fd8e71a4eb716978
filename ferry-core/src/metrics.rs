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

//! Metrics instrumentation for the forwarder.
//!
//! Recording goes through the `metrics` facade. Without an installed recorder
//! every call is a no-op, so the forwarder can record unconditionally and the
//! binary decides whether to export (see `METRICS_ADDR`).
//!
//! # Naming Conventions
//!
//! - Prefix with `ferry_`
//! - Counters end with `_total`
//! - Units as suffix (`_seconds`, `_bytes`)
//!
//! # Labels
//!
//! Only low-cardinality values are used as labels:
//! - **operation**: `insert`, `update`, `delete`, `replace`, ...
//! - **publisher**: transport name, e.g. `kafka`
//! - **reason**: skip reason
//! - **error_type**: error category
//!
//! Never label with document ids or resume tokens.
//!
//! # Example
//!
//! ```rust
//! use ferry_core::metrics;
//!
//! metrics::init_metrics();
//! metrics::increment_events_received("insert");
//! metrics::increment_events_published("kafka", "insert");
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric name prefix for all Ferry metrics.
#[doc(hidden)]
pub const METRIC_PREFIX: &str = "ferry";

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Change notifications pulled from the source.
///
/// Type: Counter
/// Labels: operation
#[doc(hidden)]
pub const EVENTS_RECEIVED_TOTAL: &str = "ferry_events_received_total";

/// Messages confirmed by the publisher.
///
/// Type: Counter
/// Labels: publisher, operation
#[doc(hidden)]
pub const EVENTS_PUBLISHED_TOTAL: &str = "ferry_events_published_total";

/// Notifications that produced no message.
///
/// Type: Counter
/// Labels: reason
#[doc(hidden)]
pub const EVENTS_SKIPPED_TOTAL: &str = "ferry_events_skipped_total";

/// Messages dropped after the publisher gave up on them.
///
/// Type: Counter
/// Labels: publisher, error_type
const PUBLISH_FAILURES_TOTAL: &str = "ferry_publish_failures_total";

/// Publish retry attempts.
///
/// Type: Counter
/// Labels: error_type
const PUBLISH_RETRIES_TOTAL: &str = "ferry_publish_retries_total";

/// Checkpoint writes that failed.
///
/// Type: Counter
const CHECKPOINT_FAILURES_TOTAL: &str = "ferry_checkpoint_failures_total";

/// Checkpoint writes that succeeded.
///
/// Type: Counter
const CHECKPOINTS_SAVED_TOTAL: &str = "ferry_checkpoints_saved_total";

/// Size of published payloads.
///
/// Type: Histogram
/// Labels: publisher
/// Unit: bytes
const PAYLOAD_BYTES: &str = "ferry_payload_bytes";

/// Time from handing a message to the publisher until it resolves, retries included.
///
/// Type: Histogram
/// Labels: publisher
/// Unit: seconds
const PUBLISH_DURATION_SECONDS: &str = "ferry_publish_duration_seconds";

/// Current forwarder state (see [`ForwarderStatus`]).
///
/// Type: Gauge
const FORWARDER_STATUS: &str = "ferry_forwarder_status";

// ============================================================================
// Initialization
// ============================================================================

/// Registers metric descriptions with the installed recorder.
///
/// Call once at startup, after installing an exporter.
pub fn init_metrics() {
    describe_counter!(
        EVENTS_RECEIVED_TOTAL,
        "Total number of change notifications received from the source"
    );

    describe_counter!(
        EVENTS_PUBLISHED_TOTAL,
        "Total number of messages confirmed by the publisher"
    );

    describe_counter!(
        EVENTS_SKIPPED_TOTAL,
        "Total number of change notifications that produced no message"
    );

    describe_counter!(
        PUBLISH_FAILURES_TOTAL,
        "Total number of messages dropped after publishing failed"
    );

    describe_counter!(
        PUBLISH_RETRIES_TOTAL,
        "Total number of publish retry attempts"
    );

    describe_counter!(
        CHECKPOINT_FAILURES_TOTAL,
        "Total number of failed checkpoint writes"
    );

    describe_counter!(
        CHECKPOINTS_SAVED_TOTAL,
        "Total number of successful checkpoint writes"
    );

    describe_histogram!(
        PAYLOAD_BYTES,
        metrics::Unit::Bytes,
        "Size of published message payloads"
    );

    describe_histogram!(
        PUBLISH_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time taken to publish one message, including retries"
    );

    describe_gauge!(
        FORWARDER_STATUS,
        "Current forwarder status: 0=stopped, 1=streaming, 2=error"
    );
}

// ============================================================================
// Counter Metrics
// ============================================================================

/// Increments the count of received change notifications.
pub fn increment_events_received(operation: &str) {
    counter!(EVENTS_RECEIVED_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Increments the count of confirmed messages.
pub fn increment_events_published(publisher: &str, operation: &str) {
    counter!(
        EVENTS_PUBLISHED_TOTAL,
        "publisher" => publisher.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Increments the count of skipped notifications.
///
/// `reason` must come from a fixed set, such as `SkipReason::as_str`.
pub fn increment_events_skipped(reason: &'static str) {
    counter!(EVENTS_SKIPPED_TOTAL, "reason" => reason).increment(1);
}

/// Increments the count of dropped messages.
pub fn increment_publish_failures(publisher: &str, error_type: &'static str) {
    counter!(
        PUBLISH_FAILURES_TOTAL,
        "publisher" => publisher.to_string(),
        "error_type" => error_type
    )
    .increment(1);
}

/// Increments the count of publish retries.
pub fn increment_publish_retries(error_type: &'static str) {
    counter!(PUBLISH_RETRIES_TOTAL, "error_type" => error_type).increment(1);
}

/// Increments the count of failed checkpoint writes.
pub fn increment_checkpoint_failures() {
    counter!(CHECKPOINT_FAILURES_TOTAL).increment(1);
}

/// Increments the count of successful checkpoint writes.
pub fn increment_checkpoints_saved() {
    counter!(CHECKPOINTS_SAVED_TOTAL).increment(1);
}

// ============================================================================
// Histogram Metrics
// ============================================================================

/// Records the size of a published payload.
#[allow(clippy::cast_precision_loss)]
pub fn record_payload_bytes(bytes: usize, publisher: &str) {
    histogram!(PAYLOAD_BYTES, "publisher" => publisher.to_string()).record(bytes as f64);
}

/// Records how long one publish took to resolve.
pub fn record_publish_duration(duration: Duration, publisher: &str) {
    histogram!(PUBLISH_DURATION_SECONDS, "publisher" => publisher.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Gauge Metrics
// ============================================================================

/// Sets the forwarder status gauge.
pub fn set_forwarder_status(status: ForwarderStatus) {
    gauge!(FORWARDER_STATUS).set(f64::from(status as u8));
}

/// Forwarder status for the `ferry_forwarder_status` gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ForwarderStatus {
    /// Not running.
    Stopped = 0,
    /// Consuming the change stream.
    Streaming = 1,
    /// Stopped on a fatal error.
    Error = 2,
}
