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

//! The `ferry` forwarder process.
//!
//! Reads its configuration from flags or environment variables, connects the
//! `MongoDB` change source, the `MongoDB` checkpoint store and the Kafka
//! publisher, and runs the forwarding loop until SIGINT/SIGTERM or a fatal
//! error.
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Graceful shutdown |
//! | 1 | Fatal runtime error (store unreachable, open failure, stream error) |
//! | 2 | Missing or invalid configuration |
//! | 3 | Stored resume token expired; operator action required |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod app;
pub mod config;
pub mod telemetry;
