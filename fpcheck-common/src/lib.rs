// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Small helpers shared by the floating-point checker crates: environment
//! parsing and host identification. Kept separate from the runtime so the
//! hot checking path depends on as little as possible.

pub mod config;

/// Returns the machine hostname, or `"node-unknown"` when it cannot be
/// determined. Report filenames embed this value, so it must always yield
/// something usable.
pub fn hostname() -> String {
    sys_info::hostname().unwrap_or_else(|_| "node-unknown".to_string())
}
