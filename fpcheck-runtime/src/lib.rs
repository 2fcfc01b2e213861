// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! This crate implements the runtime half of a floating-point checker: it
//! detects anomalous floating-point arithmetic (NaN, infinity, subnormal
//! results, catastrophic cancellation, unsafe equality comparison,
//! division by zero) inside instrumented programs and reports where in the
//! source each anomaly occurred.
//!
//! Architecturally, it consists of four parts:
//! 1. Pure bit-level classifiers ([`classify`]) that turn one arithmetic
//!    result (plus operands and operation kind) into a set of event flags.
//!    Stateless and referentially transparent.
//! 2. A concurrent aggregation table that deduplicates events
//!    per (file, line) source location and counts occurrences per kind.
//!    Guarded by a single coarse mutex: anomalies are rare on the hot path,
//!    and classification short-circuits before any locking when nothing is
//!    flagged, so the common case takes no lock and allocates nothing.
//! 3. An environment-driven trap policy that can escalate an
//!    observed event into an immediate SIGABRT (or a deliberate hang, to
//!    let an operator attach a debugger before the process dies). The trap
//!    runs after the table lock is released so an aborting thread cannot
//!    wedge the table for the others.
//! 4. A report exporter that serializes the table at program
//!    finalization into `.fpc_logs/fpc_<hostname>_<pid>.json`, the durable
//!    contract with downstream report-consuming tools.
//!
//! The compiler pass that decides which instructions to instrument, and
//! the shim that injects the instrumentation, live elsewhere; they drive
//! this runtime exclusively through [`init`], [`check_operation_f32`] /
//! [`check_operation_f64`], and [`finalize`]. The pass also synthesizes
//! the `condition_active` flag that suppresses results computed on
//! untaken control-flow paths; the runtime only honors it.

mod api;
pub mod classify;
mod configuration;
pub mod event;
mod report;
mod table;
mod trap;

pub use api::{
    check_operation_f32, check_operation_f64, finalize, init, init_with_config, Checker,
};
pub use classify::{Operation, DEFAULT_DANGER_ZONE};
pub use configuration::{CheckerConfig, ProgramMetadata};
pub use event::{EventCounts, EventKind, EventSet};
pub use report::DEFAULT_REPORT_DIR;
pub use table::{AggregationTable, EventRecord, SourceLocation, TableError, DEFAULT_BUCKET_COUNT};
pub use trap::{TrapAction, TrapConfig};
