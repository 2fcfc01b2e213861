// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::classify::{classify, FloatBits, Operation};
use crate::configuration::{CheckerConfig, ProgramMetadata};
use crate::report;
use crate::table::AggregationTable;
use crate::trap::TrapConfig;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};

/// One instance of the anomaly-detection engine: the mutex-guarded
/// aggregation table plus the immutable trap configuration and program
/// metadata. An explicit object rather than module globals so tests can run
/// independent instances side by side; instrumented processes go through
/// the process-wide handle below.
pub struct Checker {
    table: Mutex<AggregationTable>,
    trap: TrapConfig,
    metadata: ProgramMetadata,
    danger_zone: f64,
    report_dir: PathBuf,
}

impl Checker {
    /// Builds a checker with the trap configuration snapshotted from the
    /// process environment.
    pub fn new(config: CheckerConfig) -> anyhow::Result<Checker> {
        Self::with_trap(config, TrapConfig::from_env())
    }

    /// Builds a checker with an explicit trap configuration. Tests use this
    /// to stay independent of the process environment.
    pub fn with_trap(config: CheckerConfig, trap: TrapConfig) -> anyhow::Result<Checker> {
        let table = AggregationTable::new(config.bucket_count())?;
        Ok(Checker {
            table: Mutex::new(table),
            trap,
            metadata: ProgramMetadata::new(config.args().to_vec()),
            danger_zone: config.danger_zone(),
            report_dir: config.report_dir().clone(),
        })
    }

    /// Checks one monitored 32-bit operation. See [`Checker::check_f64`].
    pub fn check_f32(
        &self,
        result: f32,
        op1: f32,
        op2: f32,
        file: &str,
        line: u64,
        op: Operation,
        condition_active: bool,
    ) {
        self.check(result, op1, op2, file, line, op, condition_active)
    }

    /// Checks one monitored 64-bit operation: classify, aggregate, then
    /// possibly trap.
    ///
    /// `condition_active` is supplied by the instrumenting layer; when false
    /// the operation was computed on a control-flow path not actually taken
    /// (branchless lowering) and the call returns with no side effects.
    ///
    /// ATOMICITY:
    ///     The merge into the table is indivisible with respect to
    ///     concurrent callers. The trap decision runs after the table lock
    ///     is released, so a trapping thread cannot wedge the table for
    ///     threads that have not trapped.
    pub fn check_f64(
        &self,
        result: f64,
        op1: f64,
        op2: f64,
        file: &str,
        line: u64,
        op: Operation,
        condition_active: bool,
    ) {
        self.check(result, op1, op2, file, line, op, condition_active)
    }

    fn check<F: FloatBits>(
        &self,
        result: F,
        op1: F,
        op2: F,
        file: &str,
        line: u64,
        op: Operation,
        condition_active: bool,
    ) {
        if !condition_active {
            return;
        }
        let flags = classify(result, op1, op2, op, self.danger_zone);
        if flags.is_empty() {
            // Fast path: no lock, no allocation.
            return;
        }
        {
            let mut table = self
                .table
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            table.merge(file, line, flags);
        }
        if let Some((kind, _action)) = self.trap.should_trap(file, line, flags) {
            self.trap.execute(kind, file, line);
        }
    }

    /// Number of distinct source locations observed so far.
    pub fn distinct_locations(&self) -> u64 {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Writes the report for everything observed so far and returns its
    /// path. Intended to run after instrumented execution has quiesced.
    pub fn export(&self) -> anyhow::Result<PathBuf> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        report::export(&table, &self.metadata, &self.report_dir)
    }
}

/// Process-wide checker, constructed once by [`init`].
static CHECKER: OnceLock<Checker> = OnceLock::new();

/// Initializes the process-wide checker with the host program's invocation
/// arguments. Called once at the start of the program's entry function by
/// the instrumentation layer.
///
/// Construction failure is fatal: the runtime's correctness depends on the
/// table existing, so there is no degraded mode.
pub fn init(args: Vec<String>) {
    init_with_config(CheckerConfig::with_args(args))
}

/// [`init`] with explicit configuration (bucket count, danger zone, report
/// directory).
pub fn init_with_config(config: CheckerConfig) {
    let checker = match Checker::new(config) {
        Ok(checker) => checker,
        Err(err) => {
            eprintln!("#FPCHECKER: failed to initialize: {err:#}");
            std::process::exit(1);
        }
    };
    if CHECKER.set(checker).is_err() {
        tracing::warn!("checker already initialized, ignoring duplicate init");
    }
}

/// Entry point for one monitored 32-bit arithmetic instruction. A no-op
/// before [`init`].
pub fn check_operation_f32(
    result: f32,
    op1: f32,
    op2: f32,
    file: &str,
    line: u64,
    op: Operation,
    condition_active: bool,
) {
    if let Some(checker) = CHECKER.get() {
        checker.check_f32(result, op1, op2, file, line, op, condition_active);
    }
}

/// Entry point for one monitored 64-bit arithmetic instruction. A no-op
/// before [`init`].
pub fn check_operation_f64(
    result: f64,
    op1: f64,
    op2: f64,
    file: &str,
    line: u64,
    op: Operation,
    condition_active: bool,
) {
    if let Some(checker) = CHECKER.get() {
        checker.check_f64(result, op1, op2, file, line, op, condition_active);
    }
}

/// Exports the report for the process-wide checker. Called at each exit
/// point of the host program's entry function; export failures degrade to a
/// warning because losing a report is less harmful than crashing a
/// long-running monitored application.
pub fn finalize() {
    let Some(checker) = CHECKER.get() else {
        tracing::warn!("finalize called before init");
        return;
    };
    match checker.export() {
        Ok(path) => {
            tracing::info!(
                locations = checker.distinct_locations(),
                "wrote floating-point anomaly report to {}",
                path.display()
            );
        }
        Err(err) => {
            tracing::warn!("failed to write floating-point anomaly report: {err:#}");
        }
    }
}
