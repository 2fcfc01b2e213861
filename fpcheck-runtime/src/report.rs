// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::configuration::ProgramMetadata;
use crate::table::AggregationTable;
use anyhow::Context;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where reports land unless the checker is configured otherwise.
pub const DEFAULT_REPORT_DIR: &str = ".fpc_logs";

/// One exported record. The field order is the on-disk contract with
/// downstream report consumers; do not reorder.
#[derive(Serialize)]
struct ReportEntry<'a> {
    input: &'a str,
    file: &'a str,
    line: u64,
    infinity_pos: u64,
    infinity_neg: u64,
    nan: u64,
    division_zero: u64,
    cancellation: u64,
    comparison: u64,
    underflow: u64,
    latent_infinity_pos: u64,
    latent_infinity_neg: u64,
    latent_underflow: u64,
}

/// Builds the report filename for this process. The pid keeps processes on
/// one host apart; the hostname keeps hosts apart.
pub fn report_file_name() -> String {
    format!("fpc_{}_{}.json", fpcheck_common::hostname(), std::process::id())
}

/// Serializes the table to `<dir>/fpc_<hostname>_<pid>.json` as a JSON
/// array, one object per record. Creates `dir` if it is absent;
/// already-exists counts as success.
pub fn export(
    table: &AggregationTable,
    metadata: &ProgramMetadata,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating report directory {}", dir.display()))?;
    let path = dir.join(report_file_name());

    let input = metadata.input_string();
    let entries: Vec<ReportEntry<'_>> = table
        .iter()
        .map(|record| ReportEntry {
            input: &input,
            file: &record.location.file,
            line: record.location.line,
            infinity_pos: record.counts.infinity_pos,
            infinity_neg: record.counts.infinity_neg,
            nan: record.counts.nan,
            division_zero: record.counts.division_zero,
            cancellation: record.counts.cancellation,
            comparison: record.counts.comparison,
            underflow: record.counts.underflow,
            latent_infinity_pos: record.counts.latent_infinity_pos,
            latent_infinity_neg: record.counts.latent_infinity_neg,
            latent_underflow: record.counts.latent_underflow,
        })
        .collect();

    let file =
        File::create(&path).with_context(|| format!("creating report file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &entries).context("serializing report")?;
    writer
        .flush()
        .with_context(|| format!("writing report file {}", path.display()))?;
    Ok(path)
}
