// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::classify::DEFAULT_DANGER_ZONE;
use crate::report::DEFAULT_REPORT_DIR;
use crate::table::DEFAULT_BUCKET_COUNT;
use std::path::PathBuf;

/// The invocation argument vector captured at init, stored for inclusion in
/// the exported report. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramMetadata {
    args: Vec<String>,
}

impl ProgramMetadata {
    pub fn new(args: Vec<String>) -> ProgramMetadata {
        ProgramMetadata { args }
    }

    /// The report's `input` field: every argument followed by a single
    /// trailing space.
    pub fn input_string(&self) -> String {
        let mut input = String::new();
        for arg in &self.args {
            input.push_str(arg);
            input.push(' ');
        }
        input
    }
}

/// Validated construction-time configuration for a checker.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerConfig {
    args: Vec<String>,
    bucket_count: usize,
    danger_zone: f64,
    report_dir: PathBuf,
}

impl Default for CheckerConfig {
    fn default() -> CheckerConfig {
        CheckerConfig {
            args: Vec::new(),
            bucket_count: DEFAULT_BUCKET_COUNT,
            danger_zone: DEFAULT_DANGER_ZONE,
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
        }
    }
}

impl CheckerConfig {
    pub fn new(
        args: Vec<String>,
        bucket_count: usize,
        danger_zone: f64,
        report_dir: PathBuf,
    ) -> anyhow::Result<CheckerConfig> {
        anyhow::ensure!(
            bucket_count >= 1,
            "aggregation table needs at least 1 bucket, got {bucket_count}"
        );
        anyhow::ensure!(
            (0.0..1.0).contains(&danger_zone),
            "danger zone must be a fraction in [0, 1), got {danger_zone}"
        );
        Ok(CheckerConfig {
            args,
            bucket_count,
            danger_zone,
            report_dir,
        })
    }

    /// Default configuration with the given invocation arguments; what
    /// `init` uses.
    pub fn with_args(args: Vec<String>) -> CheckerConfig {
        CheckerConfig {
            args,
            ..Default::default()
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn danger_zone(&self) -> f64 {
        self.danger_zone
    }

    pub fn report_dir(&self) -> &PathBuf {
        &self.report_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let bad_buckets = CheckerConfig::new(vec![], 0, DEFAULT_DANGER_ZONE, "/tmp".into());
        assert!(bad_buckets.is_err());
        let bad_zone = CheckerConfig::new(vec![], 10, 1.5, "/tmp".into());
        assert!(bad_zone.is_err());
        let negative_zone = CheckerConfig::new(vec![], 10, -0.1, "/tmp".into());
        assert!(negative_zone.is_err());
        let ok = CheckerConfig::new(vec![], 10, 0.1, "/tmp".into());
        assert!(ok.is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = CheckerConfig::default();
        assert_eq!(config.bucket_count(), DEFAULT_BUCKET_COUNT);
        assert_eq!(config.danger_zone(), DEFAULT_DANGER_ZONE);
        assert_eq!(config.report_dir(), &PathBuf::from(DEFAULT_REPORT_DIR));
    }

    #[test]
    fn test_input_string_trailing_spaces() {
        let metadata = ProgramMetadata::new(vec!["./sim".to_string(), "-n".to_string()]);
        assert_eq!(metadata.input_string(), "./sim -n ");
        assert_eq!(ProgramMetadata::default().input_string(), "");
    }
}
