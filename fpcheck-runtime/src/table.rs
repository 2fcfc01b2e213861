// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::event::{EventCounts, EventSet};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Default number of buckets. The table never resizes; chains grow with the
/// number of distinct call sites, which is bounded by the instrumented
/// program's source size rather than its runtime.
pub const DEFAULT_BUCKET_COUNT: usize = 1000;

/// The (file, line) pair identifying where an event was observed. Two
/// locations are equal iff their file paths compare equal by content:
/// distinct string objects naming the same path must aggregate together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: u64,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u64) -> SourceLocation {
        SourceLocation {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Accumulated per-kind counts for one source location. Created on the
/// first flagged event at that location, mutated by summation, never
/// deleted before export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub location: SourceLocation,
    pub counts: EventCounts,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("aggregation table needs at least 1 bucket, got {0}")]
    InvalidBucketCount(usize),
}

/// Associative store mapping a source location to exactly one
/// [`EventRecord`], merging repeated observations by summation.
///
/// The table itself is not synchronized; the owning checker wraps it in a
/// single coarse mutex. Anomalies are rare on the hot path (classification
/// short-circuits before any locking), so the table is never
/// throughput-critical.
#[derive(Debug)]
pub struct AggregationTable {
    buckets: Vec<Vec<EventRecord>>,
    distinct: u64,
}

impl AggregationTable {
    pub fn new(bucket_count: usize) -> Result<AggregationTable, TableError> {
        if bucket_count < 1 {
            return Err(TableError::InvalidBucketCount(bucket_count));
        }
        Ok(AggregationTable {
            buckets: vec![Vec::new(); bucket_count],
            distinct: 0,
        })
    }

    /// Finds or creates the record for `(file, line)` and adds 1 to each
    /// counter whose flag is set. The sole mutator of the table.
    ///
    /// `file` is only copied when a new record is inserted; lookups borrow.
    pub fn merge(&mut self, file: &str, line: u64, flags: EventSet) {
        let index = self.bucket_index(file, line);
        let chain = &mut self.buckets[index];
        if let Some(record) = chain
            .iter_mut()
            .find(|r| r.location.line == line && r.location.file == file)
        {
            record.counts.add(flags);
        } else {
            chain.push(EventRecord {
                location: SourceLocation::new(file, line),
                counts: EventCounts::seeded(flags),
            });
            self.distinct += 1;
        }
    }

    /// Number of distinct source locations ever merged.
    pub fn len(&self) -> u64 {
        self.distinct
    }

    pub fn is_empty(&self) -> bool {
        self.distinct == 0
    }

    /// All records, in an order that is unspecified but stable for a given
    /// run.
    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.buckets.iter().flatten()
    }

    fn bucket_index(&self, file: &str, line: u64) -> usize {
        // str and String hash identically, so borrowed lookups and owned
        // keys land in the same bucket.
        let mut hasher = DefaultHasher::new();
        file.hash(&mut hasher);
        line.hash(&mut hasher);
        (hasher.finish() % self.buckets.len() as u64) as usize
    }
}
