//! Concatenation of per-file outcomes into one [`UnifiedTable`].

use std::collections::BTreeMap;

use clap::ValueEnum;
use log::debug;
use serde::Serialize;

use crate::normalize::{CanonicalRecord, FailureKind, NormalizationFailure};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "snake_case")]
pub enum RecordOrder {
    /// File-discovery order, then row order within each file.
    #[default]
    Discovery,
    /// Stable sort by date; same-date records keep discovery order.
    Date,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    pub order: RecordOrder,
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub source_file: String,
    pub profile_id: Option<String>,
    pub encoding: Option<String>,
    pub encoding_uncertain: bool,
    pub delimiter: Option<String>,
    pub sha256: String,
    /// Data rows read, excluding the header.
    pub rows: usize,
    pub records: usize,
    pub failures: usize,
}

/// Everything one file contributed to the run.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub summary: FileSummary,
    pub records: Vec<CanonicalRecord>,
    pub failures: Vec<NormalizationFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub files: usize,
    pub records: usize,
    pub failures: usize,
    pub failures_by_reason: BTreeMap<FailureKind, usize>,
    pub encoding_uncertain: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UnifiedTable {
    pub records: Vec<CanonicalRecord>,
    pub failures: Vec<NormalizationFailure>,
    pub files: Vec<FileSummary>,
}

impl UnifiedTable {
    pub fn summary(&self) -> Summary {
        let mut failures_by_reason = BTreeMap::new();
        for failure in &self.failures {
            *failures_by_reason.entry(failure.kind()).or_insert(0) += 1;
        }
        Summary {
            files: self.files.len(),
            records: self.records.len(),
            failures: self.failures.len(),
            failures_by_reason,
            encoding_uncertain: self
                .files
                .iter()
                .filter(|file| file.encoding_uncertain)
                .map(|file| file.source_file.clone())
                .collect(),
        }
    }

    /// True when every data row of every file produced a record.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Incremental merger; outcomes must be pushed in discovery order.
#[derive(Debug, Default)]
pub struct Merger {
    options: MergeOptions,
    table: UnifiedTable,
}

impl Merger {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            table: UnifiedTable::default(),
        }
    }

    pub fn push(&mut self, outcome: FileOutcome) {
        debug!(
            "Merging {} record(s) and {} failure(s) from {}",
            outcome.records.len(),
            outcome.failures.len(),
            outcome.summary.source_file
        );
        self.table.records.extend(outcome.records);
        self.table.failures.extend(outcome.failures);
        self.table.files.push(outcome.summary);
    }

    pub fn finish(mut self) -> UnifiedTable {
        if self.options.order == RecordOrder::Date {
            self.table.records.sort_by_key(|record| record.date);
        }
        self.table
    }
}

pub fn merge<I>(outcomes: I, options: &MergeOptions) -> UnifiedTable
where
    I: IntoIterator<Item = FileOutcome>,
{
    let mut merger = Merger::new(*options);
    for outcome in outcomes {
        merger.push(outcome);
    }
    merger.finish()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::normalize::FailureReason;

    fn record(source: &str, line: u64, day: u32) -> CanonicalRecord {
        CanonicalRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            amount: Decimal::new(100, 2),
            currency: None,
            description: None,
            account_id: None,
            counterparty: None,
            transaction_type: None,
            source_file: source.to_string(),
            source_line: line,
        }
    }

    fn outcome(source: &str, records: Vec<CanonicalRecord>, failures: usize) -> FileOutcome {
        let failures = (0..failures)
            .map(|idx| NormalizationFailure {
                source_file: source.to_string(),
                line: Some(10 + idx as u64),
                raw: Vec::new(),
                reason: FailureReason::MalformedRow {
                    message: "bad".to_string(),
                },
            })
            .collect::<Vec<_>>();
        FileOutcome {
            summary: FileSummary {
                source_file: source.to_string(),
                profile_id: Some("p".to_string()),
                encoding: Some("UTF-8".to_string()),
                encoding_uncertain: source == "b.csv",
                delimiter: Some(",".to_string()),
                sha256: String::new(),
                rows: records.len() + failures.len(),
                records: records.len(),
                failures: failures.len(),
            },
            records,
            failures,
        }
    }

    #[test]
    fn keeps_discovery_order_and_every_failure() {
        let table = merge(
            vec![
                outcome("a.csv", vec![record("a.csv", 2, 9), record("a.csv", 3, 1)], 0),
                outcome("b.csv", vec![record("b.csv", 2, 5)], 2),
            ],
            &MergeOptions::default(),
        );
        let order = table
            .records
            .iter()
            .map(|r| (r.source_file.as_str(), r.source_line))
            .collect::<Vec<_>>();
        assert_eq!(order, vec![("a.csv", 2), ("a.csv", 3), ("b.csv", 2)]);
        assert!(!table.is_clean());

        let summary = table.summary();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.failures_by_reason[&FailureKind::MalformedRow], 2);
        assert_eq!(summary.encoding_uncertain, vec!["b.csv".to_string()]);
    }

    #[test]
    fn date_order_is_stable() {
        let table = merge(
            vec![
                outcome("a.csv", vec![record("a.csv", 2, 9), record("a.csv", 3, 5)], 0),
                outcome("b.csv", vec![record("b.csv", 2, 5), record("b.csv", 3, 1)], 0),
            ],
            &MergeOptions {
                order: RecordOrder::Date,
            },
        );
        let order = table
            .records
            .iter()
            .map(|r| (r.source_file.as_str(), r.source_line))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![("b.csv", 3), ("a.csv", 3), ("b.csv", 2), ("a.csv", 2)]
        );
        assert!(table.is_clean());
    }
}
