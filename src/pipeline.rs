//! Per-file processing and the multi-file driver.
//!
//! Each file runs sniff → match → normalize on its own bytes. Files are
//! independent, so the driver fans them out with rayon and collects the
//! outcomes back in input order before merging.

use log::{debug, info, warn};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::{
    error::UnifyError,
    io_utils,
    matcher::{MatchOutcome, match_header},
    merge::{self, FileOutcome, FileSummary, MergeOptions, UnifiedTable},
    normalize::{FailureReason, NormalizationFailure, RawRow, normalize},
    registry::ProfileRegistry,
    sniff::{self, SniffOptions},
};

/// One input file: a stable identity (usually its path) and its raw bytes.
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub identity: String,
    pub bytes: Vec<u8>,
}

impl SourceInput {
    pub fn new(identity: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            identity: identity.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UnifyOptions {
    pub sniff: SniffOptions,
    pub merge: MergeOptions,
    pub parallel: bool,
}

impl Default for UnifyOptions {
    fn default() -> Self {
        Self {
            sniff: SniffOptions::default(),
            merge: MergeOptions::default(),
            parallel: true,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Runs every input through the engine and merges the results.
pub fn unify(
    inputs: &[SourceInput],
    registry: &ProfileRegistry,
    options: &UnifyOptions,
) -> Result<UnifiedTable, UnifyError> {
    if inputs.is_empty() {
        return Err(UnifyError::NoInputs);
    }
    info!(
        "Unifying {} file(s) against {} profile(s){}",
        inputs.len(),
        registry.len(),
        if options.parallel { "" } else { " sequentially" }
    );
    let outcomes: Vec<FileOutcome> = if options.parallel {
        inputs
            .par_iter()
            .map(|input| process_source(input, registry, &options.sniff))
            .collect()
    } else {
        inputs
            .iter()
            .map(|input| process_source(input, registry, &options.sniff))
            .collect()
    };
    let table = merge::merge(outcomes, &options.merge);
    info!(
        "Produced {} record(s) with {} failure(s)",
        table.records.len(),
        table.failures.len()
    );
    Ok(table)
}

/// Processes one file. File-level problems become a single failure entry.
pub fn process_source(
    input: &SourceInput,
    registry: &ProfileRegistry,
    options: &SniffOptions,
) -> FileOutcome {
    let mut summary = FileSummary {
        source_file: input.identity.clone(),
        profile_id: None,
        encoding: None,
        encoding_uncertain: false,
        delimiter: None,
        sha256: sha256_hex(&input.bytes),
        rows: 0,
        records: 0,
        failures: 0,
    };
    let file_failure = |summary: FileSummary, failure: NormalizationFailure| {
        warn!("{failure}");
        FileOutcome {
            summary: FileSummary {
                failures: 1,
                ..summary
            },
            records: Vec::new(),
            failures: vec![failure],
        }
    };

    let sniffed = match sniff::sniff(&input.bytes, options) {
        Ok(sniffed) => sniffed,
        Err(err) => {
            let failure = NormalizationFailure {
                source_file: input.identity.clone(),
                line: None,
                raw: Vec::new(),
                reason: FailureReason::UnreadableFile {
                    message: err.to_string(),
                },
            };
            return file_failure(summary, failure);
        }
    };
    summary.encoding = Some(sniffed.encoding.name().to_string());
    summary.encoding_uncertain = sniffed.encoding_uncertain;
    summary.delimiter = Some(io_utils::printable_delimiter(sniffed.delimiter));
    if sniffed.encoding_uncertain {
        warn!(
            "{}: encoding is uncertain, decoded as {}",
            input.identity,
            sniffed.encoding.name()
        );
    }

    let mut reader = sniffed.reader();
    let (header, header_line) = match reader.headers() {
        Ok(record) => (
            record.iter().map(str::to_string).collect::<Vec<_>>(),
            record.position().map_or(1, |pos| pos.line()),
        ),
        Err(err) => {
            let failure = NormalizationFailure {
                source_file: input.identity.clone(),
                line: Some(1),
                raw: Vec::new(),
                reason: FailureReason::UnreadableFile {
                    message: err.to_string(),
                },
            };
            return file_failure(summary, failure);
        }
    };

    let matched = match match_header(&header, registry) {
        MatchOutcome::Matched(found) => found,
        MatchOutcome::NoMatch(no_match) => {
            let failure = NormalizationFailure {
                source_file: input.identity.clone(),
                line: Some(header_line),
                raw: no_match.header,
                reason: FailureReason::NoMatch {
                    candidates: no_match.candidates,
                },
            };
            return file_failure(summary, failure);
        }
    };
    info!(
        "{}: matched profile '{}' ({} of {} field(s) bound)",
        input.identity,
        matched.profile_id(),
        matched.resolved_count(),
        matched.profile.fields.len()
    );
    summary.profile_id = Some(matched.profile_id().to_string());

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for result in reader.records() {
        summary.rows += 1;
        let normalized = match result {
            Ok(record) => {
                let row = RawRow {
                    source: input.identity.clone(),
                    line: record.position().map_or(0, |pos| pos.line()),
                    fields: record.iter().map(str::to_string).collect(),
                };
                normalize(&row, &matched)
            }
            Err(err) => Err(NormalizationFailure {
                source_file: input.identity.clone(),
                line: err.position().map(|pos| pos.line()),
                raw: Vec::new(),
                reason: FailureReason::MalformedRow {
                    message: err.to_string(),
                },
            }),
        };
        match normalized {
            Ok(record) => records.push(record),
            Err(failure) => {
                debug!("{failure}");
                failures.push(failure);
            }
        }
    }

    summary.records = records.len();
    summary.failures = failures.len();
    info!(
        "{}: {} row(s), {} record(s), {} failure(s)",
        input.identity, summary.rows, summary.records, summary.failures
    );
    FileOutcome {
        summary,
        records,
        failures,
    }
}
