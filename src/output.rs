//! Renderers for a finished [`UnifiedTable`]: canonical CSV, failure CSV,
//! JSON run report and the plain-text summary table.

use std::{borrow::Cow, fmt::Write as _};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    canonical,
    io_utils,
    merge::{FileSummary, Summary, UnifiedTable},
    normalize::NormalizationFailure,
};

pub const FAILURE_HEADERS: &[&str] = &["source_file", "line", "reason", "field", "detail", "raw"];

pub fn render_records(table: &UnifiedTable, delimiter: u8) -> Result<String> {
    let mut writer = io_utils::csv_buffer_writer(delimiter);
    writer
        .write_record(canonical::output_headers())
        .context("Writing output headers")?;
    for record in &table.records {
        writer
            .write_record(record.to_output_row())
            .with_context(|| {
                format!(
                    "Writing record from {}:{}",
                    record.source_file, record.source_line
                )
            })?;
    }
    io_utils::finish_csv_buffer(writer)
}

/// One row per failure. `raw` holds the original cells joined by the
/// output delimiter.
pub fn render_failures(failures: &[NormalizationFailure], delimiter: u8) -> Result<String> {
    let mut writer = io_utils::csv_buffer_writer(delimiter);
    writer
        .write_record(FAILURE_HEADERS)
        .context("Writing failure headers")?;
    let joiner = (delimiter as char).to_string();
    for failure in failures {
        writer
            .write_record([
                failure.source_file.clone(),
                failure.line.map(|line| line.to_string()).unwrap_or_default(),
                failure.kind().to_string(),
                failure
                    .reason
                    .field()
                    .map(|field| field.to_string())
                    .unwrap_or_default(),
                failure.reason.to_string(),
                failure.raw.join(&joiner),
            ])
            .with_context(|| format!("Writing failure for {}", failure.source_file))?;
    }
    io_utils::finish_csv_buffer(writer)
}

#[derive(Serialize)]
struct Report<'a> {
    summary: Summary,
    files: &'a [FileSummary],
    failures: &'a [NormalizationFailure],
}

pub fn render_report(table: &UnifiedTable) -> Result<String> {
    let report = Report {
        summary: table.summary(),
        files: &table.files,
        failures: &table.failures,
    };
    let mut json = serde_json::to_string_pretty(&report).context("Serializing run report")?;
    json.push('\n');
    Ok(json)
}

/// Per-file table followed by totals, for the terminal.
pub fn render_summary(table: &UnifiedTable) -> String {
    let headers = [
        "file", "profile", "encoding", "delimiter", "rows", "records", "failures",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect::<Vec<_>>();
    let rows = table
        .files
        .iter()
        .map(|file| {
            let encoding = match &file.encoding {
                Some(name) if file.encoding_uncertain => format!("{name}?"),
                Some(name) => name.clone(),
                None => "-".to_string(),
            };
            vec![
                file.source_file.clone(),
                file.profile_id.clone().unwrap_or_else(|| "-".to_string()),
                encoding,
                file.delimiter.clone().unwrap_or_else(|| "-".to_string()),
                file.rows.to_string(),
                file.records.to_string(),
                file.failures.to_string(),
            ]
        })
        .collect::<Vec<_>>();

    let mut output = render_table(&headers, &rows);
    let summary = table.summary();
    let _ = writeln!(
        output,
        "\n{} file(s), {} record(s), {} failure(s)",
        summary.files, summary.records, summary.failures
    );
    for (kind, count) in &summary.failures_by_reason {
        let _ = writeln!(output, "  {kind}: {count}");
    }
    if !summary.encoding_uncertain.is_empty() {
        let _ = writeln!(
            output,
            "encoding uncertain: {}",
            summary.encoding_uncertain.join(", ")
        );
    }
    output
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths
        .iter()
        .map(|w| "-".repeat((*w).max(3)))
        .collect::<Vec<_>>();
    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &separator_widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
