//! Encoding and dialect detection for raw input bytes.
//!
//! The sniffer turns the bytes of one export file into UTF-8 text and picks
//! the delimiter and quote character used to split it:
//!
//! - **Encoding**: a byte-order mark wins, then the operator's hint, then
//!   UTF-8. Invalid sequences trigger a permissive fallback (windows-1252 for
//!   assumed UTF-8, replacement characters otherwise) and mark the file
//!   `encoding_uncertain`.
//! - **Delimiter**: candidates are scored by how uniformly they split the
//!   sampled records against the header width.
//! - **Quote**: `"` unless fields are only ever opened with `'`.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log::debug;

use crate::{error::UnreadableFileError, io_utils};

pub const CANDIDATE_DELIMITERS: &[u8] = b",;\t|";
const DIALECT_SAMPLE_RECORDS: usize = 50;
const DOUBLE_QUOTE: u8 = b'"';
const SINGLE_QUOTE: u8 = b'\'';

/// Operator-supplied overrides. Every `None` means "detect".
#[derive(Debug, Clone, Copy, Default)]
pub struct SniffOptions {
    pub delimiter: Option<u8>,
    pub quote: Option<u8>,
    pub encoding: Option<&'static Encoding>,
}

#[derive(Debug, Clone)]
pub struct SniffedText {
    pub text: String,
    pub encoding: &'static Encoding,
    pub encoding_uncertain: bool,
    pub delimiter: u8,
    pub quote: u8,
}

impl SniffedText {
    /// A reader over the decoded text configured for the detected dialect.
    pub fn reader(&self) -> csv::Reader<&[u8]> {
        io_utils::open_csv_reader(self.text.as_bytes(), self.delimiter, self.quote, true)
    }
}

pub fn sniff(bytes: &[u8], options: &SniffOptions) -> Result<SniffedText, UnreadableFileError> {
    let (text, encoding, encoding_uncertain) = decode(bytes, options.encoding);
    if text.trim().is_empty() {
        return Err(UnreadableFileError::Empty);
    }

    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(&text, options.quote.unwrap_or(DOUBLE_QUOTE)));
    let quote = options
        .quote
        .unwrap_or_else(|| detect_quote(&text, delimiter));
    debug!(
        "Sniffed encoding {} (uncertain: {encoding_uncertain}), delimiter '{}', quote '{}'",
        encoding.name(),
        io_utils::printable_delimiter(delimiter),
        quote as char
    );

    let sniffed = SniffedText {
        text: text.into_owned(),
        encoding,
        encoding_uncertain,
        delimiter,
        quote,
    };
    ensure_header(&sniffed)?;
    Ok(sniffed)
}

fn decode<'a>(
    bytes: &'a [u8],
    hint: Option<&'static Encoding>,
) -> (Cow<'a, str>, &'static Encoding, bool) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (text, encoding, had_errors);
    }

    let encoding = hint.unwrap_or(UTF_8);
    if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
        return (text, encoding, false);
    }
    if encoding == UTF_8 {
        let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
        (text, WINDOWS_1252, true)
    } else {
        let (text, _) = encoding.decode_without_bom_handling(bytes);
        (text, encoding, true)
    }
}

fn detect_delimiter(text: &str, quote: u8) -> u8 {
    let mut best: Option<(u8, f64, usize)> = None;
    for &candidate in CANDIDATE_DELIMITERS {
        let Some((uniformity, width)) = score_delimiter(text, candidate, quote) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((_, best_uniformity, best_width)) => {
                uniformity > best_uniformity
                    || (uniformity == best_uniformity && width > best_width)
            }
        };
        if better {
            best = Some((candidate, uniformity, width));
        }
    }
    best.map(|(delimiter, _, _)| delimiter)
        .unwrap_or(io_utils::DEFAULT_CSV_DELIMITER)
}

/// Fraction of sampled records whose width equals the header width, and the
/// header width. `None` when the candidate does not split the header.
fn score_delimiter(text: &str, delimiter: u8, quote: u8) -> Option<(f64, usize)> {
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter, quote, false);
    let mut records = reader.records();
    let width = records.next()?.ok()?.len();
    if width < 2 {
        return None;
    }
    let mut sampled = 0usize;
    let mut uniform = 0usize;
    for record in records.take(DIALECT_SAMPLE_RECORDS) {
        sampled += 1;
        if record.is_ok_and(|r| r.len() == width) {
            uniform += 1;
        }
    }
    let uniformity = if sampled == 0 {
        1.0
    } else {
        uniform as f64 / sampled as f64
    };
    Some((uniformity, width))
}

fn detect_quote(text: &str, delimiter: u8) -> u8 {
    let double = field_openings(text, delimiter, DOUBLE_QUOTE);
    let single = field_openings(text, delimiter, SINGLE_QUOTE);
    if double == 0 && single > 0 {
        SINGLE_QUOTE
    } else {
        DOUBLE_QUOTE
    }
}

/// Counts fields that start with `quote` (at line start or after a delimiter).
fn field_openings(text: &str, delimiter: u8, quote: u8) -> usize {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|&(idx, &byte)| {
            byte == quote
                && (idx == 0
                    || matches!(bytes[idx - 1], b'\n' | b'\r')
                    || bytes[idx - 1] == delimiter)
        })
        .count()
}

fn ensure_header(sniffed: &SniffedText) -> Result<(), UnreadableFileError> {
    let mut reader = sniffed.reader();
    let headers = reader
        .headers()
        .map_err(|err| UnreadableFileError::HeaderParse {
            message: err.to_string(),
        })?;
    if headers.iter().all(|h| h.trim().trim_start_matches('\u{feff}').is_empty()) {
        return Err(UnreadableFileError::NoHeader);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::UTF_16LE;

    fn sniff_default(bytes: &[u8]) -> SniffedText {
        sniff(bytes, &SniffOptions::default()).expect("sniff")
    }

    #[test]
    fn detects_semicolon_and_tab_delimiters() {
        let semicolon = sniff_default(b"Datum;Betrag;Text\n01.02.2024;-12,50;Miete\n");
        assert_eq!(semicolon.delimiter, b';');

        let tab = sniff_default(b"date\tamount\n2024-01-01\t1,5\n");
        assert_eq!(tab.delimiter, b'\t');
    }

    #[test]
    fn quoted_commas_do_not_confuse_delimiter_detection() {
        let sniffed =
            sniff_default(b"date;memo;amount\n2024-01-01;\"a,b,c,d\";1\n2024-01-02;x;2\n");
        assert_eq!(sniffed.delimiter, b';');
        assert_eq!(sniffed.quote, b'"');
    }

    #[test]
    fn single_quotes_detected_when_double_quotes_absent() {
        let sniffed = sniff_default(b"date,memo\n2024-01-01,'rent, march'\n");
        assert_eq!(sniffed.quote, b'\'');
    }

    #[test]
    fn hints_override_detection() {
        let options = SniffOptions {
            delimiter: Some(b'|'),
            ..SniffOptions::default()
        };
        let sniffed = sniff(b"a,b\n1,2\n", &options).expect("sniff");
        assert_eq!(sniffed.delimiter, b'|');
    }

    #[test]
    fn invalid_utf8_falls_back_and_flags_uncertain() {
        let bytes = b"date,memo\n2024-01-01,Caf\xe9\n";
        let sniffed = sniff_default(bytes);
        assert!(sniffed.encoding_uncertain);
        assert_eq!(sniffed.encoding, WINDOWS_1252);
        assert!(sniffed.text.contains("Café"));
    }

    #[test]
    fn byte_order_mark_selects_encoding() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "date,amount\n2024-01-01,1\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let sniffed = sniff_default(&bytes);
        assert_eq!(sniffed.encoding, UTF_16LE);
        assert!(!sniffed.encoding_uncertain);
        assert!(sniffed.text.starts_with("date,amount"));
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let sniffed = sniff_default(b"\xEF\xBB\xBFdate,amount\n2024-01-01,1\n");
        assert_eq!(sniffed.encoding, UTF_8);
        assert!(sniffed.text.starts_with("date"));
    }

    #[test]
    fn empty_and_headerless_files_are_unreadable() {
        assert_eq!(
            sniff(b"", &SniffOptions::default()).unwrap_err(),
            UnreadableFileError::Empty
        );
        assert_eq!(
            sniff(b"  \n\n", &SniffOptions::default()).unwrap_err(),
            UnreadableFileError::Empty
        );
        assert_eq!(
            sniff(b" , ,\n1,2,3\n", &SniffOptions::default()).unwrap_err(),
            UnreadableFileError::NoHeader
        );
    }
}
