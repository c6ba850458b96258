//! I/O helpers shared by the sniffer, the pipeline and the CLI.
//!
//! - **Readers**: every CSV reader is built through [`open_csv_reader`] so
//!   dialect handling (delimiter, quote, flexible widths) stays consistent.
//! - **Encoding**: labels resolve through `encoding_rs`; output text is
//!   transcoded in one pass from UTF-8 when another encoding is requested.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.
//! - **Quoting**: CSV output uses `QuoteStyle::Always`.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    label
        .map(|value| {
            Encoding::for_label(value.trim().as_bytes())
                .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
        })
        .transpose()
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, quote: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .quote(quote)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

/// In-memory CSV writer; callers hand the finished buffer to [`write_output`].
pub fn csv_buffer_writer(delimiter: u8) -> csv::Writer<Vec<u8>> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true);
    builder.from_writer(Vec::new())
}

pub fn finish_csv_buffer(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("Flushing CSV buffer: {}", err.error()))?;
    String::from_utf8(bytes).context("CSV buffer is not valid UTF-8")
}

/// Reads a whole input file, or stdin for `-`.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    if is_dash(path) {
        let mut buf = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("Reading stdin")?;
        return Ok(buf);
    }
    fs::read(path).with_context(|| format!("Opening input file {path:?}"))
}

/// Writes UTF-8 text to a file (or stdout for `None`/`-`), transcoding when
/// `encoding` is not UTF-8.
pub fn write_output(path: Option<&Path>, text: &str, encoding: &'static Encoding) -> Result<()> {
    let bytes = encode_text(text, encoding)?;
    let mut sink: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(io::stdout().lock()),
    };
    sink.write_all(&bytes).context("Writing output")?;
    sink.flush().context("Flushing output")
}

fn encode_text(text: &str, encoding: &'static Encoding) -> Result<Vec<u8>> {
    if encoding == UTF_8 {
        return Ok(text.as_bytes().to_vec());
    }
    let (encoded, output_encoding, had_errors) = encoding.encode(text);
    if had_errors {
        bail!("Failed to encode output using {}", encoding.name());
    }
    if output_encoding != encoding {
        bail!(
            "Encoding {} is decode-only; output would be written as {}",
            encoding.name(),
            output_encoding.name()
        );
    }
    Ok(encoded.into_owned())
}
