use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{discovery::DEFAULT_EXTENSIONS, merge::RecordOrder};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile bank CSV exports into one canonical table",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize and merge input files into the canonical schema
    Unify(UnifyArgs),
    /// Validate a profile configuration and list its profiles
    Profiles(ProfilesArgs),
    /// Report which profile each input file matches, with candidate scores
    Match(MatchArgs),
}

/// Options shared by every command that reads input files.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Profile configuration: a YAML file or a directory of YAML files
    #[arg(short = 'p', long = "profiles")]
    pub profiles: PathBuf,
    /// Input files or directories (`-` reads stdin)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
    /// File extensions picked up when walking directories
    #[arg(
        long = "extensions",
        value_delimiter = ',',
        default_values_t = DEFAULT_EXTENSIONS.iter().map(ToString::to_string)
    )]
    pub extensions: Vec<String>,
    /// Input delimiter override (supports ',', 'tab', ';', '|'); detected when omitted
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Quote character override; detected when omitted
    #[arg(long, value_parser = parse_quote)]
    pub quote: Option<u8>,
    /// Character encoding of inputs without a byte-order mark (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct UnifyArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Write every failure to this CSV file
    #[arg(long = "failures")]
    pub failures: Option<PathBuf>,
    /// Write a JSON run report (summary, per-file details, failures)
    #[arg(long = "report")]
    pub report: Option<PathBuf>,
    /// Record order in the output
    #[arg(long = "order", value_enum, default_value = "discovery")]
    pub order: RecordOrder,
    /// Delimiter to use for output files
    #[arg(long = "output-delimiter", value_parser = parse_delimiter, default_value = ",")]
    pub output_delimiter: u8,
    /// Character encoding for the output file/stdout (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Process files one at a time instead of in parallel
    #[arg(long = "sequential")]
    pub sequential: bool,
}

#[derive(Debug, Args)]
pub struct ProfilesArgs {
    /// Profile configuration: a YAML file or a directory of YAML files
    #[arg(short = 'p', long = "profiles")]
    pub profiles: PathBuf,
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => single_ascii(other, "Delimiter"),
    }
}

pub fn parse_quote(value: &str) -> Result<u8, String> {
    match value {
        "double" => Ok(b'"'),
        "single" => Ok(b'\''),
        other => single_ascii(other, "Quote"),
    }
}

fn single_ascii(value: &str, what: &str) -> Result<u8, String> {
    let mut chars = value.chars();
    let first = chars
        .next()
        .ok_or_else(|| format!("{what} cannot be empty"))?;
    if chars.next().is_some() {
        return Err(format!("{what} must be a single character"));
    }
    if !first.is_ascii() {
        return Err(format!("{what} must be ASCII"));
    }
    Ok(first as u8)
}
