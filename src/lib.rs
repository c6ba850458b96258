pub mod canonical;
pub mod cli;
pub mod data;
pub mod discovery;
pub mod error;
pub mod io_utils;
pub mod matcher;
pub mod merge;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod registry;
pub mod sniff;

use std::{env, path::Path, process::ExitCode, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use encoding_rs::UTF_8;
use log::{LevelFilter, info, warn};

use crate::{
    cli::{Cli, Commands, InputArgs},
    matcher::{MatchOutcome, match_header},
    merge::MergeOptions,
    pipeline::{SourceInput, UnifyOptions},
    registry::ProfileRegistry,
    sniff::SniffOptions,
};

/// Exit status when the run completed but some rows or files failed.
pub const EXIT_WITH_FAILURES: u8 = 2;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("data_unifier", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Unify(args) => handle_unify(&args),
        Commands::Profiles(args) => handle_profiles(&args.profiles),
        Commands::Match(args) => handle_match(&args.input),
    }
}

fn load_registry(path: &Path) -> Result<ProfileRegistry> {
    ProfileRegistry::load(path).with_context(|| format!("Loading profiles from {path:?}"))
}

fn sniff_options(args: &InputArgs) -> Result<SniffOptions> {
    Ok(SniffOptions {
        delimiter: args.delimiter,
        quote: args.quote,
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    })
}

fn read_sources(args: &InputArgs) -> Result<Vec<SourceInput>> {
    let paths = discovery::collect_inputs(&args.inputs, &args.extensions)?;
    paths
        .iter()
        .map(|path| {
            let bytes = io_utils::read_input(path)?;
            Ok(SourceInput::new(path.display().to_string(), bytes))
        })
        .collect()
}

fn handle_unify(args: &cli::UnifyArgs) -> Result<ExitCode> {
    let registry = load_registry(&args.input.profiles)?;
    let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?
        .unwrap_or(UTF_8);
    let options = UnifyOptions {
        sniff: sniff_options(&args.input)?,
        merge: MergeOptions { order: args.order },
        parallel: !args.sequential,
    };
    let sources = read_sources(&args.input)?;
    let table = pipeline::unify(&sources, &registry, &options)?;

    let rendered = output::render_records(&table, args.output_delimiter)?;
    io_utils::write_output(args.output.as_deref(), &rendered, output_encoding)?;
    if let Some(path) = &args.failures {
        let failures = output::render_failures(&table.failures, args.output_delimiter)?;
        io_utils::write_output(Some(path), &failures, output_encoding)
            .with_context(|| format!("Writing failures to {path:?}"))?;
        info!("Wrote {} failure(s) to {:?}", table.failures.len(), path);
    }
    if let Some(path) = &args.report {
        let report = output::render_report(&table)?;
        io_utils::write_output(Some(path), &report, UTF_8)
            .with_context(|| format!("Writing report to {path:?}"))?;
        info!("Wrote run report to {:?}", path);
    }

    let summary = output::render_summary(&table);
    if args.output.as_deref().is_some_and(|p| !io_utils::is_dash(p)) {
        print!("{summary}");
    } else {
        eprint!("{summary}");
    }

    if table.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(
            "{} row(s) or file(s) could not be reconciled",
            table.failures.len()
        );
        Ok(ExitCode::from(EXIT_WITH_FAILURES))
    }
}

fn handle_profiles(path: &Path) -> Result<ExitCode> {
    let registry = load_registry(path)?;
    let headers = ["id", "required", "fields", "description"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = registry
        .lookup_all()
        .iter()
        .map(|profile| {
            vec![
                profile.id.clone(),
                profile.required_count().to_string(),
                profile
                    .fields
                    .iter()
                    .map(|m| {
                        let columns = m
                            .matchers()
                            .map(|matcher| matcher.to_string())
                            .collect::<Vec<_>>();
                        format!("{}<-{}", m.field, columns.join("+"))
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
                profile.description.clone().unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    print!("{}", output::render_table(&headers, &rows));
    Ok(ExitCode::SUCCESS)
}

fn handle_match(args: &InputArgs) -> Result<ExitCode> {
    let registry = load_registry(&args.profiles)?;
    let options = sniff_options(args)?;
    let sources = read_sources(args)?;
    if sources.is_empty() {
        return Err(error::UnifyError::NoInputs.into());
    }

    let headers = ["file", "profile", "score", "candidates"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let mut rows = Vec::with_capacity(sources.len());
    let mut unmatched = 0usize;
    for source in &sources {
        let row = match sniff::sniff(&source.bytes, &options) {
            Err(err) => {
                unmatched += 1;
                vec![source.identity.clone(), "-".into(), "-".into(), err.to_string()]
            }
            Ok(sniffed) => {
                let mut reader = sniffed.reader();
                let header = reader
                    .headers()
                    .with_context(|| format!("Reading header of {}", source.identity))?
                    .iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                match match_header(&header, &registry) {
                    MatchOutcome::Matched(found) => vec![
                        source.identity.clone(),
                        found.profile_id().to_string(),
                        format!("{:.2}", found.score),
                        format!("{} field(s) bound", found.resolved_count()),
                    ],
                    MatchOutcome::NoMatch(no_match) => {
                        unmatched += 1;
                        vec![
                            source.identity.clone(),
                            "-".into(),
                            "-".into(),
                            no_match.describe_candidates(),
                        ]
                    }
                }
            }
        };
        rows.push(row);
    }
    print!("{}", output::render_table(&headers, &rows));
    if unmatched == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_WITH_FAILURES))
    }
}
