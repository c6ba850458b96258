//! Expands CLI input paths into the ordered list of files to unify.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use log::debug;

use crate::io_utils;

pub const DEFAULT_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Files are kept in argument order. Directories are walked recursively and
/// contribute their matching files sorted by path; hidden entries are skipped.
/// Explicitly named files (and `-` for stdin) are taken regardless of
/// extension.
pub fn collect_inputs(paths: &[PathBuf], extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if io_utils::is_dash(path) || path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            let mut found = Vec::new();
            walk(path, extensions, &mut found)?;
            found.sort();
            debug!("Discovered {} file(s) under {:?}", found.len(), path);
            files.extend(found);
        } else {
            bail!("Input path {path:?} does not exist");
        }
    }
    Ok(files)
}

fn walk(dir: &Path, extensions: &[String], found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("Reading directory {dir:?}"))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("Reading directory {dir:?}"))?
            .path();
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            walk(&path, extensions, found)?;
        } else if path.is_file() && has_extension(&path, extensions) {
            found.push(path);
        }
    }
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}
