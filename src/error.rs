//! Typed errors for the reconciliation engine.
//!
//! Per-row problems are not errors here: they become
//! [`NormalizationFailure`](crate::normalize::NormalizationFailure) entries.
//! These enums cover the file-level and process-level cases.

use std::path::PathBuf;

use thiserror::Error;

use crate::canonical::{CanonicalField, CanonicalType};

/// A single input file could not be read as a table. Fatal for that file only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnreadableFileError {
    #[error("file is empty")]
    Empty,

    #[error("file has no parsable header row")]
    NoHeader,

    #[error("header row could not be read: {message}")]
    HeaderParse { message: String },
}

/// The profile configuration is unusable. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read profile configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile configuration {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("profile configuration defines no profiles")]
    NoProfiles,

    #[error("profile identifier must not be empty")]
    EmptyIdentifier,

    #[error("profile '{id}' is defined more than once")]
    DuplicateProfile { id: String },

    #[error("profile '{id}' maps canonical field '{field}' more than once")]
    DuplicateField { id: String, field: CanonicalField },

    #[error("profile '{id}' must map canonical field '{field}' as required")]
    MissingCoreField { id: String, field: CanonicalField },

    #[error("profile '{id}' uses a {parser} parser for '{field}', which expects {expected} values")]
    IncompatibleParser {
        id: String,
        field: CanonicalField,
        parser: &'static str,
        expected: CanonicalType,
    },

    #[error("profile '{id}' field '{field}': {reason}")]
    InvalidField {
        id: String,
        field: CanonicalField,
        reason: String,
    },
}

/// Process-fatal conditions raised by the unification driver.
#[derive(Debug, Error)]
pub enum UnifyError {
    #[error("no input files were supplied")]
    NoInputs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_error_display_names_profile_and_field() {
        let err = RegistryError::MissingCoreField {
            id: "bank-a-v1".to_string(),
            field: CanonicalField::Amount,
        };
        assert_eq!(
            err.to_string(),
            "profile 'bank-a-v1' must map canonical field 'amount' as required"
        );
    }
}
