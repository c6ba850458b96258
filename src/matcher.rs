//! Header-to-profile matching.
//!
//! A profile matches a header when every required field resolves to a header
//! column. Among matching profiles the one resolving the most fields wins,
//! then the lexicographically earliest identifier, so the choice is stable
//! across runs.

use std::cmp::Ordering;

use itertools::Itertools;
use serde::Serialize;

use crate::{
    canonical::CanonicalField,
    profile::{ColumnMatcher, FieldMapping, FieldParser, SchemaProfile},
    registry::ProfileRegistry,
};

/// Header columns resolved for one profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldBinding {
    pub field: CanonicalField,
    pub column: usize,
    pub fraction_column: Option<usize>,
    pub outflow_column: Option<usize>,
    pub direction_column: Option<usize>,
}

/// A profile bound to the header of one file.
#[derive(Debug, Clone)]
pub struct ProfileMatch<'r> {
    pub profile: &'r SchemaProfile,
    /// Indexed like `profile.fields`; `None` for optional fields the header lacks.
    pub bindings: Vec<Option<FieldBinding>>,
    pub score: f64,
}

impl<'r> ProfileMatch<'r> {
    pub fn profile_id(&self) -> &str {
        &self.profile.id
    }

    pub fn resolved_count(&self) -> usize {
        self.bindings.iter().flatten().count()
    }

    pub fn binding(&self, field: CanonicalField) -> Option<&FieldBinding> {
        self.bindings.iter().flatten().find(|b| b.field == field)
    }

    /// Mappings paired with their binding, in profile order.
    pub fn mappings(&self) -> impl Iterator<Item = (&'r FieldMapping, Option<&FieldBinding>)> {
        self.profile
            .fields
            .iter()
            .zip(self.bindings.iter().map(Option::as_ref))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub profile_id: String,
    pub score: f64,
    pub missing: Vec<CanonicalField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoMatch {
    pub header: Vec<String>,
    pub candidates: Vec<CandidateScore>,
}

impl NoMatch {
    pub fn describe_candidates(&self) -> String {
        describe_candidates(&self.candidates)
    }
}

/// One-line rendering such as `bank-a-v1 (0.50, missing amount)`.
pub fn describe_candidates(candidates: &[CandidateScore]) -> String {
    candidates
        .iter()
        .map(|c| {
            if c.missing.is_empty() {
                format!("{} ({:.2})", c.profile_id, c.score)
            } else {
                format!(
                    "{} ({:.2}, missing {})",
                    c.profile_id,
                    c.score,
                    c.missing.iter().join("/")
                )
            }
        })
        .join("; ")
}

#[derive(Debug, Clone)]
pub enum MatchOutcome<'r> {
    Matched(ProfileMatch<'r>),
    NoMatch(NoMatch),
}

pub fn match_header<'r>(header: &[String], registry: &'r ProfileRegistry) -> MatchOutcome<'r> {
    let mut best: Option<ProfileMatch<'r>> = None;
    let mut candidates = Vec::with_capacity(registry.len());

    for profile in registry.lookup_all() {
        let bindings = bind_profile(profile, header);
        let missing = profile
            .fields
            .iter()
            .zip(&bindings)
            .filter(|(mapping, binding)| mapping.required && binding.is_none())
            .map(|(mapping, _)| mapping.field)
            .collect::<Vec<_>>();
        let required = profile.required_count();
        let score = if required == 0 {
            1.0
        } else {
            (required - missing.len()) as f64 / required as f64
        };
        candidates.push(CandidateScore {
            profile_id: profile.id.clone(),
            score,
            missing: missing.clone(),
        });
        if !missing.is_empty() {
            continue;
        }
        let candidate = ProfileMatch {
            profile,
            bindings,
            score,
        };
        best = match best {
            Some(current) if prefer(&current, &candidate) != Ordering::Greater => Some(current),
            _ => Some(candidate),
        };
    }

    match best {
        Some(found) => MatchOutcome::Matched(found),
        None => MatchOutcome::NoMatch(NoMatch {
            header: header.to_vec(),
            candidates,
        }),
    }
}

/// `Ordering::Greater` when `challenger` should replace `current`.
fn prefer(current: &ProfileMatch<'_>, challenger: &ProfileMatch<'_>) -> Ordering {
    challenger
        .resolved_count()
        .cmp(&current.resolved_count())
        .then_with(|| current.profile.id.cmp(&challenger.profile.id))
}

fn bind_profile(profile: &SchemaProfile, header: &[String]) -> Vec<Option<FieldBinding>> {
    profile
        .fields
        .iter()
        .map(|mapping| bind_field(mapping, header))
        .collect()
}

fn bind_field(mapping: &FieldMapping, header: &[String]) -> Option<FieldBinding> {
    let column = mapping.column.locate(header)?;
    let locate = |matcher: &Option<ColumnMatcher>| match matcher {
        Some(matcher) => matcher.locate(header).map(Some),
        None => Some(None),
    };
    let (fraction_column, outflow_column, direction_column) = match &mapping.parser {
        FieldParser::Amount(format) => (
            locate(&format.fraction_column)?,
            locate(&format.outflow_column)?,
            locate(&format.direction_column)?,
        ),
        _ => (None, None, None),
    };
    Some(FieldBinding {
        field: mapping.field,
        column,
        fraction_column,
        outflow_column,
        direction_column,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn registry(yaml: &str) -> ProfileRegistry {
        ProfileRegistry::from_yaml_str(yaml).expect("registry")
    }

    const TWO_PROFILES: &str = r#"
profiles:
  - id: zeta
    fields:
      - { field: date, column: { name: date }, required: true }
      - { field: amount, column: { name: amount }, required: true }
  - id: alpha
    fields:
      - { field: date, column: { name: date }, required: true }
      - { field: amount, column: { name: amount }, required: true }
  - id: rich
    fields:
      - { field: date, column: { name: date }, required: true }
      - { field: amount, column: { name: amount }, required: true }
      - { field: description, column: { name: memo } }
"#;

    #[test]
    fn prefers_profile_resolving_more_fields() {
        let registry = registry(TWO_PROFILES);
        match match_header(&header(&["Date", "Amount", "Memo"]), &registry) {
            MatchOutcome::Matched(found) => {
                assert_eq!(found.profile_id(), "rich");
                assert_eq!(found.resolved_count(), 3);
            }
            MatchOutcome::NoMatch(no_match) => panic!("unexpected no match: {no_match:?}"),
        }
    }

    #[test]
    fn ties_break_on_earliest_identifier() {
        let registry = registry(TWO_PROFILES);
        match match_header(&header(&["date", "amount"]), &registry) {
            MatchOutcome::Matched(found) => assert_eq!(found.profile_id(), "alpha"),
            MatchOutcome::NoMatch(no_match) => panic!("unexpected no match: {no_match:?}"),
        }
    }

    #[test]
    fn partial_matches_report_scores() {
        let registry = registry(TWO_PROFILES);
        match match_header(&header(&["date", "value"]), &registry) {
            MatchOutcome::NoMatch(no_match) => {
                assert_eq!(no_match.candidates.len(), 3);
                assert!(no_match.candidates.iter().all(|c| c.score == 0.5));
                assert_eq!(no_match.candidates[0].missing, vec![CanonicalField::Amount]);
                assert!(no_match.describe_candidates().contains("zeta (0.50, missing amount)"));
            }
            MatchOutcome::Matched(found) => panic!("unexpected match {}", found.profile_id()),
        }
    }

    #[test]
    fn auxiliary_amount_columns_must_resolve() {
        let registry = registry(
            r#"
profiles:
  - id: euro-cents
    fields:
      - { field: date, column: { name: date_readable }, parser: { type: date, format: "%d %b %Y" }, required: true }
      - field: amount
        column: { name: euro }
        parser: { type: amount, fraction_column: { name: cents } }
        required: true
"#,
        );
        assert!(matches!(
            match_header(&header(&["date_readable", "euro"]), &registry),
            MatchOutcome::NoMatch(_)
        ));
        match match_header(&header(&["date_readable", "euro", "cents"]), &registry) {
            MatchOutcome::Matched(found) => {
                let binding = found.binding(CanonicalField::Amount).unwrap();
                assert_eq!(binding.column, 1);
                assert_eq!(binding.fraction_column, Some(2));
            }
            MatchOutcome::NoMatch(no_match) => panic!("unexpected no match: {no_match:?}"),
        }
    }

    #[test]
    fn direction_column_binds_alongside_the_amount() {
        let registry = registry(
            r#"
profiles:
  - id: legacy
    fields:
      - { field: date, column: { exact: date }, parser: { type: date, format: DD-MM-YYYY }, required: true }
      - field: amount
        column: { exact: amounts }
        parser: { type: amount, direction_column: { exact: transaction }, outflow_values: [remove] }
        required: true
"#,
        );
        assert!(matches!(
            match_header(&header(&["date", "amounts"]), &registry),
            MatchOutcome::NoMatch(_)
        ));
        match match_header(&header(&["date", "transaction", "amounts"]), &registry) {
            MatchOutcome::Matched(found) => {
                let binding = found.binding(CanonicalField::Amount).unwrap();
                assert_eq!(binding.column, 2);
                assert_eq!(binding.direction_column, Some(1));
                assert_eq!(binding.fraction_column, None);
            }
            MatchOutcome::NoMatch(no_match) => panic!("unexpected no match: {no_match:?}"),
        }
    }
}
