//! Row normalization: one raw row plus a matched profile in, one canonical
//! record or one failure out.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::{
    canonical::{CanonicalField, CanonicalValue},
    data::{self, AmountCells},
    matcher::{CandidateScore, FieldBinding, ProfileMatch, describe_candidates},
    profile::{FieldMapping, FieldParser},
};

/// A record exactly as split from the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub source: String,
    /// 1-based line on which the record starts.
    pub line: u64,
    pub fields: Vec<String>,
}

impl RawRow {
    /// The cell at `index`, or `None` when it is missing or blank.
    fn cell(&self, index: Option<usize>) -> Option<&str> {
        index
            .and_then(|idx| self.fields.get(idx))
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRecord {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub account_id: Option<String>,
    pub counterparty: Option<String>,
    pub transaction_type: Option<String>,
    pub source_file: String,
    pub source_line: u64,
}

impl CanonicalRecord {
    pub fn get(&self, field: CanonicalField) -> Option<CanonicalValue> {
        let text = |value: &Option<String>| value.clone().map(CanonicalValue::Text);
        match field {
            CanonicalField::Date => Some(CanonicalValue::Date(self.date)),
            CanonicalField::Amount => Some(CanonicalValue::Amount(self.amount)),
            CanonicalField::Currency => text(&self.currency),
            CanonicalField::Description => text(&self.description),
            CanonicalField::AccountId => text(&self.account_id),
            CanonicalField::Counterparty => text(&self.counterparty),
            CanonicalField::TransactionType => text(&self.transaction_type),
        }
    }

    /// Cells in output-header order; absent values are empty strings.
    pub fn to_output_row(&self) -> Vec<String> {
        CanonicalField::ALL
            .iter()
            .map(|field| {
                self.get(*field)
                    .map(|value| value.as_display())
                    .unwrap_or_default()
            })
            .chain([self.source_file.clone(), self.source_line.to_string()])
            .collect()
    }
}

/// Failure categories, named as they appear in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnreadableFile,
    NoMatch,
    MalformedRow,
    MissingRequiredField,
    ParseError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnreadableFile => "unreadable_file",
            FailureKind::NoMatch => "no_match",
            FailureKind::MalformedRow => "malformed_row",
            FailureKind::MissingRequiredField => "missing_required_field",
            FailureKind::ParseError => "parse_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("file could not be read: {message}")]
    UnreadableFile { message: String },

    #[error("header matches no profile; candidates: {}", describe_candidates(.candidates))]
    NoMatch { candidates: Vec<CandidateScore> },

    #[error("record could not be parsed: {message}")]
    MalformedRow { message: String },

    #[error("required field '{field}' is empty or missing")]
    MissingRequiredField { field: CanonicalField },

    #[error("field '{field}' value '{value}' could not be parsed: {message}")]
    ParseError {
        field: CanonicalField,
        value: String,
        message: String,
    },
}

impl FailureReason {
    pub fn kind(&self) -> FailureKind {
        match self {
            FailureReason::UnreadableFile { .. } => FailureKind::UnreadableFile,
            FailureReason::NoMatch { .. } => FailureKind::NoMatch,
            FailureReason::MalformedRow { .. } => FailureKind::MalformedRow,
            FailureReason::MissingRequiredField { .. } => FailureKind::MissingRequiredField,
            FailureReason::ParseError { .. } => FailureKind::ParseError,
        }
    }

    /// The canonical field the failure is about, for row-level failures.
    pub fn field(&self) -> Option<CanonicalField> {
        match self {
            FailureReason::MissingRequiredField { field }
            | FailureReason::ParseError { field, .. } => Some(*field),
            _ => None,
        }
    }
}

/// A row (or whole file) that could not be reconciled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizationFailure {
    pub source_file: String,
    /// `None` when the file could not be read far enough to have lines.
    pub line: Option<u64>,
    pub raw: Vec<String>,
    pub reason: FailureReason,
}

impl NormalizationFailure {
    pub fn kind(&self) -> FailureKind {
        self.reason.kind()
    }
}

impl fmt::Display for NormalizationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.source_file, line, self.reason),
            None => write!(f, "{}: {}", self.source_file, self.reason),
        }
    }
}

#[derive(Default)]
struct RecordBuilder {
    date: Option<NaiveDate>,
    amount: Option<Decimal>,
    currency: Option<String>,
    description: Option<String>,
    account_id: Option<String>,
    counterparty: Option<String>,
    transaction_type: Option<String>,
}

impl RecordBuilder {
    fn set(&mut self, field: CanonicalField, value: CanonicalValue) -> Result<(), String> {
        match (field, value) {
            (CanonicalField::Date, CanonicalValue::Date(date)) => self.date = Some(date),
            (CanonicalField::Amount, CanonicalValue::Amount(amount)) => self.amount = Some(amount),
            (CanonicalField::Currency, CanonicalValue::Text(text)) => self.currency = Some(text),
            (CanonicalField::Description, CanonicalValue::Text(text)) => {
                self.description = Some(text)
            }
            (CanonicalField::AccountId, CanonicalValue::Text(text)) => self.account_id = Some(text),
            (CanonicalField::Counterparty, CanonicalValue::Text(text)) => {
                self.counterparty = Some(text)
            }
            (CanonicalField::TransactionType, CanonicalValue::Text(text)) => {
                self.transaction_type = Some(text)
            }
            (field, value) => {
                return Err(format!(
                    "parser produced '{value}', which does not fit a {} field",
                    field.canonical_type()
                ));
            }
        }
        Ok(())
    }
}

/// Normalizes one row against a profile bound to its file's header.
pub fn normalize(
    row: &RawRow,
    matched: &ProfileMatch<'_>,
) -> Result<CanonicalRecord, NormalizationFailure> {
    let fail = |reason: FailureReason| NormalizationFailure {
        source_file: row.source.clone(),
        line: Some(row.line),
        raw: row.fields.clone(),
        reason,
    };

    let mut builder = RecordBuilder::default();
    for (mapping, binding) in matched.mappings() {
        let parsed = match binding {
            Some(binding) => parse_field(row, mapping, binding).map_err(|(value, message)| {
                fail(FailureReason::ParseError {
                    field: mapping.field,
                    value,
                    message,
                })
            })?,
            None => None,
        };
        match parsed {
            Some(value) => builder.set(mapping.field, value).map_err(|message| {
                fail(FailureReason::ParseError {
                    field: mapping.field,
                    value: String::new(),
                    message,
                })
            })?,
            None if mapping.required => {
                return Err(fail(FailureReason::MissingRequiredField {
                    field: mapping.field,
                }));
            }
            None => {}
        }
    }

    let (Some(date), Some(amount)) = (builder.date, builder.amount) else {
        let field = if builder.date.is_none() {
            CanonicalField::Date
        } else {
            CanonicalField::Amount
        };
        return Err(fail(FailureReason::MissingRequiredField { field }));
    };
    Ok(CanonicalRecord {
        date,
        amount,
        currency: builder.currency,
        description: builder.description,
        account_id: builder.account_id,
        counterparty: builder.counterparty,
        transaction_type: builder.transaction_type,
        source_file: row.source.clone(),
        source_line: row.line,
    })
}

/// Parses one bound field. Errors carry the offending raw text and a message.
fn parse_field(
    row: &RawRow,
    mapping: &FieldMapping,
    binding: &FieldBinding,
) -> Result<Option<CanonicalValue>, (String, String)> {
    let primary = row.cell(Some(binding.column));
    let failed = |raw: &str, err: anyhow::Error| (raw.to_string(), format!("{err:#}"));

    match &mapping.parser {
        FieldParser::Text => Ok(primary
            .and_then(data::normalize_text)
            .map(CanonicalValue::Text)),
        FieldParser::Currency => primary
            .map(|raw| {
                data::parse_currency(raw)
                    .map(CanonicalValue::Text)
                    .map_err(|err| failed(raw, err))
            })
            .transpose(),
        FieldParser::Choice { values } => primary
            .map(|raw| {
                data::parse_choice(raw, values)
                    .map(CanonicalValue::Text)
                    .map_err(|err| failed(raw, err))
            })
            .transpose(),
        FieldParser::Date { format } => primary
            .map(|raw| {
                data::parse_date(raw, format)
                    .map(CanonicalValue::Date)
                    .map_err(|err| failed(raw, err))
            })
            .transpose(),
        FieldParser::Amount(format) => {
            let cells = AmountCells {
                primary,
                fraction: row.cell(binding.fraction_column),
                outflow: row.cell(binding.outflow_column),
                direction: row.cell(binding.direction_column),
            };
            let raw = [cells.primary, cells.fraction, cells.outflow, cells.direction]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" / ");
            data::parse_amount(&cells, format)
                .map(|amount| amount.map(CanonicalValue::Amount))
                .map_err(|err| failed(&raw, err))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::{
        matcher::{MatchOutcome, match_header},
        registry::ProfileRegistry,
    };

    const BANK_A: &str = r#"
profiles:
  - id: bank-a-v1
    fields:
      - { field: date, column: { name: "Txn Date" }, parser: { type: date, format: YYYY-MM-DD }, required: true }
      - field: amount
        column: { name: Amount }
        parser: { type: amount, decimal_separator: ",", thousands_separator: ".", sign: outflow_positive }
        required: true
      - { field: description, column: { name: Memo } }
      - { field: currency, column: { name: Currency } }
      - field: transaction_type
        column: { name: Type }
        parser: { type: choice, values: { add: credit, remove: debit } }
"#;

    fn row(fields: &[&str]) -> RawRow {
        RawRow {
            source: "a.csv".to_string(),
            line: 2,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn run(registry: &ProfileRegistry, header: &[&str], fields: &[&str]) -> Result<CanonicalRecord, NormalizationFailure> {
        let header = header.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        match match_header(&header, registry) {
            MatchOutcome::Matched(found) => normalize(&row(fields), &found),
            MatchOutcome::NoMatch(no_match) => panic!("unexpected no match: {no_match:?}"),
        }
    }

    const HEADER: &[&str] = &["Txn Date", "Amount", "Memo", "Currency", "Type"];

    #[test]
    fn normalizes_complete_row() {
        let registry = ProfileRegistry::from_yaml_str(BANK_A).unwrap();
        let record = run(
            &registry,
            HEADER,
            &["2024-03-01", "1.234,50", "  Rent\tMarch ", "eur", "remove"],
        )
        .expect("record");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(record.amount, Decimal::from_str("-1234.50").unwrap());
        assert_eq!(record.description.as_deref(), Some("Rent March"));
        assert_eq!(record.currency.as_deref(), Some("EUR"));
        assert_eq!(record.transaction_type.as_deref(), Some("debit"));
        assert_eq!(record.source_line, 2);
    }

    #[test]
    fn blank_optional_fields_are_absent() {
        let registry = ProfileRegistry::from_yaml_str(BANK_A).unwrap();
        let record = run(&registry, HEADER, &["2024-03-01", "10", " ", "", ""]).expect("record");
        assert_eq!(record.description, None);
        assert_eq!(record.currency, None);
        let row = record.to_output_row();
        assert_eq!(row[3], "");
        assert_eq!(row[1], "-10");
        assert_eq!(&row[7..], ["a.csv", "2"]);
    }

    #[test]
    fn impossible_date_is_a_parse_error_on_date() {
        let registry = ProfileRegistry::from_yaml_str(BANK_A).unwrap();
        let failure = run(&registry, HEADER, &["2024-13-40", "100,00", "rent", "", ""]).unwrap_err();
        assert_eq!(failure.kind(), FailureKind::ParseError);
        assert_eq!(failure.reason.field(), Some(CanonicalField::Date));
        assert_eq!(failure.line, Some(2));
        assert_eq!(failure.raw[0], "2024-13-40");
        match failure.reason {
            FailureReason::ParseError { value, .. } => assert_eq!(value, "2024-13-40"),
            other => panic!("unexpected reason {other:?}"),
        }
    }

    #[test]
    fn missing_required_amount_is_reported() {
        let registry = ProfileRegistry::from_yaml_str(BANK_A).unwrap();
        let failure = run(&registry, HEADER, &["2024-03-01"]).unwrap_err();
        assert_eq!(
            failure.reason,
            FailureReason::MissingRequiredField {
                field: CanonicalField::Amount
            }
        );
    }

    #[test]
    fn first_failing_field_in_profile_order_wins() {
        let registry = ProfileRegistry::from_yaml_str(BANK_A).unwrap();
        let failure = run(&registry, HEADER, &["bogus", "", "", "", ""]).unwrap_err();
        assert_eq!(failure.reason.field(), Some(CanonicalField::Date));
    }

    #[test]
    fn unknown_choice_value_is_a_parse_error() {
        let registry = ProfileRegistry::from_yaml_str(BANK_A).unwrap();
        let failure = run(&registry, HEADER, &["2024-03-01", "1", "", "", "transfer"]).unwrap_err();
        assert_eq!(failure.reason.field(), Some(CanonicalField::TransactionType));
        assert!(failure.to_string().starts_with("a.csv:2: field 'transaction_type'"));
    }

    #[test]
    fn zero_amount_is_never_negative() {
        let registry = ProfileRegistry::from_yaml_str(BANK_A).unwrap();
        let record = run(&registry, HEADER, &["2024-03-01", "0,00", "", "", ""]).unwrap();
        assert!(!record.amount.is_sign_negative());
        assert_eq!(record.amount.to_string(), "0.00");
    }

    #[test]
    fn euro_and_cents_columns_combine() {
        let registry = ProfileRegistry::from_yaml_str(
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
        )
        .unwrap();
        let header = &["date_readable", "euro", "cents"];
        let record = run(&registry, header, &["05 Jan 2024", "-12", "5"]).unwrap();
        assert_eq!(record.amount, Decimal::from_str("-12.05").unwrap());

        let failure = run(&registry, header, &["05 Jan 2024", "12", ""]).unwrap_err();
        match failure.reason {
            FailureReason::ParseError { field, value, .. } => {
                assert_eq!(field, CanonicalField::Amount);
                assert_eq!(value, "12");
            }
            other => panic!("unexpected reason {other:?}"),
        }
    }

    #[test]
    fn direction_column_signs_unsigned_amounts() {
        let registry = ProfileRegistry::from_yaml_str(
            r#"
profiles:
  - id: legacy-transaction
    fields:
      - { field: date, column: { exact: date }, parser: { type: date, format: DD-MM-YYYY }, required: true }
      - field: amount
        column: { exact: amounts }
        parser: { type: amount, direction_column: { exact: transaction }, outflow_values: [remove], inflow_values: [add] }
        required: true
"#,
        )
        .unwrap();
        let header = &["date", "transaction", "amounts"];
        let spent = run(&registry, header, &["05-10-2019", "remove", "500"]).unwrap();
        assert_eq!(spent.amount, Decimal::from_str("-500").unwrap());
        let received = run(&registry, header, &["04-10-2019", "add", "1060.8"]).unwrap();
        assert_eq!(received.amount, Decimal::from_str("1060.8").unwrap());

        let failure = run(&registry, header, &["06-10-2019", "transfer", "-7"]).unwrap_err();
        match failure.reason {
            FailureReason::ParseError { field, value, message } => {
                assert_eq!(field, CanonicalField::Amount);
                assert_eq!(value, "-7 / transfer");
                assert!(message.contains("'remove', 'add'"), "{message}");
            }
            other => panic!("unexpected reason {other:?}"),
        }
    }
}
