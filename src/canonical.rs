//! The fixed canonical schema every source format is mapped onto.
//!
//! [`CanonicalField`] is a closed set: profiles can only reference these
//! fields, so loading a new profile never widens the output table.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Output columns appended after the canonical fields for provenance.
pub const PROVENANCE_COLUMNS: &[&str] = &["source_file", "source_line"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Date,
    Amount,
    Currency,
    Description,
    AccountId,
    Counterparty,
    TransactionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalType {
    Date,
    Amount,
    Currency,
    Text,
}

impl CanonicalField {
    /// Output order of the canonical table.
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::Date,
        CanonicalField::Amount,
        CanonicalField::Currency,
        CanonicalField::Description,
        CanonicalField::AccountId,
        CanonicalField::Counterparty,
        CanonicalField::TransactionType,
    ];

    /// Fields every profile must map as required.
    pub const CORE: [CanonicalField; 2] = [CanonicalField::Date, CanonicalField::Amount];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Amount => "amount",
            CanonicalField::Currency => "currency",
            CanonicalField::Description => "description",
            CanonicalField::AccountId => "account_id",
            CanonicalField::Counterparty => "counterparty",
            CanonicalField::TransactionType => "transaction_type",
        }
    }

    pub fn canonical_type(&self) -> CanonicalType {
        match self {
            CanonicalField::Date => CanonicalType::Date,
            CanonicalField::Amount => CanonicalType::Amount,
            CanonicalField::Currency => CanonicalType::Currency,
            CanonicalField::Description
            | CanonicalField::AccountId
            | CanonicalField::Counterparty
            | CanonicalField::TransactionType => CanonicalType::Text,
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CanonicalType::Date => "date",
            CanonicalType::Amount => "amount",
            CanonicalType::Currency => "currency",
            CanonicalType::Text => "text",
        };
        f.write_str(label)
    }
}

/// A parsed, canonical-typed cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Date(NaiveDate),
    Amount(Decimal),
    Text(String),
}

impl CanonicalValue {
    pub fn as_display(&self) -> String {
        match self {
            CanonicalValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CanonicalValue::Amount(a) => a.to_string(),
            CanonicalValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Full output header: canonical fields followed by provenance columns.
pub fn output_headers() -> Vec<String> {
    CanonicalField::ALL
        .iter()
        .map(|field| field.as_str().to_string())
        .chain(PROVENANCE_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_headers_follow_fixed_order() {
        let headers = output_headers();
        assert_eq!(headers.first().map(String::as_str), Some("date"));
        assert_eq!(headers[1], "amount");
        assert_eq!(
            &headers[headers.len() - 2..],
            &["source_file".to_string(), "source_line".to_string()]
        );
    }
}
