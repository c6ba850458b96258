//! Declarative source-format profiles.
//!
//! A [`SchemaProfile`] maps each canonical field it knows about to a
//! [`ColumnMatcher`] (which header column holds the value) and a
//! [`FieldParser`] (how the raw text becomes a canonical value). Profiles are
//! plain immutable values deserialized from YAML; the
//! [`ProfileRegistry`](crate::registry::ProfileRegistry) validates them once at
//! load time.
//!
//! ```yaml
//! profiles:
//!   - id: bank-a-v1
//!     fields:
//!       - field: date
//!         column: { name: "Txn Date" }
//!         parser: { type: date, format: "DD.MM.YYYY" }
//!         required: true
//!       - field: amount
//!         column: { names: ["Amount", "Betrag"] }
//!         parser: { type: amount, decimal_separator: ",", thousands_separator: "." }
//!         required: true
//! ```

use std::{collections::BTreeMap, fmt};

use chrono::format::{Item, StrftimeItems};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::canonical::{CanonicalField, CanonicalType};

/// Top-level shape of a profile configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileDocument {
    #[serde(default)]
    pub profiles: Vec<SchemaProfile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaProfile {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<FieldMapping>,
}

impl SchemaProfile {
    pub fn mapping(&self, field: CanonicalField) -> Option<&FieldMapping> {
        self.fields.iter().find(|m| m.field == field)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|m| m.required)
    }

    pub fn required_count(&self) -> usize {
        self.required_fields().count()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "FieldMappingSpec")]
pub struct FieldMapping {
    pub field: CanonicalField,
    pub column: ColumnMatcher,
    pub parser: FieldParser,
    pub required: bool,
}

impl FieldMapping {
    /// Every column this mapping needs to resolve: the primary column plus any
    /// auxiliary amount columns.
    pub fn matchers(&self) -> impl Iterator<Item = &ColumnMatcher> {
        let auxiliary = match &self.parser {
            FieldParser::Amount(format) => [
                format.fraction_column.as_ref(),
                format.outflow_column.as_ref(),
                format.direction_column.as_ref(),
            ],
            _ => [None; 3],
        };
        std::iter::once(&self.column).chain(auxiliary.into_iter().flatten())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldMappingSpec {
    field: CanonicalField,
    column: ColumnMatcher,
    #[serde(default)]
    parser: Option<FieldParser>,
    #[serde(default)]
    required: bool,
}

impl TryFrom<FieldMappingSpec> for FieldMapping {
    type Error = String;

    fn try_from(spec: FieldMappingSpec) -> Result<Self, Self::Error> {
        let parser = spec
            .parser
            .unwrap_or_else(|| FieldParser::default_for(spec.field.canonical_type()));
        Ok(FieldMapping {
            field: spec.field,
            column: spec.column,
            parser,
            required: spec.required,
        })
    }
}

/// Locates the source column for a field within a header row.
#[derive(Debug, Clone)]
pub enum ColumnMatcher {
    /// Header equals the name exactly (after trimming).
    Exact(String),
    /// Header equals the name ignoring ASCII and Unicode case.
    Name(String),
    /// Header equals any of the names ignoring case.
    AnyName(Vec<String>),
    /// Fixed 0-based column position.
    Position(usize),
    /// Header matches a case-insensitive regular expression.
    Pattern(Regex),
}

impl ColumnMatcher {
    pub fn matches(&self, index: usize, header: &str) -> bool {
        let header = clean_header(header);
        match self {
            ColumnMatcher::Exact(name) => header == name.trim(),
            ColumnMatcher::Name(name) => eq_ignore_case(header, name),
            ColumnMatcher::AnyName(names) => names.iter().any(|n| eq_ignore_case(header, n)),
            ColumnMatcher::Position(position) => *position == index,
            ColumnMatcher::Pattern(regex) => regex.is_match(header),
        }
    }

    /// First header column satisfying this matcher.
    pub fn locate(&self, headers: &[String]) -> Option<usize> {
        if let ColumnMatcher::Position(position) = self {
            return (*position < headers.len()).then_some(*position);
        }
        headers
            .iter()
            .enumerate()
            .position(|(idx, header)| self.matches(idx, header))
    }
}

impl fmt::Display for ColumnMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnMatcher::Exact(name) => write!(f, "exact '{name}'"),
            ColumnMatcher::Name(name) => write!(f, "name '{name}'"),
            ColumnMatcher::AnyName(names) => write!(f, "names [{}]", names.join(", ")),
            ColumnMatcher::Position(position) => write!(f, "position {position}"),
            ColumnMatcher::Pattern(regex) => write!(f, "pattern /{}/", regex.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnMatcher {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let spec = ColumnSpec::deserialize(deserializer)?;
        ColumnMatcher::try_from(spec).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ColumnSpec {
    exact: Option<String>,
    name: Option<String>,
    names: Option<Vec<String>>,
    position: Option<usize>,
    pattern: Option<String>,
}

impl TryFrom<ColumnSpec> for ColumnMatcher {
    type Error = String;

    fn try_from(spec: ColumnSpec) -> Result<Self, Self::Error> {
        let mut matchers = Vec::new();
        if let Some(name) = spec.exact {
            matchers.push(ColumnMatcher::Exact(name));
        }
        if let Some(name) = spec.name {
            matchers.push(ColumnMatcher::Name(name));
        }
        if let Some(names) = spec.names {
            if names.is_empty() {
                return Err("column 'names' must list at least one header".to_string());
            }
            matchers.push(ColumnMatcher::AnyName(names));
        }
        if let Some(position) = spec.position {
            matchers.push(ColumnMatcher::Position(position));
        }
        if let Some(pattern) = spec.pattern {
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|err| format!("invalid column pattern '{pattern}': {err}"))?;
            matchers.push(ColumnMatcher::Pattern(regex));
        }
        match matchers.len() {
            1 => Ok(matchers.remove(0)),
            0 => Err(
                "column matcher needs one of: exact, name, names, position, pattern".to_string(),
            ),
            _ => Err("column matcher must use exactly one of: exact, name, names, position, pattern"
                .to_string()),
        }
    }
}

/// Trims surrounding whitespace and a leading byte-order mark.
pub fn clean_header(header: &str) -> &str {
    header.trim().trim_start_matches('\u{feff}').trim()
}

fn eq_ignore_case(left: &str, right: &str) -> bool {
    let right = right.trim();
    left.eq_ignore_ascii_case(right) || left.to_lowercase() == right.to_lowercase()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldParser {
    Text,
    Currency,
    Choice { values: BTreeMap<String, String> },
    Date { format: DateFormat },
    Amount(AmountFormat),
}

impl FieldParser {
    pub fn default_for(ty: CanonicalType) -> Self {
        match ty {
            CanonicalType::Date => FieldParser::Date {
                format: DateFormat::iso(),
            },
            CanonicalType::Amount => FieldParser::Amount(AmountFormat::default()),
            CanonicalType::Currency => FieldParser::Currency,
            CanonicalType::Text => FieldParser::Text,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldParser::Text => "text",
            FieldParser::Currency => "currency",
            FieldParser::Choice { .. } => "choice",
            FieldParser::Date { .. } => "date",
            FieldParser::Amount(_) => "amount",
        }
    }

    /// Whether values produced by this parser can populate a field of `ty`.
    pub fn produces(&self, ty: CanonicalType) -> bool {
        match self {
            FieldParser::Text => ty == CanonicalType::Text,
            FieldParser::Currency => ty == CanonicalType::Currency,
            FieldParser::Choice { .. } => {
                matches!(ty, CanonicalType::Text | CanonicalType::Currency)
            }
            FieldParser::Date { .. } => ty == CanonicalType::Date,
            FieldParser::Amount(_) => ty == CanonicalType::Amount,
        }
    }
}

/// Date layout of a source column.
///
/// Accepts a chrono strftime pattern (`%d/%m/%Y`), a token pattern
/// (`DD.MM.YYYY`, tokens `YYYY YY MM DD HH mm ss`) or `rfc3339`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DateFormat {
    Strftime(String),
    Rfc3339,
}

impl DateFormat {
    pub fn iso() -> Self {
        DateFormat::Strftime("%Y-%m-%d".to_string())
    }
}

impl TryFrom<String> for DateFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("date format must not be empty".to_string());
        }
        if trimmed.eq_ignore_ascii_case("rfc3339") || trimmed.eq_ignore_ascii_case("iso8601") {
            return Ok(DateFormat::Rfc3339);
        }
        let pattern = if trimmed.contains('%') {
            trimmed.to_string()
        } else {
            translate_date_tokens(trimmed)?
        };
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(format!("invalid date format '{value}'"));
        }
        Ok(DateFormat::Strftime(pattern))
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateFormat::Strftime(pattern) => f.write_str(pattern),
            DateFormat::Rfc3339 => f.write_str("rfc3339"),
        }
    }
}

fn translate_date_tokens(value: &str) -> Result<String, String> {
    const TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];
    let mut out = String::with_capacity(value.len() + 4);
    let mut rest = value;
    'outer: while let Some(ch) = rest.chars().next() {
        for (token, replacement) in TOKENS {
            if let Some(stripped) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = stripped;
                continue 'outer;
            }
        }
        if ch.is_ascii_alphabetic() {
            return Err(format!(
                "unsupported token in date format '{value}' near '{rest}'"
            ));
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Money received is positive (the canonical convention).
    #[default]
    InflowPositive,
    /// Money spent is positive; values are negated.
    OutflowPositive,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AmountFormat {
    pub decimal_separator: char,
    pub thousands_separator: Option<char>,
    pub sign: SignConvention,
    /// Values are expressed in minor units (cents) and divided by 100.
    pub minor_units: bool,
    /// Separate column holding the minor-unit part (e.g. `euro` + `cents`).
    pub fraction_column: Option<ColumnMatcher>,
    /// Separate column holding outflows when the primary column holds inflows.
    pub outflow_column: Option<ColumnMatcher>,
    /// Column whose token decides the direction of an unsigned amount.
    pub direction_column: Option<ColumnMatcher>,
    /// Direction tokens marking money spent (compared ignoring case).
    pub outflow_values: Vec<String>,
    /// Direction tokens marking money received. When empty, every token that
    /// is not an outflow counts as an inflow.
    pub inflow_values: Vec<String>,
}

impl Default for AmountFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            thousands_separator: None,
            sign: SignConvention::InflowPositive,
            minor_units: false,
            fraction_column: None,
            outflow_column: None,
            direction_column: None,
            outflow_values: Vec::new(),
            inflow_values: Vec::new(),
        }
    }
}

impl AmountFormat {
    pub fn ensure_valid(&self) -> Result<(), String> {
        if self.decimal_separator.is_ascii_digit() {
            return Err("decimal separator cannot be a digit".to_string());
        }
        if let Some(sep) = self.thousands_separator {
            if sep == self.decimal_separator {
                return Err(format!(
                    "thousands separator '{sep}' equals the decimal separator"
                ));
            }
            if sep.is_ascii_digit() || sep == '-' || sep == '+' {
                return Err(format!("thousands separator '{sep}' is not allowed"));
            }
        }
        if self.minor_units && self.fraction_column.is_some() {
            return Err("minor_units cannot be combined with fraction_column".to_string());
        }
        if self.outflow_column.is_some() {
            if self.minor_units {
                return Err("outflow_column cannot be combined with minor_units".to_string());
            }
            if self.fraction_column.is_some() {
                return Err("outflow_column cannot be combined with fraction_column".to_string());
            }
            if self.direction_column.is_some() {
                return Err("outflow_column cannot be combined with direction_column".to_string());
            }
        }
        match &self.direction_column {
            Some(_) => {
                if self.outflow_values.is_empty() {
                    return Err("direction_column needs at least one outflow value".to_string());
                }
                let mut tokens = self.outflow_values.iter().chain(&self.inflow_values);
                if tokens.any(|token| token.trim().is_empty()) {
                    return Err("direction values cannot be blank".to_string());
                }
                if let Some(token) = self.outflow_values.iter().find(|out| {
                    self.inflow_values
                        .iter()
                        .any(|inflow| eq_ignore_case(inflow.trim(), out))
                }) {
                    return Err(format!(
                        "direction value '{token}' is listed as both outflow and inflow"
                    ));
                }
                if self.sign == SignConvention::OutflowPositive {
                    return Err("direction_column cannot be combined with sign: outflow_positive"
                        .to_string());
                }
            }
            None if !self.outflow_values.is_empty() || !self.inflow_values.is_empty() => {
                return Err("outflow_values and inflow_values need a direction_column".to_string());
            }
            None => {}
        }
        Ok(())
    }
}
