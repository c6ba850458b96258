use std::{collections::BTreeMap, str::FromStr};

use anyhow::{Context, Result, anyhow, bail, ensure};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use rust_decimal::Decimal;

use crate::profile::{AmountFormat, DateFormat, SignConvention};

const CURRENCY_SYMBOLS: &[char] = &[
    '$', '€', '£', '¥', '₹', '₽', '₩', '₺', '₪', '₣', '฿', '₫', '₴', '₦', '¢',
];
const SPACE_SEPARATORS: &[char] = &[' ', '\u{a0}', '\u{202f}', '\u{2009}'];
const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Trims a text cell and replaces control characters. Blank input is absent.
pub fn normalize_text(value: &str) -> Option<String> {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_control() || c == '\u{feff}' {
                ' '
            } else {
                c
            }
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn parse_date(value: &str, format: &DateFormat) -> Result<NaiveDate> {
    let value = value.trim();
    let parsed = match format {
        DateFormat::Strftime(pattern) => NaiveDate::parse_from_str(value, pattern)
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(value, pattern)
                    .ok()
                    .map(|dt| dt.date())
            })
            .or_else(|| {
                DateTime::parse_from_str(value, pattern)
                    .ok()
                    .map(|dt| dt.date_naive())
            }),
        DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| dt.date_naive())
            .or_else(|| {
                NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.date())
            })
            .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()),
    };
    parsed.ok_or_else(|| anyhow!("Failed to parse '{value}' as date with format '{format}'"))
}

/// Parses a decimal literal honoring explicit separators.
///
/// Accepts a leading or trailing minus, a leading plus, accounting
/// parentheses and surrounding currency symbols. Thousands groups must be
/// exactly three digits so a value in the wrong locale fails instead of being
/// misread.
pub fn parse_decimal_text(
    value: &str,
    decimal_separator: char,
    thousands_separator: Option<char>,
) -> Result<Decimal> {
    parse_signed_decimal(value, decimal_separator, thousands_separator).map(Signed::value)
}

/// A decimal literal with its sign held apart from the magnitude, so `-0`
/// keeps its sign until a minor-unit part is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signed {
    negative: bool,
    magnitude: Decimal,
}

impl Signed {
    fn value(self) -> Decimal {
        canonical_zero(if self.negative {
            -self.magnitude
        } else {
            self.magnitude
        })
    }
}

fn parse_signed_decimal(
    value: &str,
    decimal_separator: char,
    thousands_separator: Option<char>,
) -> Result<Signed> {
    let mut body = value.trim();
    let mut negative = false;

    if let Some(inner) = body.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        negative = true;
        body = inner.trim();
    }
    body = body
        .trim_matches(|c: char| CURRENCY_SYMBOLS.contains(&c))
        .trim();
    if let Some(rest) = body.strip_prefix(['-', '\u{2212}']) {
        ensure!(!negative, "Failed to parse '{value}' as amount: conflicting signs");
        negative = true;
        body = rest;
    } else if let Some(rest) = body.strip_suffix(['-', '\u{2212}']) {
        ensure!(!negative, "Failed to parse '{value}' as amount: conflicting signs");
        negative = true;
        body = rest;
    } else if let Some(rest) = body.strip_prefix('+') {
        body = rest;
    }
    body = body
        .trim_matches(|c: char| CURRENCY_SYMBOLS.contains(&c))
        .trim();
    ensure!(!body.is_empty(), "Failed to parse '{value}' as amount");

    let mut parts = body.split(decimal_separator);
    let integer = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    ensure!(
        parts.next().is_none(),
        "Failed to parse '{value}' as amount: more than one decimal separator '{decimal_separator}'"
    );

    let integer_digits = strip_thousands(value, integer, thousands_separator)?;
    ensure!(
        fraction.chars().all(|c| c.is_ascii_digit()),
        "Failed to parse '{value}' as amount"
    );
    ensure!(
        !(integer_digits.is_empty() && fraction.is_empty()),
        "Failed to parse '{value}' as amount"
    );

    let literal = match (integer_digits.is_empty(), fraction.is_empty()) {
        (_, true) => integer_digits,
        (true, false) => format!("0.{fraction}"),
        (false, false) => format!("{integer_digits}.{fraction}"),
    };
    let magnitude = Decimal::from_str(&literal)
        .with_context(|| format!("Failed to parse '{value}' as amount"))?;
    Ok(Signed {
        negative,
        magnitude,
    })
}

fn strip_thousands(value: &str, integer: &str, separator: Option<char>) -> Result<String> {
    let is_separator = |c: char| match separator {
        Some(sep) if SPACE_SEPARATORS.contains(&sep) => SPACE_SEPARATORS.contains(&c),
        Some(sep) => c == sep,
        None => false,
    };
    if !integer.chars().any(is_separator) {
        ensure!(
            integer.chars().all(|c| c.is_ascii_digit()),
            "Failed to parse '{value}' as amount"
        );
        return Ok(integer.to_string());
    }
    let groups = integer.split(is_separator).collect::<Vec<_>>();
    for (idx, group) in groups.iter().enumerate() {
        let valid_len = if idx == 0 {
            (1..=3).contains(&group.len())
        } else {
            group.len() == 3
        };
        ensure!(
            valid_len && group.chars().all(|c| c.is_ascii_digit()),
            "Failed to parse '{value}' as amount: malformed digit grouping"
        );
    }
    Ok(groups.concat())
}

/// Raw amount cells for one row, already reduced to non-blank text.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmountCells<'a> {
    pub primary: Option<&'a str>,
    pub fraction: Option<&'a str>,
    pub outflow: Option<&'a str>,
    pub direction: Option<&'a str>,
}

/// Produces the canonical signed amount (positive = inflow), or `None` when
/// the row carries no amount at all.
pub fn parse_amount(cells: &AmountCells<'_>, format: &AmountFormat) -> Result<Option<Decimal>> {
    let parse = |raw: &str| {
        parse_signed_decimal(raw, format.decimal_separator, format.thousands_separator)
    };

    let amount = if format.outflow_column.is_some() {
        let inflow = cells.primary.map(parse).transpose()?;
        let outflow = cells.outflow.map(parse).transpose()?;
        match (inflow, outflow) {
            (None, None) => return Ok(None),
            (Some(inflow), None) => inflow.magnitude,
            (None, Some(outflow)) => -outflow.magnitude,
            (Some(inflow), Some(outflow)) if outflow.magnitude.is_zero() => inflow.magnitude,
            (Some(inflow), Some(outflow)) if inflow.magnitude.is_zero() => -outflow.magnitude,
            (Some(_), Some(_)) => bail!(
                "Both inflow '{}' and outflow '{}' are populated",
                cells.primary.unwrap_or_default(),
                cells.outflow.unwrap_or_default()
            ),
        }
    } else {
        let Some(raw) = cells.primary else {
            if let Some(fraction) = cells.fraction {
                bail!("Minor-unit part '{fraction}' has no major-unit amount");
            }
            return Ok(None);
        };
        let out_of_range = || anyhow!("Amount '{raw}' is out of range");
        let parsed = parse(raw)?;
        let mut magnitude = parsed.magnitude;
        if format.minor_units {
            ensure!(
                magnitude.fract().is_zero(),
                "Failed to parse '{raw}' as minor units: fractional value"
            );
            magnitude = magnitude
                .checked_div(Decimal::from(MINOR_UNITS_PER_MAJOR))
                .ok_or_else(out_of_range)?;
        }
        if format.fraction_column.is_some() {
            let fraction = cells
                .fraction
                .ok_or_else(|| anyhow!("Minor-unit part missing for amount '{raw}'"))?;
            let minor = parse_minor_part(fraction)?;
            magnitude = magnitude.checked_add(minor).ok_or_else(out_of_range)?;
        }
        Signed {
            negative: parsed.negative,
            magnitude,
        }
        .value()
    };

    let amount = match format.direction_column {
        Some(_) => apply_direction(amount, cells.direction, format)?,
        None => amount,
    };
    let signed = match format.sign {
        SignConvention::InflowPositive => amount,
        SignConvention::OutflowPositive => -amount,
    };
    Ok(Some(canonical_zero(signed)))
}

/// Signs an unsigned amount from its direction token.
fn apply_direction(
    amount: Decimal,
    direction: Option<&str>,
    format: &AmountFormat,
) -> Result<Decimal> {
    let token = direction
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| anyhow!("Direction missing for amount '{amount}'"))?;
    let listed = |values: &[String]| {
        values
            .iter()
            .any(|value| value.trim().to_lowercase() == token.to_lowercase())
    };
    if listed(&format.outflow_values) {
        Ok(-amount.abs())
    } else if format.inflow_values.is_empty() || listed(&format.inflow_values) {
        Ok(amount.abs())
    } else {
        bail!(
            "Direction '{token}' is not one of: {}",
            format
                .outflow_values
                .iter()
                .chain(&format.inflow_values)
                .map(|value| format!("'{value}'"))
                .join(", ")
        )
    }
}

fn parse_minor_part(value: &str) -> Result<Decimal> {
    let trimmed = value.trim();
    ensure!(
        !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()),
        "Failed to parse '{value}' as minor units"
    );
    let minor: i64 = trimmed
        .parse()
        .with_context(|| format!("Failed to parse '{value}' as minor units"))?;
    ensure!(
        minor < MINOR_UNITS_PER_MAJOR,
        "Minor-unit part '{value}' must be below {MINOR_UNITS_PER_MAJOR}"
    );
    Ok(Decimal::new(minor, 2))
}

/// Zero never carries a negative sign.
pub fn canonical_zero(mut value: Decimal) -> Decimal {
    if value.is_zero() {
        value.set_sign_positive(true);
    }
    value
}

pub fn parse_currency(value: &str) -> Result<String> {
    let trimmed = value.trim();
    ensure!(
        trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()),
        "Failed to parse '{value}' as ISO 4217 currency code"
    );
    Ok(trimmed.to_ascii_uppercase())
}

pub fn parse_choice(value: &str, values: &BTreeMap<String, String>) -> Result<String> {
    let trimmed = value.trim();
    values
        .iter()
        .find(|(raw, _)| raw.trim().to_lowercase() == trimmed.to_lowercase())
        .map(|(_, canonical)| canonical.clone())
        .ok_or_else(|| {
            anyhow!(
                "Value '{value}' is not one of: {}",
                values.keys().map(|k| format!("'{k}'")).join(", ")
            )
        })
}
