use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use log::debug;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::mapper::FieldMapping;
use crate::models::{EntityType, NormalizedRecord, RawRow, Rejection, Value};
use crate::schema::{fields_for, FieldKind};

/// How `,` and `.` are read in amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DecimalLocale {
    /// Both present: `.` groups and `,` is decimal. Only one present: it is
    /// the decimal separator, unless it repeats, in which case it groups.
    #[default]
    Auto,
    /// `1.234,56`
    Comma,
    /// `1,234.56`
    Period,
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

pub fn normalize_text(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn ymd_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").expect("valid regex"))
}

fn dmy_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})").expect("valid regex"))
}

/// Year-first, then day-first. The first pattern found decides; an impossible
/// calendar date there is null rather than a retry with the other pattern.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if let Some(c) = ymd_pattern().captures(s) {
        return NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
    }
    if let Some(c) = dmy_pattern().captures(s) {
        return NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[2].parse().ok()?, c[1].parse().ok()?);
    }
    None
}

pub fn parse_decimal(raw: &str, locale: DecimalLocale) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    if body.contains('-') {
        return None;
    }

    let commas = body.matches(',').count();
    let periods = body.matches('.').count();
    let (group, decimal) = match locale {
        DecimalLocale::Comma => ('.', ','),
        DecimalLocale::Period => (',', '.'),
        DecimalLocale::Auto if commas > 0 && periods > 0 => ('.', ','),
        DecimalLocale::Auto if commas > 1 => (',', '.'),
        DecimalLocale::Auto if periods > 1 => ('.', ','),
        DecimalLocale::Auto if commas == 1 => ('.', ','),
        DecimalLocale::Auto => (',', '.'),
    };

    let mut digits: String = body
        .chars()
        .filter(|c| *c != group)
        .map(|c| if c == decimal { '.' } else { c })
        .collect();
    if negative {
        digits.insert(0, '-');
    }
    Decimal::from_str(&digits).ok()
}

pub fn parse_identifier(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

fn coerce(kind: FieldKind, raw: &str, locale: DecimalLocale) -> Option<Value> {
    match kind {
        FieldKind::Text => normalize_text(raw).map(Value::Text),
        FieldKind::Date => parse_date(raw).map(Value::Date),
        FieldKind::Decimal => parse_decimal(raw, locale).map(Value::Decimal),
        FieldKind::Identifier => parse_identifier(raw).map(Value::Id),
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Coerce one row. `Err` names the first required field left null.
pub fn normalize_row(
    entity: EntityType,
    row: &RawRow,
    mapping: &FieldMapping,
    locale: DecimalLocale,
) -> std::result::Result<NormalizedRecord, Rejection> {
    let mut record = NormalizedRecord::new(row.line);
    for spec in fields_for(entity) {
        let value = mapping
            .header(spec.field)
            .and_then(|header| coerce(spec.kind, row.get(header), locale));
        if spec.required && value.is_none() {
            return Err(Rejection {
                line: row.line,
                reason: format!("missing required field `{}`", spec.field),
            });
        }
        record.set(spec.field, value);
    }
    Ok(record)
}

pub struct Normalized {
    pub candidates: Vec<NormalizedRecord>,
    pub rejections: Vec<Rejection>,
}

pub fn normalize_rows(
    entity: EntityType,
    rows: &[RawRow],
    mapping: &FieldMapping,
    locale: DecimalLocale,
) -> Normalized {
    let mut candidates = Vec::with_capacity(rows.len());
    let mut rejections = Vec::new();
    for row in rows {
        match normalize_row(entity, row, mapping, locale) {
            Ok(record) => candidates.push(record),
            Err(rejection) => {
                debug!("Line {} dropped: {}", rejection.line, rejection.reason);
                rejections.push(rejection);
            }
        }
    }
    Normalized {
        candidates,
        rejections,
    }
}
