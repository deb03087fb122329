//! Typed ingestion of loosely-typed dataset rows
//!
//! Rows arrive as arbitrary JSON objects. Ingestion runs once per load and
//! records, for every row, its period bucket (or that the date failed to
//! parse) and the numeric coercion of every cell, so the evaluation passes
//! never re-interpret raw strings. Each column also gets a coarse type
//! classification for display and diagnostics.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use super::periods::{parse_date_value, periods_to_options, Period};
use crate::types::{Cadence, DataType, PeriodOption, Row};

fn numeric_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
            r"^(?P<sign>[-+])?\s*(?P<cur>[$€£¥])?\s*(?P<sign2>[-+])?(?P<num>(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|\.\d+)(?P<exp>[eE][-+]?\d+)?\s*(?P<pct>%)?$",
            )
            .ok()
        })
        .as_ref()
}

/// How a string cell looks numerically
#[derive(Debug, Clone, Copy, PartialEq)]
struct NumericText {
    value: f64,
    currency: bool,
    percent: bool,
}

fn parse_numeric_text(s: &str) -> Option<NumericText> {
    let caps = numeric_pattern()?.captures(s.trim())?;
    let negative = match (caps.name("sign"), caps.name("sign2")) {
        (Some(_), Some(_)) => return None,
        (Some(sign), None) | (None, Some(sign)) => sign.as_str() == "-",
        (None, None) => false,
    };

    let mut text = caps["num"].replace(',', "");
    if let Some(exp) = caps.name("exp") {
        text.push_str(exp.as_str());
    }
    let magnitude: f64 = text.parse().ok()?;
    if !magnitude.is_finite() {
        return None;
    }

    Some(NumericText {
        value: if negative { -magnitude } else { magnitude },
        currency: caps.name("cur").is_some(),
        percent: caps.name("pct").is_some(),
    })
}

/// Coerce a cell to a number.
///
/// JSON numbers pass through. Strings are accepted when they are plain
/// decimals, optionally with a currency symbol, thousands separators or a
/// trailing `%` (`"12.5%"` gives `12.5`). Everything else is `None`.
pub fn parse_numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_numeric_text(s).map(|n| n.value),
        _ => None,
    }
}

/// Coarse type of a single non-null cell
fn classify_cell(value: &Value) -> Option<DataType> {
    match value {
        Value::Null => None,
        Value::Number(_) => Some(DataType::Number),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(match parse_numeric_text(s) {
            Some(n) if n.currency => DataType::Currency,
            Some(n) if n.percent => DataType::Percent,
            Some(_) => DataType::Number,
            None if parse_date_value(value).is_some() => DataType::Date,
            None => DataType::Text,
        }),
        _ => Some(DataType::Text),
    }
}

/// A dataset row with its coercions precomputed
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRow {
    raw: Row,
    numbers: HashMap<String, f64>,
    period: Option<Period>,
}

impl TypedRow {
    fn ingest(raw: Row, date_column_key: &str, cadence: Cadence) -> Self {
        let numbers = raw
            .iter()
            .filter_map(|(key, value)| parse_numeric_value(value).map(|n| (key.clone(), n)))
            .collect();
        let period = raw
            .get(date_column_key)
            .and_then(parse_date_value)
            .map(|date| Period::from_date(date, cadence));

        Self {
            raw,
            numbers,
            period,
        }
    }

    pub fn raw(&self) -> &Row {
        &self.raw
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// Numeric value of a cell, `None` when missing or non-numeric
    pub fn number(&self, key: &str) -> Option<f64> {
        self.numbers.get(key).copied()
    }

    /// Period bucket of the row's date, `None` when it failed to parse
    pub fn period(&self) -> Option<&Period> {
        self.period.as_ref()
    }
}

/// All rows of one report's dataset after ingestion
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: Vec<TypedRow>,
    profiles: BTreeMap<String, DataType>,
}

impl Dataset {
    pub fn ingest(rows: Vec<Row>, date_column_key: &str, cadence: Cadence) -> Self {
        let mut tallies: BTreeMap<String, BTreeMap<DataType, usize>> = BTreeMap::new();
        for row in &rows {
            for (key, value) in row {
                let tally = tallies.entry(key.clone()).or_default();
                if let Some(data_type) = classify_cell(value) {
                    *tally.entry(data_type).or_default() += 1;
                }
            }
        }

        // Majority wins; ties go to the first type in declaration order
        let profiles = tallies
            .into_iter()
            .map(|(key, tally)| {
                let data_type = tally
                    .into_iter()
                    .fold(None, |best: Option<(DataType, usize)>, (data_type, count)| {
                        match best {
                            Some((_, best_count)) if best_count >= count => best,
                            _ => Some((data_type, count)),
                        }
                    })
                    .map(|(data_type, _)| data_type)
                    .unwrap_or(DataType::Text);
                (key, data_type)
            })
            .collect();

        let rows = rows
            .into_iter()
            .map(|row| TypedRow::ingest(row, date_column_key, cadence))
            .collect();

        Self { rows, profiles }
    }

    pub fn rows(&self) -> &[TypedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Classified type of a column, `None` if no row carries the key
    pub fn column_type(&self, key: &str) -> Option<DataType> {
        self.profiles.get(key).copied()
    }

    /// Rows whose date column did not produce a period
    pub fn date_parse_failures(&self) -> usize {
        self.rows.iter().filter(|r| r.period.is_none()).count()
    }

    /// Distinct periods present, most recent first
    pub fn available_periods(&self) -> Vec<PeriodOption> {
        let periods: BTreeSet<Period> = self.rows.iter().filter_map(|r| r.period).collect();
        periods_to_options(periods)
    }
}

/// Numeric cells of a column across rows; non-numeric cells are skipped
pub fn extract_column_values<'a, I>(rows: I, key: &str) -> Vec<f64>
where
    I: IntoIterator<Item = &'a TypedRow>,
{
    rows.into_iter().filter_map(|row| row.number(key)).collect()
}
