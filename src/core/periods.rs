//! Period bucketing for report dates
//!
//! Turns date-like cell values into canonical period keys at a cadence,
//! labels them, enumerates the periods present in a dataset and resolves
//! comparison periods (month-over-month / year-over-year).
//!
//! Key formats:
//! - daily: `2024-02-03`
//! - weekly: `2024-W05` (ISO week)
//! - monthly: `2024-02`
//! - quarterly: `2024-Q1`
//! - yearly: `2024`

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::types::{Cadence, CompareMode, PeriodOption, Row};

/// Direction of a period shift
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    Back,
    Forward,
}

/// A parsed period bucket. Ordering is chronological within one cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    Day(NaiveDate),
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
    Quarter { year: i32, quarter: u32 },
    Year(i32),
}

impl Period {
    /// Bucket a calendar date at the given cadence
    pub fn from_date(date: NaiveDate, cadence: Cadence) -> Self {
        match cadence {
            Cadence::Daily => Period::Day(date),
            Cadence::Weekly => {
                let iso = date.iso_week();
                Period::Week {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
            Cadence::Monthly => Period::Month {
                year: date.year(),
                month: date.month(),
            },
            Cadence::Quarterly => Period::Quarter {
                year: date.year(),
                quarter: (date.month() - 1) / 3 + 1,
            },
            Cadence::Yearly => Period::Year(date.year()),
        }
    }

    /// Parse a canonical key. Non-canonical spellings (e.g. `2024-2`) are rejected.
    pub fn parse(key: &str, cadence: Cadence) -> Option<Self> {
        let key = key.trim();
        let period = match cadence {
            Cadence::Daily => Period::Day(NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()?),
            Cadence::Weekly => {
                let (year, week) = key.split_once("-W")?;
                let year: i32 = year.parse().ok()?;
                let week: u32 = week.parse().ok()?;
                // Validates that the year actually has this ISO week
                NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
                Period::Week { year, week }
            }
            Cadence::Monthly => {
                let (year, month) = key.split_once('-')?;
                let year: i32 = year.parse().ok()?;
                let month: u32 = month.parse().ok()?;
                if !(1..=12).contains(&month) {
                    return None;
                }
                Period::Month { year, month }
            }
            Cadence::Quarterly => {
                let (year, quarter) = key.split_once("-Q")?;
                let year: i32 = year.parse().ok()?;
                let quarter: u32 = quarter.parse().ok()?;
                if !(1..=4).contains(&quarter) {
                    return None;
                }
                Period::Quarter { year, quarter }
            }
            Cadence::Yearly => Period::Year(key.parse().ok()?),
        };

        if period.key() == key {
            Some(period)
        } else {
            None
        }
    }

    pub fn key(&self) -> String {
        match self {
            Period::Day(date) => date.format("%Y-%m-%d").to_string(),
            Period::Week { year, week } => format!("{:04}-W{:02}", year, week),
            Period::Month { year, month } => format!("{:04}-{:02}", year, month),
            Period::Quarter { year, quarter } => format!("{:04}-Q{}", year, quarter),
            Period::Year(year) => format!("{:04}", year),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Period::Day(date) => date.format("%B %-d, %Y").to_string(),
            Period::Week { year, week } => format!("Week {}, {}", week, year),
            Period::Month { year, month } => match NaiveDate::from_ymd_opt(*year, *month, 1) {
                Some(first) => first.format("%B %Y").to_string(),
                None => self.key(),
            },
            Period::Quarter { year, quarter } => format!("Q{} {}", quarter, year),
            Period::Year(year) => year.to_string(),
        }
    }

    /// Shift by one comparison step. `None` when the target bucket does not exist.
    pub fn shift(&self, mode: CompareMode, direction: ShiftDirection) -> Option<Self> {
        let step: i32 = match direction {
            ShiftDirection::Back => -1,
            ShiftDirection::Forward => 1,
        };

        match mode {
            CompareMode::None => None,
            CompareMode::Mom => self.shift_one_bucket(step),
            CompareMode::Yoy => self.shift_one_year(step),
        }
    }

    fn shift_one_bucket(&self, step: i32) -> Option<Self> {
        match *self {
            Period::Day(date) => {
                let shifted = if step < 0 {
                    date.checked_sub_days(Days::new(1))?
                } else {
                    date.checked_add_days(Days::new(1))?
                };
                Some(Period::Day(shifted))
            }
            Period::Week { year, week } => {
                let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
                let shifted = if step < 0 {
                    monday.checked_sub_days(Days::new(7))?
                } else {
                    monday.checked_add_days(Days::new(7))?
                };
                Some(Period::from_date(shifted, Cadence::Weekly))
            }
            Period::Month { year, month } => {
                let index = year.checked_mul(12)?.checked_add(month as i32 - 1 + step)?;
                Some(Period::Month {
                    year: index.div_euclid(12),
                    month: index.rem_euclid(12) as u32 + 1,
                })
            }
            Period::Quarter { year, quarter } => {
                let index = year.checked_mul(4)?.checked_add(quarter as i32 - 1 + step)?;
                Some(Period::Quarter {
                    year: index.div_euclid(4),
                    quarter: index.rem_euclid(4) as u32 + 1,
                })
            }
            Period::Year(year) => Some(Period::Year(year.checked_add(step)?)),
        }
    }

    fn shift_one_year(&self, step: i32) -> Option<Self> {
        match *self {
            Period::Day(date) => {
                let year = date.year().checked_add(step)?;
                // Feb 29 lands on Feb 28 in a non-leap year
                date.with_year(year)
                    .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
                    .map(Period::Day)
            }
            Period::Week { year, week } => {
                // Week 53 only exists in some ISO years
                let year = year.checked_add(step)?;
                NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
                Some(Period::Week { year, week })
            }
            Period::Month { year, month } => Some(Period::Month {
                year: year.checked_add(step)?,
                month,
            }),
            Period::Quarter { year, quarter } => Some(Period::Quarter {
                year: year.checked_add(step)?,
                quarter,
            }),
            Period::Year(year) => Some(Period::Year(year.checked_add(step)?)),
        }
    }
}

/// Parse a date-like cell value.
///
/// Accepts RFC 3339 timestamps (normalised to UTC), `YYYY-MM-DD`, date-times
/// with a space or `T` separator, `YYYY/MM/DD`, `YYYY-MM` (first of month) and
/// JSON numbers as epoch milliseconds. Anything else yields `None`.
pub fn parse_date_value(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(ms) => ms,
                None => {
                    let f = n.as_f64()?;
                    if !f.is_finite() {
                        return None;
                    }
                    f.trunc() as i64
                }
            };
            DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.date_naive())
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }

    // Bare year-month
    if s.len() == 7 {
        return NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok();
    }

    None
}

/// Bucket a date-like value at the cadence. Never panics; `None` for unparseable input.
pub fn period_key_from_value(value: &Value, cadence: Cadence) -> Option<String> {
    parse_date_value(value).map(|date| Period::from_date(date, cadence).key())
}

/// Human-readable label for a key. Unparseable keys are returned unchanged.
pub fn label_for_period_key(key: &str, cadence: Cadence) -> String {
    Period::parse(key, cadence)
        .map(|p| p.label())
        .unwrap_or_else(|| key.to_string())
}

/// Period to compare against: the previous bucket (`mom`) or the same bucket a year earlier (`yoy`)
pub fn resolve_compare_period(key: &str, cadence: Cadence, mode: CompareMode) -> Option<String> {
    shift_period(key, cadence, mode, ShiftDirection::Back)
}

/// Shift a key one comparison step in either direction
pub fn shift_period(
    key: &str,
    cadence: Cadence,
    mode: CompareMode,
    direction: ShiftDirection,
) -> Option<String> {
    Period::parse(key, cadence)?
        .shift(mode, direction)
        .map(|p| p.key())
}

/// Distinct periods present in the rows, most recent first
pub fn get_periods_from_rows(
    rows: &[Row],
    date_column_key: &str,
    cadence: Cadence,
) -> Vec<PeriodOption> {
    let periods: BTreeSet<Period> = rows
        .iter()
        .filter_map(|row| row.get(date_column_key))
        .filter_map(parse_date_value)
        .map(|date| Period::from_date(date, cadence))
        .collect();

    periods_to_options(periods)
}

pub(crate) fn periods_to_options(periods: BTreeSet<Period>) -> Vec<PeriodOption> {
    periods
        .into_iter()
        .rev()
        .map(|p| PeriodOption {
            key: p.key(),
            label: p.label(),
        })
        .collect()
}
