//! Row filtering: by period bucket, then by column values
//!
//! Both filters borrow from the ingested dataset; nothing is copied.

use serde_json::Value;

use super::dataset::TypedRow;
use super::periods::Period;
use crate::types::{Cadence, Filters, Row};

/// Rows kept by a period filter and the number dropped for unparseable dates
#[derive(Debug, Clone, Default)]
pub struct PeriodFilterResult<'a> {
    pub rows: Vec<&'a TypedRow>,
    pub parse_failures: usize,
}

/// Keep rows whose period equals `target_key`.
///
/// The date column is the one the dataset was ingested with. Rows whose date
/// failed to parse are dropped and counted; a target key that is not a valid
/// key at the cadence matches nothing.
pub fn filter_rows_by_period<'a>(
    rows: &'a [TypedRow],
    target_key: &str,
    cadence: Cadence,
) -> PeriodFilterResult<'a> {
    let target = Period::parse(target_key, cadence);
    let mut result = PeriodFilterResult::default();

    for row in rows {
        match row.period() {
            None => result.parse_failures += 1,
            Some(period) if Some(*period) == target => result.rows.push(row),
            Some(_) => {}
        }
    }

    result
}

/// AND of all non-null filters. A row missing a filtered key fails that filter.
pub fn filter_rows_by_column_values<'a>(rows: &[&'a TypedRow], filters: &Filters) -> Vec<&'a TypedRow> {
    rows.iter()
        .copied()
        .filter(|row| row_matches_filters(row.raw(), filters))
        .collect()
}

/// Whether one raw row passes every active filter
pub fn row_matches_filters(row: &Row, filters: &Filters) -> bool {
    filters.iter().all(|(key, expected)| {
        if expected.is_null() {
            return true;
        }
        let Some(actual) = row.get(key) else {
            return false;
        };
        match expected {
            Value::Array(allowed) => allowed.iter().any(|candidate| strict_equals(actual, candidate)),
            _ => strict_equals(actual, expected),
        }
    })
}

/// Type-strict equality: `1` never equals `"1"`, while `1` equals `1.0`
fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r,
        },
        _ => left == right,
    }
}
