//! Pivot layout: one output row per metric, one column per pivot value
//!
//! Each pivot value is evaluated in three passes. Source metrics come first,
//! formula metrics read the source metric values of the same pivot and
//! context, and comparison metrics read the finished current and compare
//! values.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::{number_cell, LayoutContext};
use crate::core::dataset::TypedRow;
use crate::core::expression::{evaluate, ExpressionCache, Expr};
use crate::types::{
    CompareOutput, Diagnostics, MetricRow, MetricType, PivotDuplicatePolicy, ReportTable, Row,
    TableColumn,
};

pub const LABEL_KEY: &str = "_label";
pub const FORMAT_KEY: &str = "_format";

/// Round to two decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Distinct non-empty string values of the pivot column, ascending
fn pivot_values(rows: &[&TypedRow], pivot_key: &str) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|row| match row.get(pivot_key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
        .collect()
}

/// Rows per pivot value, in dataset order
fn group_rows<'r>(rows: &[&'r TypedRow], pivot_key: &str) -> HashMap<String, Vec<&'r TypedRow>> {
    let mut groups: HashMap<String, Vec<&'r TypedRow>> = HashMap::new();
    for row in rows {
        if let Some(Value::String(s)) = row.get(pivot_key) {
            groups.entry(s.clone()).or_default().push(row);
        }
    }
    groups
}

/// Numeric metric values for one pivot value in one context
type MetricValues = HashMap<String, f64>;

/// Numeric value of a source metric over the rows sharing one pivot value
fn source_number(rows: &[&TypedRow], source_key: &str, policy: PivotDuplicatePolicy) -> Option<f64> {
    match policy {
        PivotDuplicatePolicy::LastWins => rows.last()?.number(source_key),
        PivotDuplicatePolicy::Sum => {
            let values: Vec<f64> = rows.iter().filter_map(|row| row.number(source_key)).collect();
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum())
            }
        }
    }
}

/// Raw value of a text metric over the rows sharing one pivot value
fn source_text(rows: &[&TypedRow], source_key: &str, policy: PivotDuplicatePolicy) -> Value {
    let value = match policy {
        PivotDuplicatePolicy::LastWins => rows.last().and_then(|row| row.get(source_key)),
        PivotDuplicatePolicy::Sum => rows
            .iter()
            .filter_map(|row| row.get(source_key))
            .find(|v| !v.is_null()),
    };
    value.cloned().unwrap_or(Value::Null)
}

struct PivotLayout<'a> {
    metrics: Vec<&'a MetricRow>,
    /// Compiled formula metrics; broken ones are absent and render null
    formulas: HashMap<&'a str, Arc<Expr>>,
    /// Comparison metrics that can produce values
    comparable: HashMap<&'a str, CompareOutput>,
    policy: PivotDuplicatePolicy,
}

impl<'a> PivotLayout<'a> {
    fn new(
        ctx: LayoutContext<'a>,
        policy: PivotDuplicatePolicy,
        cache: &mut ExpressionCache,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let metrics = ctx.definition.ordered_metric_rows();
        let mut formulas = HashMap::new();
        let mut comparable = HashMap::new();

        for metric in metrics.iter().copied() {
            match metric.metric_type {
                MetricType::Source => {}
                MetricType::Formula => {
                    let Some(text) = metric.expression.as_deref() else {
                        diagnostics.warn(format!("Formula metric '{}' has no expression", metric.key));
                        continue;
                    };
                    match cache.compile(text) {
                        Ok(expr) if expr.contains_aggregate() => diagnostics.warn(format!(
                            "Formula metric '{}': aggregates are not allowed in pivot metrics",
                            metric.key
                        )),
                        Ok(expr) => {
                            formulas.insert(metric.key.as_str(), expr);
                        }
                        Err(err) => {
                            diagnostics.warn(format!("Formula metric '{}': {}", metric.key, err))
                        }
                    }
                }
                MetricType::Comparison => {
                    let target = metric.compare_row_key.as_deref();
                    if !target.is_some_and(|key| metrics.iter().any(|m| m.key == key)) {
                        diagnostics.warn(format!(
                            "Comparison metric '{}' does not name an existing metric",
                            metric.key
                        ));
                        continue;
                    }
                    if let Some(period) = metric.compare_period {
                        if period != ctx.compare_mode {
                            diagnostics.warn(format!(
                                "Comparison metric '{}' expects compare mode '{}' but '{}' is active",
                                metric.key, period, ctx.compare_mode
                            ));
                            continue;
                        }
                    }
                    comparable.insert(metric.key.as_str(), metric.compare_output.unwrap_or_default());
                }
            }
        }

        Self {
            metrics,
            formulas,
            comparable,
            policy,
        }
    }

    /// Pass 1 and pass 2 for one context
    fn metric_values(&self, rows: &[&TypedRow]) -> MetricValues {
        let mut sources = MetricValues::new();
        for metric in &self.metrics {
            if metric.metric_type == MetricType::Source && metric.format.is_numeric() {
                if let Some(n) = source_number(rows, metric.source_key(), self.policy) {
                    sources.insert(metric.key.clone(), n);
                }
            }
        }

        let mut values = sources.clone();
        for metric in &self.metrics {
            if let Some(expr) = self.formulas.get(metric.key.as_str()) {
                if let Some(n) = evaluate(expr, &sources) {
                    values.insert(metric.key.clone(), n);
                }
            }
        }
        values
    }

    /// Pass 3
    fn comparison_value(
        &self,
        metric: &MetricRow,
        current: &MetricValues,
        compare: Option<&MetricValues>,
    ) -> Option<f64> {
        let output = self.comparable.get(metric.key.as_str())?;
        let target = metric.compare_row_key.as_deref()?;
        let previous = compare?.get(target).copied()?;

        match output {
            CompareOutput::Value => Some(previous),
            CompareOutput::Delta => Some(round2(current.get(target).copied()? - previous)),
            CompareOutput::Percent => {
                if previous == 0.0 {
                    return None;
                }
                let now = current.get(target).copied()?;
                Some(round2((now - previous) / previous * 100.0)).filter(|v| v.is_finite())
            }
        }
    }

    fn cells_for_pivot(
        &self,
        current_rows: &[&TypedRow],
        compare_rows: Option<&[&TypedRow]>,
    ) -> HashMap<&'a str, Value> {
        let current = self.metric_values(current_rows);
        let compare = compare_rows.map(|rows| self.metric_values(rows));

        self.metrics
            .iter()
            .copied()
            .map(|metric| {
                let cell = match metric.metric_type {
                    MetricType::Source if !metric.format.is_numeric() => {
                        source_text(current_rows, metric.source_key(), self.policy)
                    }
                    MetricType::Source | MetricType::Formula => {
                        number_cell(current.get(&metric.key).copied())
                    }
                    MetricType::Comparison => {
                        number_cell(self.comparison_value(metric, &current, compare.as_ref()))
                    }
                };
                (metric.key.as_str(), cell)
            })
            .collect()
    }
}

fn duplicated_values(groups: &HashMap<String, Vec<&TypedRow>>, pivots: &BTreeSet<String>) -> usize {
    pivots
        .iter()
        .filter(|p| groups.get(*p).is_some_and(|rows| rows.len() > 1))
        .count()
}

/// Render the pivot layout. Without a pivot column or metric rows the table
/// is empty.
pub fn evaluate_pivot(
    ctx: &LayoutContext<'_>,
    policy: PivotDuplicatePolicy,
    cache: &mut ExpressionCache,
    diagnostics: &mut Diagnostics,
) -> ReportTable {
    let Some(pivot_key) = ctx.definition.pivot_column_key.as_deref() else {
        diagnostics.warn("Pivot layout has no pivot column; nothing to render");
        return ReportTable::default();
    };
    if ctx.definition.metric_rows.is_empty() {
        diagnostics.warn("Pivot layout has no metric rows; nothing to render");
        return ReportTable::default();
    }

    let layout = PivotLayout::new(*ctx, policy, cache, diagnostics);
    let pivots = pivot_values(ctx.current, pivot_key);
    let current_groups = group_rows(ctx.current, pivot_key);
    let compare_groups = ctx.compare.map(|rows| group_rows(rows, pivot_key));

    let duplicated = duplicated_values(&current_groups, &pivots)
        + compare_groups
            .as_ref()
            .map_or(0, |groups| duplicated_values(groups, &pivots));
    if duplicated > 0 {
        let resolution = match policy {
            PivotDuplicatePolicy::Sum => "numeric metrics were summed",
            PivotDuplicatePolicy::LastWins => "the last row was kept",
        };
        diagnostics.warn(format!(
            "Pivot column '{}': {} pivot value(s) matched more than one row; {}",
            pivot_key, duplicated, resolution
        ));
    }

    let mut by_pivot: BTreeMap<&str, HashMap<&str, Value>> = BTreeMap::new();
    for pivot in &pivots {
        let current_rows = current_groups.get(pivot).map(Vec::as_slice).unwrap_or_default();
        let compare_rows = compare_groups
            .as_ref()
            .map(|groups| groups.get(pivot).map(Vec::as_slice).unwrap_or_default());
        by_pivot.insert(pivot.as_str(), layout.cells_for_pivot(current_rows, compare_rows));
    }

    let mut columns = vec![TableColumn {
        key: LABEL_KEY.to_string(),
        label: "Metric".to_string(),
        column_type: None,
        data_type: None,
    }];
    columns.extend(pivots.iter().map(|pivot| TableColumn {
        key: pivot.clone(),
        label: pivot.clone(),
        column_type: None,
        data_type: None,
    }));

    let rows = layout
        .metrics
        .iter()
        .map(|metric| {
            let mut row = Row::new();
            row.insert(LABEL_KEY.to_string(), Value::String(metric.label.clone()));
            row.insert(FORMAT_KEY.to_string(), Value::String(metric.format.as_str().to_string()));
            for (pivot, cells) in &by_pivot {
                let cell = cells.get(metric.key.as_str()).cloned().unwrap_or(Value::Null);
                row.insert(pivot.to_string(), cell);
            }
            row
        })
        .collect();

    ReportTable {
        columns,
        rows,
        formula_rows: Vec::new(),
    }
}
