//! Save-time validation of report definitions
//!
//! Preview never calls this: a preview renders whatever it can and reports
//! problems as diagnostics. Validation is the strict mode used before a
//! definition is stored.

use std::collections::HashMap;
use std::fmt;

use super::expression::{parse_aggregate_expression, parse_expression, parse_simple_aggregate_expression};
use crate::error::{ReportError, ReportResult};
use crate::types::{ColumnType, Layout, MetricType, ReportDefinition};

/// One problem found in a definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// e.g. `columns.margin` or `metricRows.growth`
    pub location: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

struct DefinitionValidator<'a> {
    definition: &'a ReportDefinition,
    issues: Vec<ValidationIssue>,
}

impl<'a> DefinitionValidator<'a> {
    fn new(definition: &'a ReportDefinition) -> Self {
        Self {
            definition,
            issues: Vec::new(),
        }
    }

    fn issue(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            location: location.into(),
            message: message.into(),
        });
    }

    fn check_unique<'k>(&mut self, section: &str, what: &str, values: impl Iterator<Item = (&'k str, String)>) {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for (key, value) in values {
            if let Some(first) = seen.insert(value.clone(), key) {
                self.issue(
                    format!("{}.{}", section, key),
                    format!("{} {} is already used by '{}'", what, value, first),
                );
            }
        }
    }

    fn check_header(&mut self) {
        let def = self.definition;
        if def.id.trim().is_empty() {
            self.issue("id", "must not be empty");
        }
        if def.organization_id.trim().is_empty() {
            self.issue("organizationId", "must not be empty");
        }
        if def.date_column_key.trim().is_empty() {
            self.issue("dateColumnKey", "must not be empty");
        }
    }

    fn check_columns(&mut self) {
        let def = self.definition;
        self.check_unique("columns", "key", def.columns.iter().map(|c| (c.key.as_str(), c.key.clone())));
        self.check_unique("columns", "order", def.columns.iter().map(|c| (c.key.as_str(), c.order.to_string())));

        for column in &def.columns {
            let location = format!("columns.{}", column.key);
            match column.column_type {
                ColumnType::Source => {
                    if column.source_column_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                        self.issue(location, "source column needs sourceColumnKey");
                    }
                }
                ColumnType::Formula => match column.expression.as_deref() {
                    None => self.issue(location, "formula column needs an expression"),
                    Some(text) => match parse_expression(text) {
                        Ok(expr) if expr.contains_aggregate() => {
                            self.issue(location, "aggregates are only allowed in formula rows")
                        }
                        Ok(_) => {}
                        Err(err) => self.issue(location, err.to_string()),
                    },
                },
            }
        }
    }

    fn check_formula_rows(&mut self) {
        let def = self.definition;
        self.check_unique(
            "formulaRows",
            "order",
            def.formula_rows.iter().map(|r| (r.key.as_str(), r.order.to_string())),
        );

        for row in &def.formula_rows {
            for (column_key, text) in &row.column_formulas {
                let location = format!("formulaRows.{}.{}", row.key, column_key);
                if parse_aggregate_expression(text).is_some()
                    || parse_simple_aggregate_expression(text).is_some()
                {
                    continue;
                }
                match parse_expression(text) {
                    Ok(expr) if expr.contains_aggregate() => {}
                    Ok(_) => self.issue(location, format!("'{}' is not an aggregate formula", text)),
                    Err(err) => self.issue(location, err.to_string()),
                }
            }
        }
    }

    fn check_metric_rows(&mut self) {
        let def = self.definition;
        self.check_unique("metricRows", "key", def.metric_rows.iter().map(|m| (m.key.as_str(), m.key.clone())));
        self.check_unique(
            "metricRows",
            "order",
            def.metric_rows.iter().map(|m| (m.key.as_str(), m.order.to_string())),
        );

        for metric in &def.metric_rows {
            let location = format!("metricRows.{}", metric.key);
            match metric.metric_type {
                MetricType::Source => {
                    if metric.source_column_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                        self.issue(location, "source metric needs sourceColumnKey");
                    }
                }
                MetricType::Formula => match metric.expression.as_deref() {
                    None => self.issue(location, "formula metric needs an expression"),
                    Some(text) => match parse_expression(text) {
                        Ok(expr) if expr.contains_aggregate() => {
                            self.issue(location, "aggregates are not allowed in pivot metrics")
                        }
                        Ok(_) => {}
                        Err(err) => self.issue(location, err.to_string()),
                    },
                },
                MetricType::Comparison => match metric.compare_row_key.as_deref() {
                    None => self.issue(location, "comparison metric needs compareRowKey"),
                    Some(target) if target == metric.key => {
                        self.issue(location, "comparison metric cannot compare itself")
                    }
                    Some(target) if !def.metric_rows.iter().any(|m| m.key == target) => {
                        self.issue(location, format!("compareRowKey '{}' is not a metric", target))
                    }
                    Some(_) => {}
                },
            }
        }
    }

    fn check_layout(&mut self) {
        let def = self.definition;
        if def.layout == Layout::Pivot {
            if def.pivot_column_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                self.issue("pivotColumnKey", "pivot layout needs a pivot column");
            }
            if def.metric_rows.is_empty() {
                self.issue("metricRows", "pivot layout needs at least one metric row");
            }
        }
    }

    fn run(mut self) -> Vec<ValidationIssue> {
        self.check_header();
        self.check_columns();
        self.check_formula_rows();
        self.check_metric_rows();
        self.check_layout();
        self.issues
    }
}

/// Every problem in a definition, in definition order
pub fn validate_definition(definition: &ReportDefinition) -> Vec<ValidationIssue> {
    DefinitionValidator::new(definition).run()
}

impl ReportDefinition {
    /// Strict check for saving. All issues are reported together.
    pub fn validate(&self) -> ReportResult<()> {
        let issues = validate_definition(self);
        if issues.is_empty() {
            return Ok(());
        }
        let messages: Vec<String> = issues.iter().map(ToString::to_string).collect();
        Err(ReportError::Validation(messages.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cadence, Column, CompareOutput, FormulaRow, MetricRow};

    fn standard() -> ReportDefinition {
        let mut def = ReportDefinition::new("r1", "org", "date", Cadence::Monthly);
        def.columns = vec![
            Column::source("revenue", "Revenue", "rev", 1),
            Column::source("cost", "Cost", "cost", 2),
            Column::formula("margin", "Margin", "(revenue - cost) / revenue", 3),
        ];
        def.formula_rows = vec![FormulaRow {
            key: "total".to_string(),
            label: "Total".to_string(),
            column_formulas: [
                ("revenue".to_string(), "SUM".to_string()),
                ("cost".to_string(), "SUM(compare.cost)".to_string()),
                ("margin".to_string(), "AVG(margin) * 100".to_string()),
            ]
            .into_iter()
            .collect(),
            order: 1,
        }];
        def
    }

    fn locations(def: &ReportDefinition) -> Vec<String> {
        validate_definition(def).into_iter().map(|i| i.location).collect()
    }

    #[test]
    fn test_valid_standard_definition() {
        assert!(standard().validate().is_ok());
    }

    #[test]
    fn test_duplicate_orders_and_keys() {
        let mut def = standard();
        def.columns[1].order = 1;
        def.columns.push(Column::source("revenue", "Again", "rev", 9));
        assert_eq!(locations(&def), vec!["columns.revenue", "columns.cost"]);
    }

    #[test]
    fn test_column_requirements() {
        let mut def = standard();
        def.columns[0].source_column_key = None;
        def.columns[2].expression = Some("revenue +".to_string());
        def.columns.push(Column::formula("bad", "Bad", "SUM(revenue)", 4));

        let issues = validate_definition(&def);
        assert_eq!(issues.len(), 3);
        assert!(issues[0].message.contains("sourceColumnKey"));
        assert!(issues[1].message.contains("Unexpected end"));
        assert!(issues[2].message.contains("only allowed in formula rows"));
    }

    #[test]
    fn test_formula_row_must_aggregate() {
        let mut def = standard();
        def.formula_rows[0]
            .column_formulas
            .insert("revenue".to_string(), "revenue * 2".to_string());
        assert_eq!(locations(&def), vec!["formulaRows.total.revenue"]);
    }

    #[test]
    fn test_pivot_requirements() {
        let mut def = ReportDefinition::new("r1", "org", "date", Cadence::Monthly);
        def.layout = Layout::Pivot;
        assert_eq!(locations(&def), vec!["pivotColumnKey", "metricRows"]);

        def.pivot_column_key = Some("region".to_string());
        def.metric_rows = vec![
            MetricRow::source("revenue", "Revenue", "rev", 1),
            MetricRow::comparison("growth", "Growth", "profit", CompareOutput::Percent, 2),
            MetricRow::comparison("self", "Self", "self", CompareOutput::Delta, 3),
        ];
        assert_eq!(locations(&def), vec!["metricRows.growth", "metricRows.self"]);
    }

    #[test]
    fn test_validate_joins_messages() {
        let mut def = standard();
        def.id = String::new();
        def.date_column_key = " ".to_string();
        let err = def.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: id: must not be empty; dateColumnKey: must not be empty"
        );
    }
}
