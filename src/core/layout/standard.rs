//! Standard layout: one output row per dataset row, plus aggregate summary rows
//!
//! Formula columns see only the row's source columns. They cannot reference
//! other formula columns, so every row evaluates in a single pass.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{number_cell, LayoutContext};
use crate::core::dataset::{extract_column_values, TypedRow};
use crate::core::expression::{
    compute_aggregate, evaluate, parse_aggregate_expression, parse_simple_aggregate_expression,
    AggregateCall, AggregateContext, Bindings, ExpressionCache, Expr,
};
use crate::types::{
    Column, ColumnType, Diagnostics, FormulaRow, FormulaRowOutput, ReportTable, Row, TableColumn,
};

struct StandardLayout<'a> {
    ctx: LayoutContext<'a>,
    columns: Vec<&'a Column>,
    /// Compiled formula columns; broken ones are absent and render null
    formulas: HashMap<&'a str, Arc<Expr>>,
}

impl<'a> StandardLayout<'a> {
    fn new(ctx: LayoutContext<'a>, cache: &mut ExpressionCache, diagnostics: &mut Diagnostics) -> Self {
        let columns = ctx.definition.ordered_columns();
        let mut formulas = HashMap::new();

        for column in columns.iter().filter(|c| c.column_type == ColumnType::Formula) {
            let Some(text) = column.expression.as_deref() else {
                diagnostics.warn(format!("Formula column '{}' has no expression", column.key));
                continue;
            };
            match cache.compile(text) {
                Ok(expr) if expr.contains_aggregate() => diagnostics.warn(format!(
                    "Formula column '{}': aggregates are only allowed in formula rows",
                    column.key
                )),
                Ok(expr) => {
                    formulas.insert(column.key.as_str(), expr);
                }
                Err(err) => diagnostics.warn(format!("Formula column '{}': {}", column.key, err)),
            }
        }

        Self {
            ctx,
            columns,
            formulas,
        }
    }

    fn source_columns(&self) -> impl Iterator<Item = &'a Column> + '_ {
        self.columns
            .iter()
            .copied()
            .filter(|c| c.column_type == ColumnType::Source)
    }

    /// Numeric context for one row: source columns by column key, and by
    /// dataset key where no report column already uses that name
    fn bindings(&self, row: &TypedRow) -> HashMap<String, f64> {
        let mut bindings = HashMap::new();
        for column in self.source_columns() {
            if let Some(n) = row.number(column.source_key()) {
                bindings.insert(column.key.clone(), n);
            }
        }
        for column in self.source_columns() {
            let raw = column.source_key();
            let shadowed = self.columns.iter().any(|c| c.key == raw);
            if !shadowed {
                if let Some(n) = row.number(raw) {
                    bindings.insert(raw.to_string(), n);
                }
            }
        }
        bindings
    }

    fn formula_value(&self, column: &Column, bindings: &HashMap<String, f64>) -> Option<f64> {
        let expr = self.formulas.get(column.key.as_str())?;
        evaluate(expr, bindings)
    }

    fn render_row(&self, row: &TypedRow) -> Row {
        let bindings = self.bindings(row);
        let mut out = Row::new();
        for column in &self.columns {
            let cell = match column.column_type {
                ColumnType::Source => row.get(column.source_key()).cloned().unwrap_or(Value::Null),
                ColumnType::Formula => number_cell(self.formula_value(column, &bindings)),
            };
            out.insert(column.key.clone(), cell);
        }
        out
    }

    /// Numeric values of a column over a row set. Report column keys win over
    /// dataset keys; a formula column yields its computed values.
    fn column_values(&self, name: &str, rows: &[&TypedRow]) -> Vec<f64> {
        match self.columns.iter().find(|c| c.key == name) {
            Some(column) if column.column_type == ColumnType::Formula => rows
                .iter()
                .filter_map(|row| self.formula_value(column, &self.bindings(row)))
                .collect(),
            Some(column) => extract_column_values(rows.iter().copied(), column.source_key()),
            None => extract_column_values(rows.iter().copied(), name),
        }
    }

    fn formula_cell(
        &self,
        formula_row: &FormulaRow,
        column_key: &str,
        text: &str,
        cache: &mut ExpressionCache,
        diagnostics: &mut Diagnostics,
    ) -> Option<f64> {
        if let Some(call) = parse_aggregate_expression(text) {
            return self.aggregate(&call);
        }

        if let Some(simple) = parse_simple_aggregate_expression(text) {
            let call = AggregateCall {
                function: simple.function,
                context: None,
                column: simple.column.unwrap_or_else(|| column_key.to_string()),
            };
            return self.aggregate(&call);
        }

        match cache.compile(text) {
            Ok(expr) if expr.contains_aggregate() => evaluate(&expr, self),
            Ok(_) => {
                diagnostics.warn(format!(
                    "Formula row '{}', column '{}': unrecognized formula '{}'",
                    formula_row.key, column_key, text
                ));
                None
            }
            Err(err) => {
                diagnostics.warn(format!(
                    "Formula row '{}', column '{}': {}",
                    formula_row.key, column_key, err
                ));
                None
            }
        }
    }

    fn formula_row(
        &self,
        formula_row: &FormulaRow,
        cache: &mut ExpressionCache,
        diagnostics: &mut Diagnostics,
    ) -> FormulaRowOutput {
        let values = formula_row
            .column_formulas
            .iter()
            .map(|(column_key, text)| {
                let value = self.formula_cell(formula_row, column_key, text, cache, diagnostics);
                (column_key.clone(), value)
            })
            .collect();

        FormulaRowOutput {
            key: formula_row.key.clone(),
            label: formula_row.label.clone(),
            values,
        }
    }
}

impl Bindings for StandardLayout<'_> {
    /// Summary rows have no per-row values
    fn value(&self, _name: &str) -> Option<f64> {
        None
    }

    fn aggregate(&self, call: &AggregateCall) -> Option<f64> {
        let rows = match call.context {
            None | Some(AggregateContext::Current) => self.ctx.current,
            Some(AggregateContext::Compare) => self.ctx.compare?,
        };
        compute_aggregate(call.function, &self.column_values(&call.column, rows))
    }
}

/// Render the standard layout. Only the first `row_limit` current rows are
/// rendered; summary rows aggregate over all of them.
pub fn evaluate_standard(
    ctx: &LayoutContext<'_>,
    row_limit: usize,
    cache: &mut ExpressionCache,
    diagnostics: &mut Diagnostics,
) -> ReportTable {
    let layout = StandardLayout::new(*ctx, cache, diagnostics);

    let columns = layout
        .columns
        .iter()
        .map(|c| TableColumn {
            key: c.key.clone(),
            label: c.label.clone(),
            column_type: Some(c.column_type),
            data_type: Some(c.data_type),
        })
        .collect();

    let rows = ctx
        .current
        .iter()
        .take(row_limit)
        .map(|row| layout.render_row(row))
        .collect();

    let formula_rows = ctx
        .definition
        .ordered_formula_rows()
        .into_iter()
        .map(|formula_row| layout.formula_row(formula_row, cache, diagnostics))
        .collect();

    ReportTable {
        columns,
        rows,
        formula_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Dataset;
    use crate::types::{Cadence, CompareMode, ReportDefinition};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn dataset(values: Vec<Value>) -> Dataset {
        let rows = values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        Dataset::ingest(rows, "date", Cadence::Monthly)
    }

    fn definition() -> ReportDefinition {
        let mut def = ReportDefinition::new("r1", "org", "date", Cadence::Monthly);
        def.columns = vec![
            Column::source("revenue", "Revenue", "rev", 1),
            Column::source("cost", "Cost", "cost", 2),
            Column::formula("margin", "Margin", "(revenue-cost)/revenue", 3),
        ];
        def
    }

    fn render(
        def: &ReportDefinition,
        current: &Dataset,
        compare: Option<&Dataset>,
        row_limit: usize,
    ) -> (ReportTable, Diagnostics) {
        let current_rows: Vec<&TypedRow> = current.rows().iter().collect();
        let compare_rows: Option<Vec<&TypedRow>> = compare.map(|d| d.rows().iter().collect());
        let ctx = LayoutContext {
            definition: def,
            current: &current_rows,
            compare: compare_rows.as_deref(),
            compare_mode: CompareMode::Mom,
        };
        let mut cache = ExpressionCache::new();
        let mut diagnostics = Diagnostics::default();
        let table = evaluate_standard(&ctx, row_limit, &mut cache, &mut diagnostics);
        (table, diagnostics)
    }

    fn formula_row(key: &str, formulas: &[(&str, &str)]) -> FormulaRow {
        FormulaRow {
            key: key.to_string(),
            label: key.to_uppercase(),
            column_formulas: formulas
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            order: 1,
        }
    }

    #[test]
    fn test_formula_column_margin() {
        let ds = dataset(vec![json!({"rev": 200, "cost": 150, "extra": "x"})]);
        let (table, diagnostics) = render(&definition(), &ds, None, 100);

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["revenue"], json!(200));
        assert_eq!(table.rows[0]["cost"], json!(150));
        assert_eq!(table.rows[0]["margin"], json!(0.25));
        assert!(!table.rows[0].contains_key("extra"));
        assert!(diagnostics.warnings.is_empty());
    }

    #[test]
    fn test_columns_follow_order() {
        let mut def = definition();
        def.columns.reverse();
        let ds = dataset(vec![]);
        let (table, _) = render(&def, &ds, None, 100);

        let keys: Vec<&str> = table.columns.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["revenue", "cost", "margin"]);
        assert_eq!(table.columns[2].column_type, Some(ColumnType::Formula));
    }

    #[test]
    fn test_formula_columns_cannot_chain() {
        let mut def = definition();
        def.columns
            .push(Column::formula("double_margin", "2x", "margin * 2", 4));
        let ds = dataset(vec![json!({"rev": 200, "cost": 150})]);
        let (table, _) = render(&def, &ds, None, 100);

        assert_eq!(table.rows[0]["double_margin"], Value::Null);
    }

    #[test]
    fn test_formula_binds_raw_source_key_when_not_shadowed() {
        let mut def = definition();
        def.columns
            .push(Column::formula("per_unit", "Per unit", "rev / 4", 4));
        let ds = dataset(vec![json!({"rev": 200, "cost": 150})]);
        let (table, _) = render(&def, &ds, None, 100);

        assert_eq!(table.rows[0]["per_unit"], json!(50.0));
    }

    #[test]
    fn test_missing_and_non_numeric_cells_give_null() {
        let ds = dataset(vec![
            json!({"rev": "abc", "cost": 150}),
            json!({"rev": 0, "cost": 10}),
            json!({"cost": 10}),
        ]);
        let (table, _) = render(&definition(), &ds, None, 100);

        assert_eq!(table.rows[0]["revenue"], json!("abc"));
        assert_eq!(table.rows[0]["margin"], Value::Null);
        assert_eq!(table.rows[1]["margin"], Value::Null);
        assert_eq!(table.rows[2]["revenue"], Value::Null);
    }

    #[test]
    fn test_broken_formula_column_warns_and_renders_null() {
        let mut def = definition();
        def.columns
            .push(Column::formula("bad", "Bad", "revenue +", 4));
        let ds = dataset(vec![json!({"rev": 200, "cost": 150}), json!({"rev": 100, "cost": 50})]);
        let (table, diagnostics) = render(&def, &ds, None, 100);

        assert_eq!(table.rows[0]["bad"], Value::Null);
        assert_eq!(diagnostics.warnings.len(), 1);
        assert!(diagnostics.warnings[0].contains("'bad'"));
    }

    #[test]
    fn test_row_limit_caps_rendered_rows_not_aggregates() {
        let ds = dataset((1..=5).map(|i| json!({"rev": i, "cost": 0})).collect());
        let mut def = definition();
        def.formula_rows = vec![formula_row("total", &[("revenue", "SUM")])];
        let (table, _) = render(&def, &ds, None, 2);

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.formula_rows[0].values["revenue"], Some(15.0));
    }

    #[test]
    fn test_formula_row_dispatch() {
        let current = dataset(vec![
            json!({"rev": 200, "cost": 150}),
            json!({"rev": 100, "cost": 50}),
        ]);
        let compare = dataset(vec![json!({"rev": 90, "cost": 30})]);
        let mut def = definition();
        def.formula_rows = vec![formula_row(
            "summary",
            &[
                ("revenue", "SUM"),
                ("cost", "AVG(cost)"),
                ("margin", "AVG"),
                ("prior", "SUM(compare.revenue)"),
                ("now", "SUM(current.rev)"),
                ("growth", "SUM(current.revenue) - SUM(compare.revenue)"),
                ("count", "count(revenue)"),
            ],
        )];
        let (table, diagnostics) = render(&def, &current, Some(&compare), 100);

        let values = &table.formula_rows[0].values;
        let expected: BTreeMap<String, Option<f64>> = [
            ("revenue", Some(300.0)),
            ("cost", Some(100.0)),
            ("margin", Some(0.375)),
            ("prior", Some(90.0)),
            ("now", Some(300.0)),
            ("growth", Some(210.0)),
            ("count", Some(2.0)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        assert_eq!(values, &expected);
        assert!(diagnostics.warnings.is_empty());
    }

    #[test]
    fn test_compare_aggregate_without_compare_rows_is_null() {
        let ds = dataset(vec![json!({"rev": 200, "cost": 150})]);
        let mut def = definition();
        def.formula_rows = vec![formula_row("prior", &[("revenue", "SUM(compare.revenue)")])];
        let (table, _) = render(&def, &ds, None, 100);

        assert_eq!(table.formula_rows[0].values["revenue"], None);
    }

    #[test]
    fn test_aggregates_over_empty_rows() {
        let ds = dataset(vec![]);
        let mut def = definition();
        def.formula_rows = vec![formula_row(
            "t",
            &[("revenue", "SUM"), ("cost", "AVG"), ("margin", "COUNT")],
        )];
        let (table, _) = render(&def, &ds, None, 100);

        let values = &table.formula_rows[0].values;
        assert_eq!(values["revenue"], Some(0.0));
        assert_eq!(values["cost"], None);
        assert_eq!(values["margin"], Some(0.0));
    }

    #[test]
    fn test_unrecognized_formula_row_warns() {
        let ds = dataset(vec![json!({"rev": 200, "cost": 150})]);
        let mut def = definition();
        def.formula_rows = vec![formula_row(
            "odd",
            &[("revenue", "revenue * 2"), ("cost", "MEDIAN(cost)")],
        )];
        let (table, diagnostics) = render(&def, &ds, None, 100);

        assert_eq!(table.formula_rows[0].values["revenue"], None);
        assert_eq!(table.formula_rows[0].values["cost"], None);
        assert_eq!(diagnostics.warnings.len(), 2);
        assert!(diagnostics.warnings.iter().any(|w| w.contains("unrecognized formula")));
        assert!(diagnostics.warnings.iter().any(|w| w.contains("Unknown function")));
    }
}
