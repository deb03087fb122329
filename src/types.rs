use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A dataset record: arbitrary column names to arbitrary JSON values.
pub type Row = Map<String, Value>;

/// Column-value filters: column key to a scalar (equality) or an array (membership).
pub type Filters = BTreeMap<String, Value>;

//==============================================================================
// Report Definition Enums
//==============================================================================

/// Bucketing granularity for the report's date column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
            Cadence::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            "monthly" => Ok(Cadence::Monthly),
            "quarterly" => Ok(Cadence::Quarterly),
            "yearly" => Ok(Cadence::Yearly),
            other => Err(format!("unknown cadence '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Standard,
    Pivot,
}

/// Period-over-period comparison mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    #[default]
    None,
    /// Immediately preceding bucket at the same cadence
    Mom,
    /// Same bucket one year earlier
    Yoy,
}

impl CompareMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareMode::None => "none",
            CompareMode::Mom => "mom",
            CompareMode::Yoy => "yoy",
        }
    }
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(CompareMode::None),
            "mom" => Ok(CompareMode::Mom),
            "yoy" => Ok(CompareMode::Yoy),
            other => Err(format!("unknown compare mode '{}' (use none, mom or yoy)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Source,
    Formula,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Text,
    Number,
    Currency,
    Percent,
    Date,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Number => "number",
            DataType::Currency => "currency",
            DataType::Percent => "percent",
            DataType::Date => "date",
        }
    }

    /// Number, currency and percent cells coerce to numbers
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Number | DataType::Currency | DataType::Percent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Source,
    Formula,
    Comparison,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOutput {
    #[default]
    Value,
    Delta,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFormat {
    Text,
    #[default]
    Number,
    Currency,
    Percent,
}

impl MetricFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFormat::Text => "text",
            MetricFormat::Number => "number",
            MetricFormat::Currency => "currency",
            MetricFormat::Percent => "percent",
        }
    }

    /// Everything except text is coerced to a number
    pub fn is_numeric(&self) -> bool {
        !matches!(self, MetricFormat::Text)
    }
}

/// What the pivot layout does when several rows share one pivot value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PivotDuplicatePolicy {
    /// Numeric source metrics are summed across the rows; text keeps the first value
    #[default]
    Sum,
    /// The later row in dataset order replaces earlier ones
    LastWins,
}

//==============================================================================
// Report Definition
//==============================================================================

/// A declared table column (standard layout)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub key: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default)]
    pub order: i32,
}

impl Column {
    pub fn source(key: &str, label: &str, source_column_key: &str, order: i32) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            column_type: ColumnType::Source,
            data_type: DataType::Number,
            source_column_key: Some(source_column_key.to_string()),
            expression: None,
            order,
        }
    }

    pub fn formula(key: &str, label: &str, expression: &str, order: i32) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            column_type: ColumnType::Formula,
            data_type: DataType::Number,
            source_column_key: None,
            expression: Some(expression.to_string()),
            order,
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Dataset key a source column reads from (falls back to its own key)
    pub fn source_key(&self) -> &str {
        self.source_column_key.as_deref().unwrap_or(&self.key)
    }
}

/// An aggregate summary row such as "Total" (standard layout)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRow {
    pub key: String,
    pub label: String,
    /// Column key -> aggregate expression (e.g. "SUM", "AVG(cost)", "SUM(compare.revenue)")
    #[serde(default)]
    pub column_formulas: BTreeMap<String, String>,
    #[serde(default)]
    pub order: i32,
}

/// A metric line in the pivot layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRow {
    pub key: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub metric_type: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_row_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_period: Option<CompareMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_output: Option<CompareOutput>,
    #[serde(default)]
    pub format: MetricFormat,
    #[serde(default)]
    pub order: i32,
}

impl MetricRow {
    pub fn source(key: &str, label: &str, source_column_key: &str, order: i32) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            metric_type: MetricType::Source,
            source_column_key: Some(source_column_key.to_string()),
            expression: None,
            compare_row_key: None,
            compare_period: None,
            compare_output: None,
            format: MetricFormat::Number,
            order,
        }
    }

    pub fn formula(key: &str, label: &str, expression: &str, order: i32) -> Self {
        Self {
            metric_type: MetricType::Formula,
            source_column_key: None,
            expression: Some(expression.to_string()),
            ..Self::source(key, label, key, order)
        }
    }

    pub fn comparison(
        key: &str,
        label: &str,
        compare_row_key: &str,
        output: CompareOutput,
        order: i32,
    ) -> Self {
        Self {
            metric_type: MetricType::Comparison,
            source_column_key: None,
            compare_row_key: Some(compare_row_key.to_string()),
            compare_output: Some(output),
            format: if output == CompareOutput::Percent {
                MetricFormat::Percent
            } else {
                MetricFormat::Number
            },
            ..Self::source(key, label, key, order)
        }
    }

    pub fn with_format(mut self, format: MetricFormat) -> Self {
        self.format = format;
        self
    }

    pub fn source_key(&self) -> &str {
        self.source_column_key.as_deref().unwrap_or(&self.key)
    }
}

/// A saved report: what to bucket by, how to lay it out, what to compare against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDefinition {
    pub id: String,
    pub organization_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cadence: Cadence,
    pub date_column_key: String,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub compare_mode: CompareMode,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub formula_rows: Vec<FormulaRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_column_key: Option<String>,
    #[serde(default)]
    pub metric_rows: Vec<MetricRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_duplicates: Option<PivotDuplicatePolicy>,
}

impl ReportDefinition {
    pub fn new(id: &str, organization_id: &str, date_column_key: &str, cadence: Cadence) -> Self {
        Self {
            id: id.to_string(),
            organization_id: organization_id.to_string(),
            name: String::new(),
            cadence,
            date_column_key: date_column_key.to_string(),
            layout: Layout::Standard,
            compare_mode: CompareMode::None,
            columns: Vec::new(),
            formula_rows: Vec::new(),
            pivot_column_key: None,
            metric_rows: Vec::new(),
            pivot_duplicates: None,
        }
    }

    /// Return a copy with the unsaved overrides of a what-if preview applied
    pub fn with_live_config(&self, live: &LiveConfig) -> Self {
        let mut definition = self.clone();
        if let Some(columns) = &live.columns {
            definition.columns = columns.clone();
        }
        if let Some(formula_rows) = &live.formula_rows {
            definition.formula_rows = formula_rows.clone();
        }
        if let Some(pivot_column_key) = &live.pivot_column_key {
            definition.pivot_column_key = Some(pivot_column_key.clone());
        }
        if let Some(metric_rows) = &live.metric_rows {
            definition.metric_rows = metric_rows.clone();
        }
        definition
    }

    /// Columns in rendering order
    pub fn ordered_columns(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.iter().collect();
        columns.sort_by_key(|c| c.order);
        columns
    }

    pub fn ordered_formula_rows(&self) -> Vec<&FormulaRow> {
        let mut rows: Vec<&FormulaRow> = self.formula_rows.iter().collect();
        rows.sort_by_key(|r| r.order);
        rows
    }

    pub fn ordered_metric_rows(&self) -> Vec<&MetricRow> {
        let mut rows: Vec<&MetricRow> = self.metric_rows.iter().collect();
        rows.sort_by_key(|r| r.order);
        rows
    }
}

/// Unsaved overrides for what-if previews
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<Column>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_rows: Option<Vec<FormulaRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_column_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_rows: Option<Vec<MetricRow>>,
}

//==============================================================================
// Preview Request / Response
//==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePreviewInput {
    pub report_definition_id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_mode: Option<CompareMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_config: Option<LiveConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

impl ExecutePreviewInput {
    pub fn new(report_definition_id: &str, organization_id: &str) -> Self {
        Self {
            report_definition_id: report_definition_id.to_string(),
            organization_id: organization_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_period(mut self, period_key: &str) -> Self {
        self.current_period_key = Some(period_key.to_string());
        self
    }

    pub fn with_compare(mut self, mode: CompareMode) -> Self {
        self.compare_mode = Some(mode);
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_live_config(mut self, live: LiveConfig) -> Self {
        self.live_config = Some(live);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodInfo {
    pub period_key: String,
    pub label: String,
    pub row_count: usize,
}

/// An entry for period pickers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodOption {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub key: String,
    pub label: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRowOutput {
    pub key: String,
    pub label: String,
    /// Column key -> aggregate value (null when unavailable)
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTable {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<Row>,
    pub formula_rows: Vec<FormulaRowOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub total_database_rows: usize,
    pub parse_failures: usize,
    pub warnings: Vec<String>,
}

impl Diagnostics {
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "report_engine::diagnostics", "{}", message);
        self.warnings.push(message);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePreviewResult {
    pub current: Option<PeriodInfo>,
    pub compare: Option<PeriodInfo>,
    pub available_periods: Vec<PeriodOption>,
    pub table: ReportTable,
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_deserializes_camel_case() {
        let json = r#"{
            "id": "r1",
            "organizationId": "org",
            "cadence": "quarterly",
            "dateColumnKey": "date",
            "layout": "pivot",
            "compareMode": "yoy",
            "pivotColumnKey": "region",
            "metricRows": [
                {"key": "revenue", "label": "Revenue", "type": "source", "sourceColumnKey": "rev", "format": "currency", "order": 1},
                {"key": "growth", "label": "Growth", "type": "comparison", "compareRowKey": "revenue", "compareOutput": "percent", "format": "percent", "order": 2}
            ],
            "pivotDuplicates": "lastWins"
        }"#;
        let def: ReportDefinition = serde_json::from_str(json).unwrap();

        assert_eq!(def.cadence, Cadence::Quarterly);
        assert_eq!(def.layout, Layout::Pivot);
        assert_eq!(def.compare_mode, CompareMode::Yoy);
        assert_eq!(def.pivot_column_key.as_deref(), Some("region"));
        assert_eq!(def.metric_rows[0].source_key(), "rev");
        assert_eq!(def.metric_rows[1].compare_output, Some(CompareOutput::Percent));
        assert_eq!(def.pivot_duplicates, Some(PivotDuplicatePolicy::LastWins));
        assert!(def.columns.is_empty());
    }

    #[test]
    fn test_live_config_overrides_only_given_parts() {
        let mut def = ReportDefinition::new("r1", "org", "date", Cadence::Monthly);
        def.columns = vec![Column::source("a", "A", "a", 1)];
        def.pivot_column_key = Some("region".to_string());

        let live = LiveConfig {
            columns: Some(vec![Column::formula("b", "B", "a * 2", 1)]),
            ..LiveConfig::default()
        };
        let applied = def.with_live_config(&live);

        assert_eq!(applied.columns.len(), 1);
        assert_eq!(applied.columns[0].key, "b");
        assert_eq!(applied.pivot_column_key.as_deref(), Some("region"));
        // The saved definition is untouched
        assert_eq!(def.columns[0].key, "a");
    }

    #[test]
    fn test_ordered_columns_sorts_by_order() {
        let mut def = ReportDefinition::new("r1", "org", "date", Cadence::Monthly);
        def.columns = vec![
            Column::source("c", "C", "c", 3),
            Column::source("a", "A", "a", 1),
            Column::source("b", "B", "b", 2),
        ];
        let keys: Vec<&str> = def.ordered_columns().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_compare_mode_from_str() {
        assert_eq!("MoM".parse::<CompareMode>(), Ok(CompareMode::Mom));
        assert_eq!("yoy".parse::<CompareMode>(), Ok(CompareMode::Yoy));
        assert!("weekly".parse::<CompareMode>().is_err());
    }

    #[test]
    fn test_preview_result_serializes_null_periods() {
        let result = ExecutePreviewResult {
            current: None,
            compare: None,
            available_periods: vec![],
            table: ReportTable::default(),
            diagnostics: Diagnostics::default(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"current\":null"));
        assert!(json.contains("\"availablePeriods\":[]"));
        assert!(json.contains("\"totalDatabaseRows\":0"));
    }
}
