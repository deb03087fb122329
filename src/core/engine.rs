//! Report execution: load, bucket, filter, lay out
//!
//! [`run_preview`] is the pure computation. [`ReportEngine`] wraps it with a
//! repository so callers can go from ids to a rendered table.

use std::borrow::Cow;

use super::dataset::{Dataset, TypedRow};
use super::expression::ExpressionCache;
use super::filter::{filter_rows_by_column_values, filter_rows_by_period};
use super::layout::{evaluate_layout, LayoutContext, LayoutSettings};
use super::periods::{label_for_period_key, resolve_compare_period, Period};
use crate::error::ReportResult;
use crate::repository::ReportRepository;
use crate::types::{
    ColumnType, CompareMode, Diagnostics, ExecutePreviewInput, ExecutePreviewResult, Layout,
    MetricType, PeriodInfo, PeriodOption, PivotDuplicatePolicy, ReportDefinition, Row,
};

pub const DEFAULT_PREVIEW_ROW_LIMIT: usize = 100;

/// Engine-wide settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum rendered rows in a standard-layout preview
    pub preview_row_limit: usize,
    /// Used when the definition does not declare its own policy
    pub pivot_duplicates: PivotDuplicatePolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            preview_row_limit: DEFAULT_PREVIEW_ROW_LIMIT,
            pivot_duplicates: PivotDuplicatePolicy::Sum,
        }
    }
}

/// One period's row subset after both filters
struct PeriodRows<'a> {
    key: String,
    rows: Vec<&'a TypedRow>,
}

impl PeriodRows<'_> {
    fn info(&self, definition: &ReportDefinition) -> PeriodInfo {
        PeriodInfo {
            period_key: self.key.clone(),
            label: label_for_period_key(&self.key, definition.cadence),
            row_count: self.rows.len(),
        }
    }
}

/// Warn about source columns read as numbers whose data profiles as
/// something else. Their non-numeric cells evaluate as missing.
fn check_column_profiles(definition: &ReportDefinition, dataset: &Dataset, diagnostics: &mut Diagnostics) {
    let numeric_sources: Vec<(&str, &str)> = match definition.layout {
        Layout::Standard => definition
            .ordered_columns()
            .into_iter()
            .filter(|c| c.column_type == ColumnType::Source && c.data_type.is_numeric())
            .map(|c| (c.key.as_str(), c.source_key()))
            .collect(),
        Layout::Pivot => definition
            .ordered_metric_rows()
            .into_iter()
            .filter(|m| m.metric_type == MetricType::Source && m.format.is_numeric())
            .map(|m| (m.key.as_str(), m.source_key()))
            .collect(),
    };

    for (key, source) in numeric_sources {
        if let Some(profile) = dataset.column_type(source).filter(|t| !t.is_numeric()) {
            diagnostics.warn(format!(
                "'{}' reads '{}' as a number but its values look like {}; non-numeric cells are treated as missing",
                key,
                source,
                profile.as_str()
            ));
        }
    }
}

/// Execute a preview over rows that are already loaded.
///
/// Never fails: bad dates, formulas and periods end up in the diagnostics.
pub fn run_preview(
    definition: &ReportDefinition,
    rows: Vec<Row>,
    input: &ExecutePreviewInput,
    options: &EngineOptions,
) -> ExecutePreviewResult {
    let definition = match &input.live_config {
        Some(live) => Cow::Owned(definition.with_live_config(live)),
        None => Cow::Borrowed(definition),
    };
    let cadence = definition.cadence;
    let compare_mode = input.compare_mode.unwrap_or(definition.compare_mode);

    let dataset = Dataset::ingest(rows, &definition.date_column_key, cadence);
    let available_periods = dataset.available_periods();
    let mut diagnostics = Diagnostics {
        total_database_rows: dataset.len(),
        ..Diagnostics::default()
    };
    tracing::debug!(
        report_id = %definition.id,
        rows = dataset.len(),
        periods = available_periods.len(),
        %cadence,
        "dataset ingested"
    );

    let current_key = input
        .current_period_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let (mut current, mut compare) = match current_key {
        Some(key) => {
            if Period::parse(key, cadence).is_none() {
                diagnostics.warn(format!("Period key '{}' is not a valid {} period", key, cadence));
            }
            let filtered = filter_rows_by_period(dataset.rows(), key, cadence);
            // Every row is examined once here, so failures are counted once
            diagnostics.parse_failures = filtered.parse_failures;
            let current = PeriodRows {
                key: key.to_string(),
                rows: filtered.rows,
            };

            let compare = match compare_mode {
                CompareMode::None => None,
                mode => match resolve_compare_period(key, cadence, mode) {
                    Some(compare_key) => {
                        let filtered = filter_rows_by_period(dataset.rows(), &compare_key, cadence);
                        Some(PeriodRows {
                            key: compare_key,
                            rows: filtered.rows,
                        })
                    }
                    None => {
                        diagnostics.warn(format!(
                            "No {} compare period for '{}' at {} cadence",
                            mode, key, cadence
                        ));
                        None
                    }
                },
            };
            (current, compare)
        }
        None => {
            if compare_mode != CompareMode::None {
                diagnostics.warn(format!(
                    "Compare mode '{}' ignored: no current period selected",
                    compare_mode
                ));
            }
            let all = PeriodRows {
                key: String::new(),
                rows: dataset.rows().iter().collect(),
            };
            (all, None)
        }
    };

    if let Some(filters) = input.filters.as_ref().filter(|f| !f.is_empty()) {
        current.rows = filter_rows_by_column_values(&current.rows, filters);
        if let Some(compare) = compare.as_mut() {
            compare.rows = filter_rows_by_column_values(&compare.rows, filters);
        }
    }

    let current_info = current_key.map(|_| current.info(&definition));
    let compare_info = compare.as_ref().map(|c| c.info(&definition));
    tracing::debug!(
        current_rows = current.rows.len(),
        compare_rows = ?compare.as_ref().map(|c| c.rows.len()),
        parse_failures = diagnostics.parse_failures,
        "rows filtered"
    );

    let ctx = LayoutContext {
        definition: definition.as_ref(),
        current: &current.rows,
        compare: compare.as_ref().map(|c| c.rows.as_slice()),
        compare_mode,
    };
    let settings = LayoutSettings {
        row_limit: options.preview_row_limit,
        pivot_duplicates: options.pivot_duplicates,
    };
    check_column_profiles(&definition, &dataset, &mut diagnostics);
    let mut cache = ExpressionCache::new();
    let table = evaluate_layout(&ctx, &settings, &mut cache, &mut diagnostics);

    ExecutePreviewResult {
        current: current_info,
        compare: compare_info,
        available_periods,
        table,
        diagnostics,
    }
}

/// Runs previews against a repository
#[derive(Debug, Clone)]
pub struct ReportEngine<R> {
    repository: R,
    options: EngineOptions,
}

impl<R: ReportRepository> ReportEngine<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Load the definition and rows, then compute. Repository failures
    /// (including an unknown report) are the only errors.
    pub async fn execute_preview(&self, input: &ExecutePreviewInput) -> ReportResult<ExecutePreviewResult> {
        let (definition, rows) = self.load(&input.report_definition_id, &input.organization_id).await?;
        Ok(run_preview(&definition, rows, input, &self.options))
    }

    /// Periods present in a report's dataset, most recent first
    pub async fn available_periods(
        &self,
        report_id: &str,
        organization_id: &str,
    ) -> ReportResult<Vec<PeriodOption>> {
        let (definition, rows) = self.load(report_id, organization_id).await?;
        let dataset = Dataset::ingest(rows, &definition.date_column_key, definition.cadence);
        Ok(dataset.available_periods())
    }

    async fn load(&self, report_id: &str, organization_id: &str) -> ReportResult<(ReportDefinition, Vec<Row>)> {
        let definition = self
            .repository
            .get_report_definition(report_id, organization_id)
            .await?;
        let rows = self
            .repository
            .get_dataset_rows(report_id, organization_id)
            .await?;
        tracing::info!(report_id, organization_id, rows = rows.len(), "report loaded");
        Ok((definition, rows))
    }
}
