//! Report execution engine: periods, ingestion, filtering, formulas, layouts

pub mod dataset;
pub mod engine;
pub mod expression;
pub mod filter;
pub mod layout;
pub mod periods;
pub mod validator;

pub use dataset::{extract_column_values, parse_numeric_value, Dataset, TypedRow};
pub use engine::{run_preview, EngineOptions, ReportEngine, DEFAULT_PREVIEW_ROW_LIMIT};
pub use expression::{ExpressionCache, ExpressionSyntaxError};
pub use filter::{filter_rows_by_column_values, filter_rows_by_period, PeriodFilterResult};
pub use periods::{
    get_periods_from_rows, label_for_period_key, period_key_from_value, resolve_compare_period,
    shift_period, Period, ShiftDirection,
};
pub use validator::{validate_definition, ValidationIssue};
