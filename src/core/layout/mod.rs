//! Table construction for the two report layouts

pub mod pivot;
pub mod standard;

use serde_json::{Number, Value};

use super::dataset::TypedRow;
use super::expression::ExpressionCache;
use crate::types::{CompareMode, Diagnostics, Layout, PivotDuplicatePolicy, ReportDefinition, ReportTable};

pub use pivot::evaluate_pivot;
pub use standard::evaluate_standard;

/// The filtered row sets a layout renders from
#[derive(Debug, Clone, Copy)]
pub struct LayoutContext<'a> {
    pub definition: &'a ReportDefinition,
    pub current: &'a [&'a TypedRow],
    /// `None` when no compare period is active or it could not be resolved
    pub compare: Option<&'a [&'a TypedRow]>,
    pub compare_mode: CompareMode,
}

/// Layout knobs that do not live on the definition
#[derive(Debug, Clone, Copy)]
pub struct LayoutSettings {
    pub row_limit: usize,
    pub pivot_duplicates: PivotDuplicatePolicy,
}

/// Build the table for the definition's layout
pub fn evaluate_layout(
    ctx: &LayoutContext<'_>,
    settings: &LayoutSettings,
    cache: &mut ExpressionCache,
    diagnostics: &mut Diagnostics,
) -> ReportTable {
    tracing::debug!(
        layout = ?ctx.definition.layout,
        current_rows = ctx.current.len(),
        compare_rows = ?ctx.compare.map(|rows| rows.len()),
        "evaluating layout"
    );

    match ctx.definition.layout {
        Layout::Standard => evaluate_standard(ctx, settings.row_limit, cache, diagnostics),
        Layout::Pivot => {
            let policy = ctx
                .definition
                .pivot_duplicates
                .unwrap_or(settings.pivot_duplicates);
            evaluate_pivot(ctx, policy, cache, diagnostics)
        }
    }
}

/// A computed number as a cell; `None` becomes JSON null
pub(crate) fn number_cell(value: Option<f64>) -> Value {
    value
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
