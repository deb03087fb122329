use thiserror::Error;

pub use crate::core::expression::ExpressionSyntaxError;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Report definition '{report_id}' not found for organization '{organization_id}'")]
    NotFound {
        report_id: String,
        organization_id: String,
    },

    #[error("Expression syntax error: {0}")]
    ExpressionSyntax(#[from] ExpressionSyntaxError),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ReportError {
    pub fn not_found(report_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        ReportError::NotFound {
            report_id: report_id.into(),
            organization_id: organization_id.into(),
        }
    }

    /// True for lookups that missed, as opposed to infrastructure failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReportError::NotFound { .. })
    }
}
