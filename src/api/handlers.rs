//! API request handlers
//!
//! Handlers for all REST API endpoints. Every body is wrapped in
//! [`ApiResponse`] with a fresh request id.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::server::AppState;
use crate::core::{validate_definition, ValidationIssue};
use crate::error::ReportError;
use crate::types::{ExecutePreviewInput, ExecutePreviewResult, PeriodOption, ReportDefinition};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// A failed request: the engine error plus the status it maps to
#[derive(Debug)]
pub struct ApiError(pub ReportError);

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ReportError::NotFound { .. } => StatusCode::NOT_FOUND,
            ReportError::Validation(_) | ReportError::ExpressionSyntax(_) => StatusCode::BAD_REQUEST,
            ReportError::Yaml(_) | ReportError::Json(_) | ReportError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(path: &str, method: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Report API Server".to_string(),
        version: state.version.clone(),
        description: "Period-based report previews over flat datasets".to_string(),
        endpoints: vec![
            endpoint("/health", "GET", "Health check endpoint"),
            endpoint("/version", "GET", "Get server version"),
            endpoint("/api/v1/preview", "POST", "Render a report for one period"),
            endpoint("/api/v1/periods", "POST", "List the periods in a report's dataset"),
            endpoint("/api/v1/validate", "POST", "Strictly check a report definition"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: vec![
            "preview".to_string(),
            "periods".to_string(),
            "validate".to_string(),
        ],
    }))
}

/// POST /api/v1/preview - Execute a preview
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ExecutePreviewInput>,
) -> Result<Json<ApiResponse<ExecutePreviewResult>>, ApiError> {
    let result = state.engine.execute_preview(&input).await?;
    Ok(Json(ApiResponse::ok(result)))
}

/// Periods request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodsRequest {
    pub report_definition_id: String,
    pub organization_id: String,
}

/// Periods response
#[derive(Debug, Serialize, Deserialize)]
pub struct PeriodsResponse {
    pub periods: Vec<PeriodOption>,
}

/// POST /api/v1/periods - Periods present in a report's dataset
pub async fn periods(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PeriodsRequest>,
) -> Result<Json<ApiResponse<PeriodsResponse>>, ApiError> {
    let periods = state
        .engine
        .available_periods(&req.report_definition_id, &req.organization_id)
        .await?;
    Ok(Json(ApiResponse::ok(PeriodsResponse { periods })))
}

/// Validate request: an unsaved definition
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub definition: ReportDefinition,
}

/// Validate response
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// POST /api/v1/validate - Strictly check a definition
pub async fn validate(Json(req): Json<ValidateRequest>) -> impl IntoResponse {
    let issues: Vec<ValidationIssue> = validate_definition(&req.definition);
    Json(ApiResponse::ok(ValidateResponse {
        valid: issues.is_empty(),
        issues: issues.iter().map(ToString::to_string).collect(),
    }))
}
