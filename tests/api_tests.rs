//! API integration tests
//!
//! Requests go through the full router (CORS and tracing layers included)
//! with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use report_engine::api::{build_router, ApiConfig, AppState};
use report_engine::core::EngineOptions;
use report_engine::repository::{FileRepository, ReportRepository};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let repository: Arc<dyn ReportRepository> = Arc::new(FileRepository::new("test-data"));
    build_router(Arc::new(AppState::new(repository, EngineOptions::default())))
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = app().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(uri: &str) -> (StatusCode, Value) {
    send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post(uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIG TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_config_default() {
    let config = ApiConfig::default();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 8080);
    assert_eq!(config.preview_row_limit, 100);
}

// ═══════════════════════════════════════════════════════════════════════════
// INFO ENDPOINTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_root_lists_endpoints() {
    let (status, body) = get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Report API Server");
    let paths: Vec<&str> = body["data"]["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["path"].as_str())
        .collect();
    assert!(paths.contains(&"/api/v1/preview"));
}

#[tokio::test]
async fn test_health_and_version() {
    let (status, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["request_id"].as_str().unwrap().len(), 36);

    let (_, body) = get("/version").await;
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
}

// ═══════════════════════════════════════════════════════════════════════════
// PREVIEW
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_preview_with_compare() {
    let (status, body) = post(
        "/api/v1/preview",
        json!({
            "reportDefinitionId": "monthly-sales",
            "organizationId": "acme",
            "currentPeriodKey": "2024-02",
            "compareMode": "mom"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["current"]["periodKey"], "2024-02");
    assert_eq!(data["current"]["label"], "February 2024");
    assert_eq!(data["compare"]["periodKey"], "2024-01");
    assert_eq!(data["compare"]["rowCount"], 2);
    assert_eq!(data["table"]["rows"].as_array().unwrap().len(), 2);
    assert_eq!(data["diagnostics"]["parseFailures"], 1);
}

#[tokio::test]
async fn test_preview_with_filters_and_live_config() {
    let (status, body) = post(
        "/api/v1/preview",
        json!({
            "reportDefinitionId": "monthly-sales",
            "organizationId": "acme",
            "currentPeriodKey": "2024-02",
            "filters": {"status": "active"},
            "liveConfig": {
                "columns": [
                    {"key": "revenue", "label": "Revenue", "type": "source", "sourceColumnKey": "rev", "order": 1}
                ],
                "formulaRows": []
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let table = &body["data"]["table"];
    assert_eq!(table["columns"].as_array().unwrap().len(), 1);
    assert_eq!(table["rows"], json!([{"revenue": 150}]));
    assert_eq!(table["formulaRows"], json!([]));
}

#[tokio::test]
async fn test_preview_unknown_report_is_404() {
    let (status, body) = post(
        "/api/v1/preview",
        json!({"reportDefinitionId": "missing", "organizationId": "acme"}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("missing"));
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_preview_wrong_organization_is_404() {
    let (status, _) = post(
        "/api/v1/preview",
        json!({"reportDefinitionId": "monthly-sales", "organizationId": "globex"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════════════
// PERIODS AND VALIDATE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_periods() {
    let (status, body) = post(
        "/api/v1/periods",
        json!({"reportDefinitionId": "monthly-sales", "organizationId": "acme"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["periods"],
        json!([
            {"key": "2024-03", "label": "March 2024"},
            {"key": "2024-02", "label": "February 2024"},
            {"key": "2024-01", "label": "January 2024"}
        ])
    );
}

#[tokio::test]
async fn test_validate_reports_issues() {
    let (status, body) = post(
        "/api/v1/validate",
        json!({
            "definition": {
                "id": "r1",
                "organizationId": "acme",
                "dateColumnKey": "date",
                "columns": [
                    {"key": "a", "label": "A", "type": "source", "sourceColumnKey": "a", "order": 1},
                    {"key": "b", "label": "B", "type": "formula", "expression": "a *", "order": 1}
                ]
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["issues"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_validate_accepts_bundled_definition() {
    let text = std::fs::read_to_string("test-data/reports/region-pivot.yaml").unwrap();
    let definition: Value = serde_yaml::from_str(&text).unwrap();
    let (_, body) = post("/api/v1/validate", json!({ "definition": definition })).await;
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["issues"], json!([]));
}
