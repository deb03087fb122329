//! Repository integration tests
//!
//! FileRepository against the bundled test-data and against temp directories.

use pretty_assertions::assert_eq;
use report_engine::{
    CompareMode, ExecutePreviewInput, FileRepository, Layout, ReportEngine, ReportRepository,
};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, relative: &str, content: &str) {
    let path = dir.path().join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// BUNDLED TEST DATA
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_bundled_monthly_sales_preview() {
    let engine = ReportEngine::new(FileRepository::new("test-data"));
    let input = ExecutePreviewInput::new("monthly-sales", "acme").with_period("2024-02");
    let result = engine.execute_preview(&input).await.unwrap();

    // mom comes from the definition
    assert_eq!(result.compare.as_ref().unwrap().period_key, "2024-01");
    assert_eq!(result.current.as_ref().unwrap().row_count, 2);
    assert_eq!(result.diagnostics.parse_failures, 1);
    assert_eq!(result.diagnostics.total_database_rows, 6);

    let margins: Vec<_> = result.table.rows.iter().map(|r| r["margin"].clone()).collect();
    assert_eq!(margins, vec![json!(0.4), json!(0.4)]);

    let total = &result.table.formula_rows[0];
    assert_eq!(total.label, "Total");
    assert_eq!(total.values["revenue"], Some(400.0));
    assert_eq!(total.values["cost"], Some(240.0));

    let change = &result.table.formula_rows[1];
    assert_eq!(change.values["revenue"], Some(100.0));
    assert_eq!(change.values["cost"], Some(30.0));
}

#[tokio::test]
async fn test_bundled_region_pivot() {
    let engine = ReportEngine::new(FileRepository::new("test-data"));
    let input = ExecutePreviewInput::new("region-pivot", "acme").with_period("2024-02");
    let result = engine.execute_preview(&input).await.unwrap();

    let labels: Vec<_> = result.table.rows.iter().map(|r| r["_label"].clone()).collect();
    assert_eq!(
        labels,
        vec![json!("Revenue"), json!("Cost"), json!("Profit"), json!("Revenue growth")]
    );
    assert_eq!(result.table.rows[2]["East"], json!(60.0));
    assert_eq!(result.table.rows[2]["West"], json!(100.0));
    assert_eq!(result.table.rows[3]["East"], json!(50.0));
    assert_eq!(result.table.rows[3]["West"], json!(25.0));
}

#[tokio::test]
async fn test_bundled_pivot_compare_override_mismatch() {
    let engine = ReportEngine::new(FileRepository::new("test-data"));
    let input = ExecutePreviewInput::new("region-pivot", "acme")
        .with_period("2024-02")
        .with_compare(CompareMode::Yoy);
    let result = engine.execute_preview(&input).await.unwrap();

    // growth is declared for mom
    assert_eq!(result.table.rows[3]["East"], json!(null));
    assert!(result.diagnostics.warnings.iter().any(|w| w.contains("growth")));
}

// ═══════════════════════════════════════════════════════════════════════════
// FILE LAYOUT
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_json_definition_and_missing_dataset() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "reports/weekly.json",
        r#"{"id": "weekly", "organizationId": "acme", "cadence": "weekly",
            "dateColumnKey": "day", "layout": "pivot", "pivotColumnKey": "team"}"#,
    );

    let repo = FileRepository::new(dir.path());
    let definition = repo.get_report_definition("weekly", "acme").await.unwrap();
    assert_eq!(definition.layout, Layout::Pivot);
    assert!(repo.get_dataset_rows("weekly", "acme").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_other_organization_is_not_found() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "reports/r1.yaml",
        "id: r1\norganizationId: acme\ndateColumnKey: date\n",
    );

    let repo = FileRepository::new(dir.path());
    let err = repo.get_report_definition("r1", "globex").await.unwrap_err();
    assert!(err.is_not_found());
    let err = repo.get_report_definition("../r1", "acme").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_malformed_dataset_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, "reports/r1.yaml", "id: r1\norganizationId: acme\ndateColumnKey: date\n");
    write(&dir, "datasets/r1.json", "{\"not\": \"an array\"}");

    let repo = FileRepository::new(dir.path());
    let err = repo.get_dataset_rows("r1", "acme").await.unwrap_err();
    assert!(!err.is_not_found());
}
