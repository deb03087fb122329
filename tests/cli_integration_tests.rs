//! CLI Integration Tests
//!
//! Runs the `report` binary against the bundled test-data with assert_cmd.

#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

const SALES: &str = "test-data/reports/monthly-sales.yaml";
const PIVOT: &str = "test-data/reports/region-pivot.yaml";
const INVALID: &str = "test-data/reports/invalid.yaml";
const SALES_DATA: &str = "test-data/datasets/monthly-sales.json";

fn report() -> Command {
    Command::cargo_bin("report").unwrap()
}

fn preview_json(args: &[&str]) -> Value {
    let output = report()
        .args(["preview", SALES, SALES_DATA, "--json"])
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_help() {
    report()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("report"))
        .stdout(predicate::str::contains("COMMANDS"));
}

#[test]
fn test_cli_version() {
    report()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_preview_help() {
    report()
        .args(["preview", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PERIOD KEYS"));
}

// ═══════════════════════════════════════════════════════════════════════════
// PREVIEW TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_preview_human_output() {
    report()
        .args(["preview", SALES, SALES_DATA, "--period", "2024-02"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Report Preview"))
        .stdout(predicate::str::contains("February 2024"))
        .stdout(predicate::str::contains("January 2024"))
        .stdout(predicate::str::contains("Margin"))
        .stdout(predicate::str::contains("Unparseable dates: 1"));
}

#[test]
fn test_preview_json() {
    let result = preview_json(&["--period", "2024-02"]);
    assert_eq!(result["current"]["rowCount"], 2);
    assert_eq!(result["compare"]["periodKey"], "2024-01");
    assert_eq!(result["table"]["formulaRows"][0]["values"]["revenue"], 400.0);
}

#[test]
fn test_preview_compare_override_and_filter() {
    let result = preview_json(&["--period", "2024-02", "--compare", "none", "--filter", "region=West"]);
    assert!(result["compare"].is_null());
    assert_eq!(result["table"]["rows"].as_array().unwrap().len(), 1);
    assert_eq!(result["table"]["rows"][0]["region"], "West");
}

#[test]
fn test_preview_membership_filter() {
    let result = preview_json(&["--filter", "status=active,pending"]);
    // no period: every row, including the undated one
    assert!(result["current"].is_null());
    assert_eq!(result["table"]["rows"].as_array().unwrap().len(), 5);
}

#[test]
fn test_preview_pivot() {
    report()
        .args(["preview", PIVOT, "test-data/datasets/region-pivot.json", "-p", "2024-02"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Revenue growth"))
        .stdout(predicate::str::contains("East"))
        .stdout(predicate::str::contains("West"));
}

#[test]
fn test_preview_rejects_bad_compare_mode() {
    report()
        .args(["preview", SALES, SALES_DATA, "--compare", "weekly"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown compare mode"));
}

#[test]
fn test_preview_rejects_bad_filter() {
    report()
        .args(["preview", SALES, SALES_DATA, "--filter", "region"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid filter"));
}

#[test]
fn test_preview_missing_dataset() {
    report()
        .args(["preview", SALES, "does-not-exist.json"])
        .assert()
        .failure();
}

// ═══════════════════════════════════════════════════════════════════════════
// PERIODS AND VALIDATE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_periods() {
    report()
        .args(["periods", SALES, SALES_DATA])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-03"))
        .stdout(predicate::str::contains("January 2024"))
        .stdout(predicate::str::contains("1 rows have no parseable 'date'"));
}

#[test]
fn test_validate_valid_definitions() {
    report()
        .args(["validate", SALES, PIVOT])
        .assert()
        .success()
        .stdout(predicate::str::contains("Definition is valid!"));
}

#[test]
fn test_validate_invalid_definition() {
    report()
        .args(["validate", INVALID])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Found 2 issue(s)"))
        .stdout(predicate::str::contains("columns.margin"));
}

#[test]
fn test_validate_unparseable_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "id: [unclosed").unwrap();

    report()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("YAML parsing error"));
}

#[test]
fn test_verbose_logs_to_stderr() {
    report()
        .args(["--verbose", "preview", SALES, SALES_DATA, "--period", "2030-01"])
        .assert()
        .success()
        .stderr(predicate::str::contains("report_engine"));
}
