//! Report Engine - period-aware report tables from flat datasets
//!
//! This library turns a stored report definition and a flat list of dataset
//! rows into a rendered table for one reporting period, optionally compared
//! against a prior period.
//!
//! # Features
//!
//! - Daily, weekly (ISO), monthly, quarterly and yearly period bucketing
//! - Previous-period and year-over-year comparison
//! - Restricted arithmetic formulas with SUM/AVG/COUNT/MIN/MAX aggregates
//! - Standard (one row per record) and pivot (metrics by dimension) layouts
//! - Diagnostics instead of failures for bad data and bad formulas
//!
//! # Example
//!
//! ```no_run
//! use report_engine::{ExecutePreviewInput, FileRepository, ReportEngine};
//!
//! # async fn run() -> report_engine::ReportResult<()> {
//! let engine = ReportEngine::new(FileRepository::new("test-data"));
//! let input = ExecutePreviewInput::new("monthly-sales", "acme").with_period("2024-02");
//! let result = engine.execute_preview(&input).await?;
//!
//! println!("Rows: {}", result.table.rows.len());
//! println!("Warnings: {}", result.diagnostics.warnings.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod error;
pub mod repository;
pub mod types;

// Re-export commonly used types
pub use crate::core::{run_preview, EngineOptions, ReportEngine};
pub use error::{ReportError, ReportResult};
pub use repository::{FileRepository, InMemoryRepository, ReportRepository};
pub use types::{
    Cadence, Column, CompareMode, ExecutePreviewInput, ExecutePreviewResult, Filters, Layout,
    MetricRow, ReportDefinition, ReportTable, Row,
};
