//! Loading report definitions and dataset rows
//!
//! The engine only sees the [`ReportRepository`] trait. Callers are expected
//! to have authorized the organization already; implementations scope every
//! lookup to it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{ReportError, ReportResult};
use crate::types::{ReportDefinition, Row};

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn get_report_definition(
        &self,
        report_id: &str,
        organization_id: &str,
    ) -> ReportResult<ReportDefinition>;

    async fn get_dataset_rows(&self, report_id: &str, organization_id: &str) -> ReportResult<Vec<Row>>;
}

#[async_trait]
impl<T: ReportRepository + ?Sized> ReportRepository for Arc<T> {
    async fn get_report_definition(
        &self,
        report_id: &str,
        organization_id: &str,
    ) -> ReportResult<ReportDefinition> {
        (**self).get_report_definition(report_id, organization_id).await
    }

    async fn get_dataset_rows(&self, report_id: &str, organization_id: &str) -> ReportResult<Vec<Row>> {
        (**self).get_dataset_rows(report_id, organization_id).await
    }
}

//==============================================================================
// In-memory
//==============================================================================

type Key = (String, String);

fn key(report_id: &str, organization_id: &str) -> Key {
    (organization_id.to_string(), report_id.to_string())
}

/// Definitions and datasets held in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    definitions: RwLock<HashMap<Key, ReportDefinition>>,
    datasets: RwLock<HashMap<Key, Vec<Row>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a definition under its own id and organization, with its rows
    pub fn insert(&self, definition: ReportDefinition, rows: Vec<Row>) {
        let k = key(&definition.id, &definition.organization_id);
        self.datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(k.clone(), rows);
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(k, definition);
    }

    pub fn with_report(self, definition: ReportDefinition, rows: Vec<Row>) -> Self {
        self.insert(definition, rows);
        self
    }
}

#[async_trait]
impl ReportRepository for InMemoryRepository {
    async fn get_report_definition(
        &self,
        report_id: &str,
        organization_id: &str,
    ) -> ReportResult<ReportDefinition> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key(report_id, organization_id))
            .cloned()
            .ok_or_else(|| ReportError::not_found(report_id, organization_id))
    }

    async fn get_dataset_rows(&self, report_id: &str, organization_id: &str) -> ReportResult<Vec<Row>> {
        Ok(self
            .datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key(report_id, organization_id))
            .cloned()
            .unwrap_or_default())
    }
}

//==============================================================================
// Files
//==============================================================================

const DEFINITION_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Reads `<root>/reports/<id>.{yaml,yml,json}` and `<root>/datasets/<id>.json`
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids become file names, so anything that could leave the directory is refused
    fn is_safe_id(report_id: &str) -> bool {
        !report_id.is_empty()
            && report_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    fn definition_path(&self, report_id: &str) -> Option<PathBuf> {
        DEFINITION_EXTENSIONS
            .iter()
            .map(|ext| self.root.join("reports").join(format!("{}.{}", report_id, ext)))
            .find(|path| path.is_file())
    }

    fn dataset_path(&self, report_id: &str) -> PathBuf {
        self.root.join("datasets").join(format!("{}.json", report_id))
    }
}

/// Parse a definition file by extension: `.json` is JSON, anything else YAML
pub fn parse_definition(path: &Path, content: &str) -> ReportResult<ReportDefinition> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Parse a dataset file: a JSON array of objects
pub fn parse_dataset(content: &str) -> ReportResult<Vec<Row>> {
    Ok(serde_json::from_str(content)?)
}

#[async_trait]
impl ReportRepository for FileRepository {
    async fn get_report_definition(
        &self,
        report_id: &str,
        organization_id: &str,
    ) -> ReportResult<ReportDefinition> {
        if !Self::is_safe_id(report_id) {
            return Err(ReportError::not_found(report_id, organization_id));
        }
        let path = self
            .definition_path(report_id)
            .ok_or_else(|| ReportError::not_found(report_id, organization_id))?;

        let content = tokio::fs::read_to_string(&path).await?;
        let definition = parse_definition(&path, &content)?;

        // Another organization's report is indistinguishable from a missing one
        if definition.organization_id != organization_id {
            return Err(ReportError::not_found(report_id, organization_id));
        }
        tracing::debug!(report_id, path = %path.display(), "loaded report definition");
        Ok(definition)
    }

    async fn get_dataset_rows(&self, report_id: &str, organization_id: &str) -> ReportResult<Vec<Row>> {
        if !Self::is_safe_id(report_id) {
            return Err(ReportError::not_found(report_id, organization_id));
        }
        let path = self.dataset_path(report_id);
        if !path.is_file() {
            tracing::debug!(report_id, "no dataset file; treating as empty");
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        parse_dataset(&content)
    }
}
