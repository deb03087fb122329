use crate::core::{run_preview, validate_definition, Dataset, EngineOptions};
use crate::error::{ReportError, ReportResult};
use crate::repository::{parse_dataset, parse_definition};
use crate::types::{
    CompareMode, ExecutePreviewInput, ExecutePreviewResult, Filters, PeriodInfo, ReportDefinition,
    ReportTable, Row,
};
use colored::Colorize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Format a number for display, removing unnecessary decimal places
fn format_number(n: f64) -> String {
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

pub fn load_definition(path: &Path) -> ReportResult<ReportDefinition> {
    let content = fs::read_to_string(path)?;
    parse_definition(path, &content)
}

pub fn load_dataset(path: &Path) -> ReportResult<Vec<Row>> {
    let content = fs::read_to_string(path)?;
    parse_dataset(&content)
}

/// A filter value typed the way JSON would read it: `1` is a number,
/// `true` a boolean, `"1"` (quoted) or anything else a string
fn parse_filter_value(text: &str) -> Value {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::String(_))) => value,
        _ => Value::String(text.trim().to_string()),
    }
}

/// Parse `key=value` or `key=v1,v2,...` (membership) filter arguments
pub fn parse_filters(args: &[String]) -> ReportResult<Filters> {
    let mut filters = Filters::new();
    for arg in args {
        let (key, values) = arg
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| ReportError::Validation(format!("Invalid filter '{}': use key=value", arg)))?;

        let parts: Vec<Value> = values.split(',').map(parse_filter_value).collect();
        let value = if parts.len() == 1 {
            parts.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(parts)
        };
        filters.insert(key.trim().to_string(), value);
    }
    Ok(filters)
}

/// Arguments of the preview command
#[derive(Debug, Clone, Default)]
pub struct PreviewArgs {
    pub definition: PathBuf,
    pub dataset: PathBuf,
    pub period: Option<String>,
    pub compare: Option<CompareMode>,
    pub filters: Vec<String>,
    pub json: bool,
}

/// Execute the preview command
pub fn preview(args: PreviewArgs) -> ReportResult<()> {
    let definition = load_definition(&args.definition)?;
    let rows = load_dataset(&args.dataset)?;
    let filters = parse_filters(&args.filters)?;

    let mut input = ExecutePreviewInput::new(&definition.id, &definition.organization_id);
    input.current_period_key = args.period.clone();
    input.compare_mode = args.compare;
    if !filters.is_empty() {
        input.filters = Some(filters);
    }

    let result = run_preview(&definition, rows, &input, &EngineOptions::default());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", "📊 Report Preview".bold().green());
    println!("   Report: {} ({})", definition.name.bright_blue().bold(), definition.id);
    println!("   Definition: {}", args.definition.display());
    println!("   Dataset: {}", args.dataset.display());
    println!();
    print_period("Current", result.current.as_ref());
    if let Some(compare) = &result.compare {
        print_period("Compare", Some(compare));
    }
    println!();

    print_table(&result.table);
    print_diagnostics(&result);
    Ok(())
}

fn print_period(title: &str, info: Option<&PeriodInfo>) {
    match info {
        Some(info) => println!(
            "   {}: {} ({}) - {} rows",
            title,
            info.label.bold(),
            info.period_key.cyan(),
            info.row_count
        ),
        None => println!("   {}: {}", title, "all rows".cyan()),
    }
}

/// Text cells for a table: header first, then data rows, then formula rows.
/// A leading label column carries formula-row labels when there are any.
fn table_grid(table: &ReportTable) -> Vec<Vec<String>> {
    let labelled = !table.formula_rows.is_empty();
    let lead = |label: &str| labelled.then(|| label.to_string());

    let mut grid: Vec<Vec<String>> = Vec::new();
    grid.push(
        lead("")
            .into_iter()
            .chain(table.columns.iter().map(|c| c.label.clone()))
            .collect(),
    );
    for row in &table.rows {
        grid.push(
            lead("")
                .into_iter()
                .chain(
                    table
                        .columns
                        .iter()
                        .map(|c| row.get(&c.key).map(format_cell).unwrap_or_else(|| "-".to_string())),
                )
                .collect(),
        );
    }
    for formula_row in &table.formula_rows {
        grid.push(
            lead(&formula_row.label)
                .into_iter()
                .chain(table.columns.iter().map(|c| match formula_row.values.get(&c.key) {
                    Some(Some(n)) => format_number(*n),
                    Some(None) => "-".to_string(),
                    None => String::new(),
                }))
                .collect(),
        );
    }
    grid
}

fn print_table(table: &ReportTable) {
    if table.columns.is_empty() {
        println!("{}", "⚠️  Nothing to render".yellow());
        return;
    }

    let grid = table_grid(table);
    let widths: Vec<usize> = (0..grid[0].len())
        .map(|i| grid.iter().map(|r| r[i].chars().count()).max().unwrap_or(0))
        .collect();
    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
    };

    let data_rows = table.rows.len();
    for (i, cells) in grid.iter().enumerate() {
        let line = render(cells);
        if i == 0 {
            println!("   {}", line.bold());
        } else if i > data_rows {
            println!("   {}", line.bright_yellow());
        } else {
            println!("   {}", line);
        }
    }
    println!();
}

fn print_diagnostics(result: &ExecutePreviewResult) {
    let diagnostics = &result.diagnostics;
    println!("{}", "🔍 Diagnostics:".bold().cyan());
    println!("   Rows in dataset: {}", diagnostics.total_database_rows);
    if diagnostics.parse_failures > 0 {
        println!(
            "   {}",
            format!("Unparseable dates: {}", diagnostics.parse_failures).yellow()
        );
    } else {
        println!("   Unparseable dates: 0");
    }
    for warning in &diagnostics.warnings {
        println!("   {} {}", "⚠️".yellow(), warning.yellow());
    }
}

/// Execute the periods command
pub fn periods(definition_path: PathBuf, dataset_path: PathBuf) -> ReportResult<()> {
    let definition = load_definition(&definition_path)?;
    let rows = load_dataset(&dataset_path)?;
    let dataset = Dataset::ingest(rows, &definition.date_column_key, definition.cadence);

    println!(
        "{}",
        format!("📅 Periods ({} cadence, most recent first)", definition.cadence)
            .bold()
            .green()
    );
    let options = dataset.available_periods();
    if options.is_empty() {
        println!("   {}", "No parseable dates found".yellow());
    }
    for option in &options {
        println!("   {:<12} {}", option.key.cyan(), option.label);
    }
    let failures = dataset.date_parse_failures();
    if failures > 0 {
        println!(
            "\n   {}",
            format!("{} rows have no parseable '{}'", failures, definition.date_column_key).yellow()
        );
    }
    Ok(())
}

/// Execute the validate command
pub fn validate(files: Vec<PathBuf>) -> ReportResult<()> {
    let mut failed = 0;

    for file in &files {
        println!("{}", "✅ Validating report definition".bold().green());
        println!("   File: {}", file.display());

        let definition = match load_definition(file) {
            Ok(definition) => definition,
            Err(e) => {
                println!("   {}\n", format!("❌ {}", e).bold().red());
                failed += 1;
                continue;
            }
        };

        let issues = validate_definition(&definition);
        if issues.is_empty() {
            println!("   {}\n", "✅ Definition is valid!".bold().green());
        } else {
            println!(
                "   {}",
                format!("❌ Found {} issue(s):", issues.len()).bold().red()
            );
            for issue in &issues {
                println!("      {}", issue.to_string().red());
            }
            println!();
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(ReportError::Validation(format!(
            "{} of {} definition(s) failed validation",
            failed,
            files.len()
        )));
    }
    Ok(())
}
