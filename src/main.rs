use clap::{Parser, Subcommand};
use report_engine::cli::{self, PreviewArgs};
use report_engine::error::ReportResult;
use report_engine::types::CompareMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "report")]
#[command(about = "Preview period-based reports from a definition and a dataset.")]
#[command(long_about = "Report - period-aware report tables from flat datasets

Buckets dataset rows into daily, weekly, monthly, quarterly or yearly
periods, evaluates formula columns and aggregate rows, and renders a
standard or pivot table with an optional prior-period comparison.

COMMANDS:
  preview   - Render a report for one period
  periods   - List the periods present in a dataset
  validate  - Strictly check report definitions

EXAMPLES:
  report preview sales.yaml sales.json --period 2024-02 --compare mom
  report preview sales.yaml sales.json --filter region=East,West --json
  report periods sales.yaml sales.json
  report validate reports/*.yaml")]
#[command(version)]
struct Cli {
    /// Log engine decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Render a report for one period.

Rows are bucketed by the definition's date column and cadence. Without
--period every row is used and no comparison is made.

PERIOD KEYS:
  daily      2024-02-15
  weekly     2024-W07   (ISO weeks)
  monthly    2024-02
  quarterly  2024-Q1
  yearly     2024

COMPARISON:
  mom  - the immediately preceding period at the same cadence
  yoy  - the same period one year earlier

FILTERS:
  --filter key=value        exact match (1 is a number, \"1\" a string)
  --filter key=v1,v2        any of the listed values

Problems with data or formulas never abort the preview; they are listed
under Diagnostics.")]
    /// Render a report for one period
    Preview {
        /// Report definition (.yaml, .yml or .json)
        definition: PathBuf,

        /// Dataset rows (JSON array of objects)
        dataset: PathBuf,

        /// Period key to report on (e.g. 2024-02)
        #[arg(short, long)]
        period: Option<String>,

        /// Comparison mode: none, mom or yoy (defaults to the definition's)
        #[arg(short, long)]
        compare: Option<CompareMode>,

        /// Column filter, repeatable: key=value or key=v1,v2
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the periods present in a dataset, most recent first
    Periods {
        /// Report definition (.yaml, .yml or .json)
        definition: PathBuf,

        /// Dataset rows (JSON array of objects)
        dataset: PathBuf,
    },

    #[command(long_about = "Strictly check report definitions.

Unlike preview, which renders what it can, validation rejects:
  - duplicate column, formula row or metric row orders
  - duplicate keys
  - formulas that do not parse
  - aggregates outside formula rows
  - comparison metrics pointing at unknown metrics
  - pivot layouts without a pivot column or metrics

BATCH VALIDATION:
  report validate a.yaml b.yaml c.json")]
    /// Strictly check report definitions
    Validate {
        /// Definition file(s) to validate
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("report_engine=debug")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ReportResult<()> {
    let cli = Cli::parse();
    if cli.verbose {
        init_tracing();
    }

    match cli.command {
        Commands::Preview {
            definition,
            dataset,
            period,
            compare,
            filters,
            json,
        } => cli::preview(PreviewArgs {
            definition,
            dataset,
            period,
            compare,
            filters,
            json,
        }),

        Commands::Periods { definition, dataset } => cli::periods(definition, dataset),

        Commands::Validate { files } => cli::validate(files),
    }
}
