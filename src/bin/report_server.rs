//! Report API Server binary
//!
//! HTTP REST API for report previews.

use clap::Parser;
use report_engine::api::{run_api_server, ApiConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "report-server")]
#[command(version)]
#[command(about = "Report API Server - HTTP REST API for period-based report previews")]
#[command(long_about = r#"
Report API Server - HTTP REST API

Serves report definitions from <data-dir>/reports/<id>.{yaml,yml,json}
and datasets from <data-dir>/datasets/<id>.json.

Endpoints:
  - POST /api/v1/preview   - Render a report for one period
  - POST /api/v1/periods   - List the periods in a report's dataset
  - POST /api/v1/validate  - Strictly check a report definition

Additional endpoints:
  - GET  /health           - Health check
  - GET  /version          - Server version info
  - GET  /                 - API documentation

Features:
  - CORS enabled for cross-origin requests
  - Graceful shutdown on SIGINT/SIGTERM
  - JSON response format with request IDs
  - Tracing and structured logging (RUST_LOG)

Example usage:
  report-server --data-dir ./data
  report-server --host 0.0.0.0 --port 3000

  curl -X POST http://localhost:8080/api/v1/preview \
    -H "Content-Type: application/json" \
    -d '{"reportDefinitionId": "monthly-sales", "organizationId": "acme",
         "currentPeriodKey": "2024-02", "compareMode": "mom"}'
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "REPORT_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "REPORT_PORT")]
    port: u16,

    /// Directory holding reports/ and datasets/
    #[arg(short, long, default_value = "data", env = "REPORT_DATA_DIR")]
    data_dir: PathBuf,

    /// Maximum rows returned by a standard-layout preview
    #[arg(long, default_value = "100", env = "REPORT_PREVIEW_ROWS")]
    preview_rows: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ApiConfig {
        host: args.host,
        port: args.port,
        data_dir: args.data_dir,
        preview_row_limit: args.preview_rows,
    };

    run_api_server(config).await
}
