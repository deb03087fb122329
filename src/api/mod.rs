//! Report API Server module
//!
//! HTTP REST API over the report engine.
//! Run with `report-server`.

pub mod handlers;
pub mod server;

pub use server::{build_router, run_api_server, ApiConfig, AppState};
