//! CLI command handlers

pub mod commands;

pub use commands::{periods, preview, validate, PreviewArgs};
