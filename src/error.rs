//! Error types for the syndikit library.
//!
//! All fallible operations in syndikit return `Result<T, SyndError>` where
//! `SyndError` is an enum covering the various failure modes: network errors,
//! XML parsing failures, database errors, filter pipeline failures, and
//! configuration mistakes.
//!
//! Note that *feed* parse errors are deliberately not represented here. A feed
//! that parses badly still yields a best-effort result; the human-readable
//! error lines accumulate in the subscription's `parse_errors` buffer instead
//! of aborting the refresh. `SyndError` is reserved for failures that prevent
//! an operation from producing a result at all.

use std::string::FromUtf8Error;
use thiserror::Error;

/// Comprehensive error type for all syndikit operations.
///
/// Errors are categorized by their source: network issues, parsing problems,
/// storage failures, subprocess filters, or configuration mistakes. Each
/// variant includes enough context to diagnose the failure without having to
/// re-run the operation.
#[derive(Error, Debug)]
pub enum SyndError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Resource not found")]
    NotFound,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed for {0}")]
    AuthFailed(String),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8Error(#[from] FromUtf8Error),

    #[error("Filter \"{command}\" failed: {detail}")]
    FilterFailed { command: String, detail: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown subscription node \"{0}\"")]
    UnknownNode(String),

    #[error("Refresh already in flight for node \"{0}\"")]
    UpdateInFlight(String),

    #[error("Unsupported feed format")]
    UnsupportedFormat,
}

pub type Result<T> = std::result::Result<T, SyndError>;
