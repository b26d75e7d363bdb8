//! Error types for the tallybridge library.

use std::io;
use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while parsing statements, building Tally XML,
/// or talking to the Tally server.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred during read or write operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error reading the statement grid.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Error building or parsing XML.
    #[error("XML error: {0}")]
    Xml(String),

    /// Invalid date format.
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    /// Invalid amount format.
    #[error("Invalid amount format: {0}")]
    InvalidAmount(String),

    /// No row containing both the Date and Narration markers was found.
    /// Callers treat this as "zero transactions", not a hard abort.
    #[error("Could not find transaction header row in statement")]
    HeaderNotFound,

    /// Missing master data or an unknown voucher type, detected before
    /// the ERP write is attempted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network-level failure talking to the Tally server. No retry.
    #[error("Tally connection failed: {0}")]
    Transport(String),

    /// Tally accepted the connection but rejected the content. The message
    /// is the LINEERROR text verbatim.
    #[error("Tally rejected request: {0}")]
    ErpRejection(String),

    /// No stored statement with the given id.
    #[error("Statement not found: {0}")]
    StatementNotFound(String),

    /// Error from the local mirror database.
    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Error reading the configuration file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error serializing to or from JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
