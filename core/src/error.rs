//! Core error types for the masked dump engine

use thiserror::Error;

/// Core error type for all dump operations
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed for table {table}: {message}")]
    Query { table: String, message: String },

    #[error("Transformer for {table}.{column} failed: {message}")]
    Transform {
        table: String,
        column: String,
        message: String,
    },

    #[error("Sink write failed: {0}")]
    Sink(#[from] std::io::Error),

    #[error("Schema export failed: {0}")]
    SchemaExport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    #[error("Table registered twice: {0}")]
    DuplicateTable(String),
}

impl DumpError {
    /// Build a query error for a table
    pub fn query(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        DumpError::Query {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error came from the output sink.
    ///
    /// Nothing may be written after a sink failure, including bracket cleanup.
    pub fn is_sink(&self) -> bool {
        matches!(self, DumpError::Sink(_))
    }

    /// Whether the error aborts the whole run rather than being recovered locally
    pub fn is_fatal_for_run(&self) -> bool {
        !matches!(self, DumpError::SchemaExport(_))
    }
}

impl From<config::ConfigError> for DumpError {
    fn from(err: config::ConfigError) -> Self {
        DumpError::Config(err.to_string())
    }
}

/// Result type alias using DumpError
pub type Result<T> = std::result::Result<T, DumpError>;
