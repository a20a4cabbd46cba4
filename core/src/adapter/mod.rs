//! Database collaborator abstractions consumed by the dump engine

use crate::domain::{DatabaseInfo, Row, SqlValue, TableMetadata};
use crate::error::Result;
use crate::query::ChunkRequest;
use async_trait::async_trait;

pub mod mysql;

pub use mysql::MySqlAdapter;

/// Schema introspection and dialect rendering
///
/// Answers which tables exist, how to recreate them, and how to write a
/// value as a literal of the target dialect.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Database name and platform
    async fn database_info(&self) -> Result<DatabaseInfo>;

    /// All base tables, in a stable order
    async fn get_tables(&self) -> Result<Vec<TableMetadata>>;

    /// A single CREATE TABLE statement for the table
    async fn render_ddl(&self, table: &TableMetadata) -> Result<String>;

    /// Dialect-correct literal for a value
    fn quote(&self, value: &SqlValue) -> String;
}

/// Row extraction and raw statement execution
#[async_trait]
pub trait DumpConnection: Send + Sync {
    /// Fetch one bounded, ordered chunk of rows
    async fn fetch_chunk(&self, request: &ChunkRequest) -> Result<Vec<Row>>;

    /// Execute a statement that returns no rows (LOCK/UNLOCK and friends)
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// Everything the dump needs from a database
pub trait DatabaseAdapter: SchemaIntrospector + DumpConnection {}

impl<T: SchemaIntrospector + DumpConnection + ?Sized> DatabaseAdapter for T {}
