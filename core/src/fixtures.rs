//! In-memory database used by the engine and schema tests

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::adapter::{DumpConnection, SchemaIntrospector};
use crate::domain::{ColumnInfo, DatabaseInfo, IndexInfo, Platform, Row, SqlValue, TableMetadata};
use crate::error::{DumpError, Result};
use crate::query::{ChunkCursor, ChunkRequest, SortDirection};
use crate::sql_gen::SqlGenerator;

/// Table metadata with NOT NULL varchar columns and an optional single-column
/// primary key
pub fn table_metadata(name: &str, columns: &[&str], primary_key: Option<&str>) -> TableMetadata {
    TableMetadata {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.to_string(),
                data_type: "varchar".to_string(),
                nullable: false,
            })
            .collect(),
        indexes: primary_key
            .map(|pk| index("PRIMARY", &[pk], true, true))
            .into_iter()
            .collect(),
    }
}

pub fn index(name: &str, columns: &[&str], is_primary: bool, is_unique: bool) -> IndexInfo {
    IndexInfo {
        name: name.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        is_primary,
        is_unique,
    }
}

pub fn row(values: &[(&str, SqlValue)]) -> Row {
    values
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Rows `id = 1..=n` with a derived email address
pub fn user_rows(n: i64) -> Vec<Row> {
    (1..=n)
        .map(|id| {
            row(&[
                ("id", SqlValue::Int(id)),
                ("email", SqlValue::Text(format!("user{}@x.com", id))),
            ])
        })
        .collect()
}

/// Database kept in memory. Row filters are not evaluated; cursors, ordering
/// and limits are.
pub struct InMemoryAdapter {
    database: String,
    tables: Vec<(TableMetadata, Vec<Row>)>,
    failing_chunks: HashMap<String, usize>,
    requests: Mutex<Vec<ChunkRequest>>,
    executed: Mutex<Vec<String>>,
}

impl InMemoryAdapter {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            tables: Vec::new(),
            failing_chunks: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_table(mut self, metadata: TableMetadata, rows: Vec<Row>) -> Self {
        self.tables.push((metadata, rows));
        self
    }

    /// Fail the n-th chunk request (zero based) for a table with a query error
    pub fn failing_on_chunk(mut self, table: &str, chunk: usize) -> Self {
        self.failing_chunks.insert(table.to_string(), chunk);
        self
    }

    pub fn requests(&self) -> Vec<ChunkRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn rows_for(&self, table: &str) -> Result<&[Row]> {
        self.tables
            .iter()
            .find(|(metadata, _)| metadata.name == table)
            .map(|(_, rows)| rows.as_slice())
            .ok_or_else(|| DumpError::query(table, "table does not exist"))
    }
}

fn compare(a: &SqlValue, b: &SqlValue) -> Ordering {
    match (a, b) {
        (SqlValue::Int(a), SqlValue::Int(b)) => a.cmp(b),
        (SqlValue::UInt(a), SqlValue::UInt(b)) => a.cmp(b),
        (SqlValue::Float(a), SqlValue::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (SqlValue::Text(a), SqlValue::Text(b)) => a.cmp(b),
        (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
        (SqlValue::Null, _) => Ordering::Less,
        (_, SqlValue::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Row constructor comparison `(a, b) > (x, y)`. A NULL on either side makes
/// the comparison unknown, so the row is not selected.
fn tuple_greater(row: &Row, columns: &[String], after: &[SqlValue]) -> bool {
    for (column, bound) in columns.iter().zip(after) {
        let value = value_of(row, column);
        if matches!(value, SqlValue::Null) || matches!(bound, SqlValue::Null) {
            return false;
        }
        match compare(value, bound) {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {}
        }
    }
    false
}

fn value_of<'a>(row: &'a Row, column: &str) -> &'a SqlValue {
    row.get(column).unwrap_or(&SqlValue::Null)
}

#[async_trait]
impl SchemaIntrospector for InMemoryAdapter {
    async fn database_info(&self) -> Result<DatabaseInfo> {
        Ok(DatabaseInfo {
            name: self.database.clone(),
            platform: Platform::MySql,
        })
    }

    async fn get_tables(&self) -> Result<Vec<TableMetadata>> {
        Ok(self.tables.iter().map(|(metadata, _)| metadata.clone()).collect())
    }

    async fn render_ddl(&self, table: &TableMetadata) -> Result<String> {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{} {}", SqlGenerator::quote_identifier(&c.name), c.data_type))
            .collect();
        Ok(format!(
            "CREATE TABLE {} ({})",
            SqlGenerator::quote_identifier(&table.name),
            columns.join(", ")
        ))
    }

    fn quote(&self, value: &SqlValue) -> String {
        SqlGenerator::quote_literal(value)
    }
}

#[async_trait]
impl DumpConnection for InMemoryAdapter {
    async fn fetch_chunk(&self, request: &ChunkRequest) -> Result<Vec<Row>> {
        let table = request.query.table.as_str();
        let seen = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.iter().filter(|r| r.query.table == table).count() - 1
        };
        if self.failing_chunks.get(table) == Some(&seen) {
            return Err(DumpError::query(table, "injected failure"));
        }

        let mut rows: Vec<Row> = self.rows_for(table)?.to_vec();
        let limit = request.limit as usize;

        let selected = match &request.cursor {
            ChunkCursor::Keyset { columns, after } => {
                rows.sort_by(|a, b| {
                    columns
                        .iter()
                        .map(|c| compare(value_of(a, c), value_of(b, c)))
                        .find(|o| *o != Ordering::Equal)
                        .unwrap_or(Ordering::Equal)
                });
                rows.into_iter()
                    .filter(|r| match after {
                        Some(after) => tuple_greater(r, columns, after),
                        None => true,
                    })
                    .take(limit)
                    .collect()
            }
            ChunkCursor::Offset { offset } => {
                let order_by = &request.query.order_by;
                rows.sort_by(|a, b| {
                    order_by
                        .iter()
                        .map(|order| {
                            let ordering = compare(value_of(a, &order.column), value_of(b, &order.column));
                            match order.direction {
                                SortDirection::Asc => ordering,
                                SortDirection::Desc => ordering.reverse(),
                            }
                        })
                        .find(|o| *o != Ordering::Equal)
                        .unwrap_or(Ordering::Equal)
                });
                rows.into_iter().skip(*offset as usize).take(limit).collect()
            }
        };

        Ok(selected)
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}
