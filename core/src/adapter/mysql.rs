//! MySQL / MariaDB adapter implementation

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as SqlxRow, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::adapter::{DumpConnection, SchemaIntrospector};
use crate::domain::{ColumnInfo, DatabaseInfo, IndexInfo, Platform, Row, SqlValue, TableMetadata};
use crate::error::{DumpError, Result};
use crate::query::{ChunkCursor, ChunkRequest};
use crate::sql_gen::SqlGenerator;

/// Pseudo table name used in errors raised while introspecting
const INFORMATION_SCHEMA: &str = "information_schema";

/// MySQL database adapter
///
/// Holds a pool of exactly one connection so that session state such as
/// `LOCK TABLES` applies to the reads that follow it.
pub struct MySqlAdapter {
    pool: MySqlPool,
    /// Schema being dumped
    database: String,
}

impl MySqlAdapter {
    pub fn new(pool: MySqlPool, database: String) -> Self {
        Self { pool, database }
    }

    /// Open a single-connection pool and read the selected database from it
    pub async fn connect(options: MySqlConnectOptions) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| DumpError::Connection(e.to_string()))?;

        let database: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
            .fetch_one(&pool)
            .await
            .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))?;
        let database = database.ok_or_else(|| {
            DumpError::Config("connection URL does not select a database".to_string())
        })?;

        info!("Connected to MySQL database {}", database);
        Ok(Self::new(pool, database))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT CAST(TABLE_NAME AS CHAR) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#,
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("TABLE_NAME")
                    .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))
            })
            .collect()
    }

    async fn columns_by_table(&self) -> Result<HashMap<String, Vec<ColumnInfo>>> {
        let rows = sqlx::query(
            r#"
            SELECT
                CAST(TABLE_NAME AS CHAR) AS TABLE_NAME,
                CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR) AS COLUMN_TYPE,
                CAST(IS_NULLABLE AS CHAR) AS IS_NULLABLE
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME, ORDINAL_POSITION
            "#,
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))?;

        let mut columns: HashMap<String, Vec<ColumnInfo>> = HashMap::new();
        for row in rows {
            let table: String = row
                .try_get("TABLE_NAME")
                .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))?;
            let name: String = row
                .try_get("COLUMN_NAME")
                .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))?;
            let data_type: String = row.try_get("COLUMN_TYPE").unwrap_or_default();
            let is_nullable: String = row.try_get("IS_NULLABLE").unwrap_or_default();

            columns.entry(table).or_default().push(ColumnInfo {
                name,
                data_type,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
            });
        }
        Ok(columns)
    }

    async fn indexes_by_table(&self) -> Result<HashMap<String, Vec<IndexInfo>>> {
        let rows = sqlx::query(
            r#"
            SELECT
                CAST(TABLE_NAME AS CHAR) AS TABLE_NAME,
                CAST(INDEX_NAME AS CHAR) AS INDEX_NAME,
                CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME,
                CAST(NON_UNIQUE AS SIGNED) AS NON_UNIQUE
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX
            "#,
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let table: String = row
                .try_get("TABLE_NAME")
                .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))?;
            let index: String = row
                .try_get("INDEX_NAME")
                .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))?;
            // Functional index parts have no column
            let column: Option<String> = row.try_get("COLUMN_NAME").ok().flatten();
            let non_unique: i64 = row.try_get("NON_UNIQUE").unwrap_or(1);

            if let Some(column) = column {
                entries.push(IndexEntry {
                    table,
                    index,
                    column,
                    unique: non_unique == 0,
                });
            }
        }
        Ok(group_indexes(entries))
    }
}

/// One row of information_schema.STATISTICS
#[derive(Debug, Clone)]
struct IndexEntry {
    table: String,
    index: String,
    column: String,
    unique: bool,
}

/// Fold index rows (ordered by table, index, position) into per-table indexes
fn group_indexes(entries: Vec<IndexEntry>) -> HashMap<String, Vec<IndexInfo>> {
    let mut indexes: HashMap<String, Vec<IndexInfo>> = HashMap::new();
    for entry in entries {
        let table_indexes = indexes.entry(entry.table).or_default();
        match table_indexes.iter_mut().find(|i| i.name == entry.index) {
            Some(existing) => existing.columns.push(entry.column),
            None => table_indexes.push(IndexInfo {
                is_primary: entry.index == "PRIMARY",
                is_unique: entry.unique,
                name: entry.index,
                columns: vec![entry.column],
            }),
        }
    }
    indexes
}

/// Server-side failures belong to the statement, everything else to the connection
fn map_sqlx_error(table: &str, err: sqlx::Error) -> DumpError {
    match err {
        sqlx::Error::Database(db) => DumpError::query(table, db.message()),
        other => DumpError::Connection(other.to_string()),
    }
}

/// Session statements (`LOCK TABLES`, `UNLOCK TABLES`) belong to no single
/// introspection query; report them by their text
fn map_execute_error(sql: &str, err: sqlx::Error) -> DumpError {
    DumpError::Connection(format!("{}: {}", sql, err))
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::UInt(u) => query.bind(*u),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
    }
}

/// Decode one column by its driver type name
fn decode_value(row: &MySqlRow, index: usize, type_name: &str) -> std::result::Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let type_name = type_name.to_uppercase();
    let value = match type_name.as_str() {
        t if t.ends_with("UNSIGNED") => SqlValue::UInt(row.try_get_unchecked::<u64, _>(index)?),
        "BOOLEAN" => SqlValue::Bool(row.try_get(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            SqlValue::Int(row.try_get_unchecked::<i64, _>(index)?)
        }
        "FLOAT" => {
            // Shortest decimal form of the f32, not its widened f64 expansion
            let value: f32 = row.try_get(index)?;
            SqlValue::Float(value.to_string().parse().unwrap_or(f64::from(value)))
        }
        "DOUBLE" => SqlValue::Float(row.try_get(index)?),
        "DECIMAL" => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
        // Zero dates and TIME values past 24h have no chrono form
        "DATETIME" | "TIMESTAMP" => match row.try_get::<NaiveDateTime, _>(index) {
            Ok(value) => SqlValue::Text(value.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Err(_) => SqlValue::Text(temporal_text(row, index, &type_name)?),
        },
        "DATE" => match row.try_get::<NaiveDate, _>(index) {
            Ok(value) => SqlValue::Text(value.format("%Y-%m-%d").to_string()),
            Err(_) => SqlValue::Text(temporal_text(row, index, &type_name)?),
        },
        "TIME" => SqlValue::Text(temporal_text(row, index, &type_name)?),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT"
        | "GEOMETRY" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        "NULL" => SqlValue::Null,
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) => SqlValue::Text(text),
            Err(_) => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        },
    };
    Ok(value)
}

/// Temporal value as MySQL prints it, from the raw column bytes
fn temporal_text(row: &MySqlRow, index: usize, type_name: &str) -> std::result::Result<String, sqlx::Error> {
    let raw: &[u8] = row.try_get_unchecked(index)?;
    if let Some(text) = format_binary_temporal(type_name, raw) {
        return Ok(text);
    }
    // Text protocol values arrive already formatted
    String::from_utf8(raw.to_vec()).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Format a binary protocol DATE, DATETIME, TIMESTAMP or TIME value. `raw`
/// starts with the length byte; an empty body is the zero value.
///
/// Returns `None` when the bytes are not a binary temporal value.
fn format_binary_temporal(type_name: &str, raw: &[u8]) -> Option<String> {
    let (&len, body) = raw.split_first()?;
    if body.len() != len as usize {
        return None;
    }

    if type_name == "TIME" {
        let (negative, hours, minutes, seconds, micros) = match body.len() {
            0 => (false, 0, 0, 0, 0),
            8 | 12 => {
                let days = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
                let micros = match body.get(8..12) {
                    Some(m) => u32::from_le_bytes([m[0], m[1], m[2], m[3]]),
                    None => 0,
                };
                (body[0] == 1, u64::from(days) * 24 + u64::from(body[5]), body[6], body[7], micros)
            }
            _ => return None,
        };
        let sign = if negative { "-" } else { "" };
        return Some(format!(
            "{}{:02}:{:02}:{:02}{}",
            sign,
            hours,
            minutes,
            seconds,
            fraction(micros)
        ));
    }

    let (year, month, day) = match body.len() {
        0 => (0, 0, 0),
        4 | 7 | 11 => (u16::from_le_bytes([body[0], body[1]]), body[2], body[3]),
        _ => return None,
    };
    let date = format!("{:04}-{:02}-{:02}", year, month, day);
    if type_name == "DATE" {
        return Some(date);
    }

    let (hour, minute, second) = match body.len() {
        7 | 11 => (body[4], body[5], body[6]),
        _ => (0, 0, 0),
    };
    let micros = match body.get(7..11) {
        Some(m) => u32::from_le_bytes([m[0], m[1], m[2], m[3]]),
        None => 0,
    };
    Some(format!(
        "{} {:02}:{:02}:{:02}{}",
        date,
        hour,
        minute,
        second,
        fraction(micros)
    ))
}

fn fraction(micros: u32) -> String {
    if micros == 0 {
        String::new()
    } else {
        format!(".{:06}", micros)
    }
}

fn decode_row(table: &str, row: &MySqlRow) -> Result<Row> {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode_value(row, column.ordinal(), column.type_info().name())
                .map_err(|e| DumpError::query(table, format!("column {}: {}", column.name(), e)))?;
            Ok((column.name().to_string(), value))
        })
        .collect::<Result<Vec<_>>>()
        .map(Row::new)
}

#[async_trait]
impl SchemaIntrospector for MySqlAdapter {
    async fn database_info(&self) -> Result<DatabaseInfo> {
        let version: String = sqlx::query_scalar("SELECT VERSION()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(INFORMATION_SCHEMA, e))?;

        debug!("Server version {}", version);
        Ok(DatabaseInfo {
            name: self.database.clone(),
            platform: Platform::from_version(&version),
        })
    }

    async fn get_tables(&self) -> Result<Vec<TableMetadata>> {
        let names = self.table_names().await?;
        let mut columns = self.columns_by_table().await?;
        let mut indexes = self.indexes_by_table().await?;

        let tables: Vec<TableMetadata> = names
            .into_iter()
            .map(|name| TableMetadata {
                columns: columns.remove(&name).unwrap_or_default(),
                indexes: indexes.remove(&name).unwrap_or_default(),
                name,
            })
            .collect();

        info!("Introspected {} tables in {}", tables.len(), self.database);
        Ok(tables)
    }

    async fn render_ddl(&self, table: &TableMetadata) -> Result<String> {
        let sql = format!("SHOW CREATE TABLE {}", SqlGenerator::quote_identifier(&table.name));
        let row = sqlx::Executor::fetch_one(&self.pool, sql.as_str())
            .await
            .map_err(|e| map_sqlx_error(&table.name, e))?;

        row.try_get::<String, _>(1)
            .map_err(|e| map_sqlx_error(&table.name, e))
    }

    fn quote(&self, value: &SqlValue) -> String {
        SqlGenerator::quote_literal(value)
    }
}

#[async_trait]
impl DumpConnection for MySqlAdapter {
    async fn fetch_chunk(&self, request: &ChunkRequest) -> Result<Vec<Row>> {
        let table = request.query.table.as_str();
        let sql = SqlGenerator::select_chunk(request);

        let mut query = sqlx::query(&sql);
        if let ChunkCursor::Keyset {
            after: Some(after), ..
        } = &request.cursor
        {
            for value in after {
                query = bind_value(query, value);
            }
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(table, e))?;

        rows.iter().map(|row| decode_row(table, row)).collect()
    }

    /// Runs over the text protocol; LOCK TABLES cannot be prepared
    async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::Executor::execute(&self.pool, sql)
            .await
            .map_err(|e| map_execute_error(sql, e))?;
        Ok(())
    }
}
