//! The masked dump engine
//!
//! Drives one dump run: a global foreign-key-checks bracket, then per table
//! the DDL, a lock bracket around the data section, and keyset-chunked row
//! extraction with column transformers applied. Output goes straight to a
//! [`DumpSink`]; nothing is buffered beyond the current chunk.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::{DumpConnection, SchemaIntrospector};
use crate::domain::{Row, SqlValue};
use crate::error::{DumpError, Result};
use crate::query::{ChunkCursor, ChunkRequest, SortDirection};
use crate::schema::DumpSchema;
use crate::schema_export::SchemaExporter;
use crate::serializer::RowSerializer;
use crate::sink::DumpSink;
use crate::sql_gen::SqlGenerator;
use crate::table::TableDefinition;

/// Rows fetched per chunk unless configured otherwise
pub const DEFAULT_BATCH_SIZE: u64 = 500;

/// Rows per combined INSERT unless configured otherwise. Keeps a statement
/// well under the server's `max_allowed_packet`.
pub const DEFAULT_ROWS_PER_INSERT: u64 = 1000;

/// Shape of the emitted INSERT statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertStyle {
    /// One `INSERT INTO t VALUES (..),(..);` per table
    #[default]
    Combined,
    /// One `INSERT INTO t (cols) VALUES (..);` per row
    PerRow,
}

impl FromStr for InsertStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "combined" => Ok(InsertStyle::Combined),
            "per-row" | "per_row" => Ok(InsertStyle::PerRow),
            other => Err(format!(
                "unknown insert style '{}', expected 'combined' or 'per-row'",
                other
            )),
        }
    }
}

/// Engine options
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub batch_size: u64,
    pub insert_style: InsertStyle,
    /// Rows per combined INSERT before a new statement is started. 0 means
    /// one statement per table.
    pub rows_per_insert: u64,
    /// Hold a READ lock on each source table while it is extracted
    pub lock_source: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            insert_style: InsertStyle::default(),
            rows_per_insert: DEFAULT_ROWS_PER_INSERT,
            lock_source: false,
        }
    }
}

impl DumpOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DumpError::Config("batch size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Notified once per completed table
pub trait ProgressObserver: Send + Sync {
    fn table_dumped(&self, table: &str, completed: usize, total: usize);
}

/// Completed/total table counters, readable while a dump runs
#[derive(Debug, Default)]
pub struct DumpProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl DumpProgress {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn start(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
    }

    fn advance(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// State of the table currently being written. Dropped when the table is done.
struct TableRun<'t> {
    table: &'t str,
    /// A combined INSERT has been opened and still needs its terminator
    statement_open: bool,
    rows_in_statement: u64,
    rows_written: u64,
    chunks: u64,
}

impl<'t> TableRun<'t> {
    fn new(table: &'t str) -> Self {
        Self {
            table,
            statement_open: false,
            rows_in_statement: 0,
            rows_written: 0,
            chunks: 0,
        }
    }

    fn close_statement(&mut self, sink: &mut dyn DumpSink) -> Result<()> {
        if self.statement_open {
            sink.write(";\n")?;
            self.statement_open = false;
            self.rows_in_statement = 0;
        }
        Ok(())
    }
}

/// Dump engine bound to one schema
pub struct DumpEngine<'a> {
    schema: &'a DumpSchema,
    options: DumpOptions,
    exporter: Option<Arc<dyn SchemaExporter>>,
    progress: Arc<DumpProgress>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl<'a> DumpEngine<'a> {
    pub fn new(schema: &'a DumpSchema, options: DumpOptions) -> Self {
        Self {
            schema,
            options,
            exporter: None,
            progress: Arc::new(DumpProgress::default()),
            observer: None,
        }
    }

    /// Export DDL for the whole database up front instead of per table
    pub fn with_schema_exporter(mut self, exporter: Arc<dyn SchemaExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn progress(&self) -> Arc<DumpProgress> {
        Arc::clone(&self.progress)
    }

    /// Write the full dump to the sink.
    ///
    /// On error the sink holds a truncated dump and must be discarded. Nothing
    /// is written after the error is returned.
    pub async fn dump(&self, sink: &mut dyn DumpSink) -> Result<()> {
        self.options.validate()?;

        let tables = self.schema.tables();
        self.progress.start(tables.len());
        info!(
            "Starting masked dump of {} ({} tables)",
            self.schema.database().name,
            tables.len()
        );

        sink.write(&SqlGenerator::foreign_key_checks(false))?;

        let native_ddl = self.write_native_schema(sink).await?;

        for table in tables {
            self.dump_table(table, native_ddl, sink).await?;

            let completed = self.progress.advance();
            if let Some(observer) = &self.observer {
                observer.table_dumped(table.name(), completed, tables.len());
            }
        }

        sink.write(&SqlGenerator::foreign_key_checks(true))?;
        sink.flush()?;

        info!("Masked dump of {} complete", self.schema.database().name);
        Ok(())
    }

    /// Returns whether DDL was written for the whole database
    async fn write_native_schema(&self, sink: &mut dyn DumpSink) -> Result<bool> {
        let Some(exporter) = &self.exporter else {
            return Ok(false);
        };

        let tables: Vec<String> = self
            .schema
            .tables()
            .iter()
            .filter(|t| t.should_dump_schema())
            .map(|t| t.name().to_string())
            .collect();
        if tables.is_empty() {
            return Ok(false);
        }

        match exporter.export_schema(&tables).await {
            Ok(ddl) => {
                sink.write(&ddl)?;
                if !ddl.ends_with('\n') {
                    sink.write("\n")?;
                }
                Ok(true)
            }
            Err(e) if e.is_fatal_for_run() => Err(e),
            Err(e) => {
                warn!("Native schema export unavailable, rendering DDL per table: {}", e);
                Ok(false)
            }
        }
    }

    async fn dump_table(
        &self,
        table: &TableDefinition,
        native_ddl: bool,
        sink: &mut dyn DumpSink,
    ) -> Result<()> {
        let name = table.name();
        info!("Dumping table {}", name);

        if table.should_dump_schema() && !native_ddl {
            let ddl = self.schema.connection().render_ddl(table.metadata()).await?;
            sink.write(&SqlGenerator::drop_table(name))?;
            sink.write(&SqlGenerator::terminate_ddl(&ddl))?;
        }

        if table.should_dump_data() {
            self.dump_table_data(table, sink).await?;
        }

        Ok(())
    }

    async fn dump_table_data(&self, table: &TableDefinition, sink: &mut dyn DumpSink) -> Result<()> {
        let connection = self.schema.connection();

        if self.options.lock_source {
            connection
                .execute(&SqlGenerator::lock_source_read(table.name()))
                .await?;
        }

        let result = self.write_data_section(table, sink).await;

        if self.options.lock_source {
            if let Err(e) = connection.execute(SqlGenerator::unlock_source()).await {
                if result.is_ok() {
                    return Err(e);
                }
                warn!("Failed to release source lock on {}: {}", table.name(), e);
            }
        }

        result
    }

    /// Lock bracket, rows, unlock bracket. The unlock is attempted on any
    /// failure that still leaves the sink writable.
    async fn write_data_section(&self, table: &TableDefinition, sink: &mut dyn DumpSink) -> Result<()> {
        let name = table.name();
        sink.write(&SqlGenerator::lock_for_reload(name))?;

        let mut run = TableRun::new(name);
        match self.stream_rows(table, &mut run, sink).await {
            Ok(()) => {
                run.close_statement(sink)?;
                sink.write(&SqlGenerator::unlock_after_reload(name))?;
                info!(
                    "Dumped {} rows from {} in {} chunks",
                    run.rows_written, name, run.chunks
                );
                Ok(())
            }
            Err(e) => {
                if !e.is_sink() {
                    let cleanup = run
                        .close_statement(sink)
                        .and_then(|_| sink.write(&SqlGenerator::unlock_after_reload(name)));
                    if let Err(cleanup_err) = cleanup {
                        warn!("Failed to close lock bracket for {}: {}", name, cleanup_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn stream_rows(
        &self,
        table: &TableDefinition,
        run: &mut TableRun<'_>,
        sink: &mut dyn DumpSink,
    ) -> Result<()> {
        let mut query = table.select_query();
        let keys = table.cursor_columns();
        let mut cursor = if query.has_custom_order() {
            ChunkCursor::Offset { offset: 0 }
        } else if keys.is_empty() {
            // No NOT NULL column to page on; a total order keeps offsets stable
            debug!("{} has no usable key, paging by offset", run.table);
            for column in &table.metadata().columns {
                query = query.order_by(column.name.clone(), SortDirection::Asc);
            }
            ChunkCursor::Offset { offset: 0 }
        } else {
            ChunkCursor::Keyset {
                columns: keys.to_vec(),
                after: None,
            }
        };

        loop {
            let limit = match query.limit {
                Some(cap) => self.options.batch_size.min(cap.saturating_sub(run.rows_written)),
                None => self.options.batch_size,
            };
            if limit == 0 {
                break;
            }

            let request = ChunkRequest {
                query: query.clone(),
                cursor: cursor.clone(),
                limit,
            };
            let rows = self.schema.connection().fetch_chunk(&request).await?;
            run.chunks += 1;
            debug!(
                "Fetched chunk {} of {}: {} rows",
                run.chunks,
                run.table,
                rows.len()
            );

            self.write_rows(table, &rows, run, sink)?;

            let fetched = rows.len() as u64;
            if fetched < limit {
                break;
            }
            cursor = Self::next_cursor(run.table, &cursor, &rows)?;
        }

        Ok(())
    }

    fn next_cursor(table: &str, cursor: &ChunkCursor, rows: &[Row]) -> Result<ChunkCursor> {
        match cursor {
            ChunkCursor::Keyset { columns, .. } => {
                let last = rows.last();
                let after = columns
                    .iter()
                    .map(|column| match last.and_then(|row| row.get(column)) {
                        None => Err(DumpError::query(
                            table,
                            format!("cursor column {} missing from result", column),
                        )),
                        Some(SqlValue::Null) => Err(DumpError::query(
                            table,
                            format!("cursor column {} is NULL, cannot page past it", column),
                        )),
                        Some(value) => Ok(value.clone()),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ChunkCursor::Keyset {
                    columns: columns.clone(),
                    after: Some(after),
                })
            }
            ChunkCursor::Offset { offset } => Ok(ChunkCursor::Offset {
                offset: offset + rows.len() as u64,
            }),
        }
    }

    fn write_rows(
        &self,
        table: &TableDefinition,
        rows: &[Row],
        run: &mut TableRun<'_>,
        sink: &mut dyn DumpSink,
    ) -> Result<()> {
        let introspector = self.schema.connection();

        for row in rows {
            let values = RowSerializer::serialize(row, table, |v| introspector.quote(v))?;

            match self.options.insert_style {
                InsertStyle::Combined => {
                    let cap = self.options.rows_per_insert;
                    if cap > 0 && run.rows_in_statement >= cap {
                        run.close_statement(sink)?;
                    }
                    if run.statement_open {
                        sink.write(",\n")?;
                    } else {
                        sink.write(&SqlGenerator::insert_prefix(run.table))?;
                        run.statement_open = true;
                    }
                    let literals: Vec<String> = values.into_iter().map(|(_, v)| v).collect();
                    sink.write(&SqlGenerator::value_tuple(&literals))?;
                    run.rows_in_statement += 1;
                }
                InsertStyle::PerRow => {
                    let columns: Vec<&str> = values.iter().map(|(c, _)| c.as_str()).collect();
                    let literals: Vec<String> = values.iter().map(|(_, v)| v.clone()).collect();
                    sink.write(&SqlGenerator::insert_row(run.table, &columns, &literals))?;
                }
            }
            run.rows_written += 1;
        }

        Ok(())
    }
}
