//! Per-table dump policy

use std::collections::HashMap;
use std::fmt;

use crate::domain::TableMetadata;
use crate::error::{DumpError, Result};
use crate::query::{QueryModifier, SelectQuery};
use crate::transform::TransformerRef;

/// Dump policy for one table. Immutable once its schema is loaded.
#[derive(Clone)]
pub struct TableDefinition {
    metadata: TableMetadata,
    dump_schema: bool,
    dump_data: bool,
    columns: HashMap<String, TransformerRef>,
    query_modifier: Option<QueryModifier>,
    cursor_columns: Vec<String>,
}

impl TableDefinition {
    /// Full dump of schema and data, no transformers
    pub fn new(metadata: TableMetadata) -> Self {
        let cursor_columns = resolve_cursor_columns(&metadata);
        Self {
            metadata,
            dump_schema: true,
            dump_data: true,
            columns: HashMap::new(),
            query_modifier: None,
            cursor_columns,
        }
    }

    pub fn schema_only(mut self) -> Self {
        self.dump_data = false;
        self
    }

    pub fn with_schema(mut self, dump_schema: bool) -> Self {
        self.dump_schema = dump_schema;
        self
    }

    pub fn with_data(mut self, dump_data: bool) -> Self {
        self.dump_data = dump_data;
        self
    }

    /// Register a transformer for a column. Unknown columns are rejected.
    pub fn transform(mut self, column: &str, transformer: TransformerRef) -> Result<Self> {
        if !self.metadata.has_column(column) {
            return Err(DumpError::UnknownColumn {
                table: self.metadata.name.clone(),
                column: column.to_string(),
            });
        }
        self.columns.insert(column.to_string(), transformer);
        Ok(self)
    }

    pub fn modify_query(mut self, modifier: QueryModifier) -> Self {
        self.query_modifier = Some(modifier);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn should_dump_schema(&self) -> bool {
        self.dump_schema
    }

    pub fn should_dump_data(&self) -> bool {
        self.dump_data
    }

    pub fn find_transformer(&self, column: &str) -> Option<&TransformerRef> {
        self.columns.get(column)
    }

    pub fn masked_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Key columns used as the keyset cursor, in key order. Empty when no
    /// NOT NULL column can order the table; such tables are read in offset
    /// batches.
    pub fn cursor_columns(&self) -> &[String] {
        &self.cursor_columns
    }

    /// The table's selection with the modifier applied
    pub fn select_query(&self) -> SelectQuery {
        let base = SelectQuery::new(self.name());
        match &self.query_modifier {
            Some(modifier) => modifier(base),
            None => base,
        }
    }
}

impl fmt::Debug for TableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut masked: Vec<&str> = self.masked_columns().collect();
        masked.sort_unstable();
        f.debug_struct("TableDefinition")
            .field("name", &self.metadata.name)
            .field("dump_schema", &self.dump_schema)
            .field("dump_data", &self.dump_data)
            .field("masked_columns", &masked)
            .field("has_query_modifier", &self.query_modifier.is_some())
            .field("cursor_columns", &self.cursor_columns)
            .finish()
    }
}

/// The full primary key, then the first unique index over NOT NULL columns,
/// then the first NOT NULL column.
///
/// A unique index may hold any number of NULLs, and NULL never compares
/// greater than a cursor position, so nullable columns are never used.
fn resolve_cursor_columns(metadata: &TableMetadata) -> Vec<String> {
    let not_null = |column: &String| metadata.column(column).map_or(false, |c| !c.nullable);

    if let Some(primary) = metadata.primary_index().filter(|i| !i.columns.is_empty()) {
        return primary.columns.clone();
    }
    if let Some(unique) = metadata
        .indexes
        .iter()
        .find(|i| i.is_unique && !i.columns.is_empty() && i.columns.iter().all(not_null))
    {
        return unique.columns.clone();
    }
    metadata
        .columns
        .iter()
        .find(|c| !c.nullable)
        .map(|c| vec![c.name.clone()])
        .unwrap_or_default()
}
