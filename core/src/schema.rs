//! Dump schema: the ordered registry of table definitions and the database they live in

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::adapter::{DatabaseAdapter, SchemaIntrospector};
use crate::definition::DumpDefinition;
use crate::domain::DatabaseInfo;
use crate::error::{DumpError, Result};
use crate::table::TableDefinition;

/// Ordered table policies plus the connection they are dumped from.
///
/// Read-only once loaded; iteration follows registration order.
pub struct DumpSchema {
    adapter: Arc<dyn DatabaseAdapter>,
    database: DatabaseInfo,
    tables: Vec<TableDefinition>,
    positions: HashMap<String, usize>,
}

impl DumpSchema {
    /// Introspect the database and resolve the definition against it
    pub async fn load(adapter: Arc<dyn DatabaseAdapter>, definition: &DumpDefinition) -> Result<Self> {
        let database = adapter.database_info().await?;
        let introspected = adapter.get_tables().await?;
        let tables = definition.resolve(&introspected)?;

        info!(
            "Loaded dump schema for {} ({}): {} of {} tables registered",
            database.name,
            database.platform,
            tables.len(),
            introspected.len()
        );

        Self::from_tables(adapter, database, tables)
    }

    /// Build a schema from already constructed definitions, rejecting duplicates
    pub fn from_tables(
        adapter: Arc<dyn DatabaseAdapter>,
        database: DatabaseInfo,
        tables: Vec<TableDefinition>,
    ) -> Result<Self> {
        let mut positions = HashMap::with_capacity(tables.len());
        for (position, table) in tables.iter().enumerate() {
            if positions.insert(table.name().to_string(), position).is_some() {
                return Err(DumpError::DuplicateTable(table.name().to_string()));
            }
        }

        Ok(Self {
            adapter,
            database,
            tables,
            positions,
        })
    }

    /// Table definitions in registration order
    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.positions.get(name).map(|&i| &self.tables[i])
    }

    pub fn connection(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.adapter
    }

    pub fn database(&self) -> &DatabaseInfo {
        &self.database
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
