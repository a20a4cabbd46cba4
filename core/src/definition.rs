//! Masking definitions loaded from a configuration file
//!
//! A definition file holds one or more named definitions:
//!
//! ```toml
//! [definitions.default]
//! exclude = ["sessions"]
//! schema_only = ["failed_jobs"]
//!
//! [definitions.default.tables.users.columns]
//! email = { replace = "masked@example.com" }
//! password = { mask = "x" }
//! remember_token = "nullify"
//! ```
//!
//! Definitions are validated against the introspected schema before any
//! output is produced.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::domain::TableMetadata;
use crate::error::{DumpError, Result};
use crate::query::{OrderBy, QueryModifier, SelectQuery};
use crate::table::TableDefinition;
use crate::transform::ColumnRule;

/// Name used when no definition is requested explicitly
pub const DEFAULT_DEFINITION: &str = "default";

/// All definitions found in a configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DumpDefinitions {
    #[serde(default)]
    pub definitions: HashMap<String, DumpDefinition>,
}

impl DumpDefinitions {
    /// Load definitions from a TOML, YAML or JSON file (format from the extension)
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parse definitions from an in-memory string
    pub fn parse(contents: &str, format: config::FileFormat) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(contents, format))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn get(&self, name: &str) -> Result<&DumpDefinition> {
        self.definitions.get(name).ok_or_else(|| {
            DumpError::Config(format!("no dump definition named '{}'", name))
        })
    }
}

/// Which tables to dump and how
#[derive(Debug, Clone, Deserialize)]
pub struct DumpDefinition {
    /// Register every introspected table
    #[serde(default = "default_true")]
    pub all_tables: bool,
    /// Tables to register, in order, when `all_tables` is off
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Tables dumped without data
    #[serde(default)]
    pub schema_only: Vec<String>,
    #[serde(default)]
    pub tables: HashMap<String, TableConfig>,
}

impl Default for DumpDefinition {
    fn default() -> Self {
        Self {
            all_tables: true,
            include: Vec::new(),
            exclude: Vec::new(),
            schema_only: Vec::new(),
            tables: HashMap::new(),
        }
    }
}

/// Per-table options
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_true")]
    pub dump_schema: bool,
    #[serde(default = "default_true")]
    pub dump_data: bool,
    #[serde(default)]
    pub columns: HashMap<String, ColumnRule>,
    #[serde(default, rename = "where")]
    pub filter: Option<String>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            dump_schema: true,
            dump_data: true,
            columns: HashMap::new(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl TableConfig {
    fn modifier(&self) -> Option<QueryModifier> {
        if self.filter.is_none() && self.order_by.is_empty() && self.limit.is_none() {
            return None;
        }
        let filter = self.filter.clone();
        let order_by = self.order_by.clone();
        let limit = self.limit;
        Some(Arc::new(move |query: SelectQuery| {
            let mut query = match &filter {
                Some(predicate) => query.filter(predicate.clone()),
                None => query,
            };
            for term in &order_by {
                query = query.order_by(term.column.clone(), term.direction);
            }
            match limit {
                Some(limit) => query.limit(limit),
                None => query,
            }
        }))
    }
}

impl DumpDefinition {
    /// Turn the definition into table policies, in registration order
    pub fn resolve(&self, introspected: &[TableMetadata]) -> Result<Vec<TableDefinition>> {
        let by_name: HashMap<&str, &TableMetadata> =
            introspected.iter().map(|t| (t.name.as_str(), t)).collect();

        let configured = self
            .include
            .iter()
            .chain(&self.exclude)
            .chain(&self.schema_only)
            .chain(self.tables.keys());
        for name in configured {
            if !by_name.contains_key(name.as_str()) {
                return Err(DumpError::TableNotFound(name.clone()));
            }
        }

        let excluded: HashSet<&str> = self.exclude.iter().map(String::as_str).collect();
        if let Some(name) = self.include.iter().find(|n| excluded.contains(n.as_str())) {
            return Err(DumpError::Config(format!(
                "table '{}' is both included and excluded",
                name
            )));
        }

        let registered: Vec<&TableMetadata> = if self.all_tables {
            introspected
                .iter()
                .filter(|t| !excluded.contains(t.name.as_str()))
                .collect()
        } else {
            self.include.iter().map(|name| by_name[name.as_str()]).collect()
        };

        let registered_names: HashSet<&str> = registered.iter().map(|t| t.name.as_str()).collect();
        for name in self.schema_only.iter().chain(self.tables.keys()) {
            if !registered_names.contains(name.as_str()) {
                return Err(DumpError::Config(format!(
                    "table '{}' is configured but not dumped",
                    name
                )));
            }
        }

        let schema_only: HashSet<&str> = self.schema_only.iter().map(String::as_str).collect();
        registered
            .into_iter()
            .map(|metadata| {
                let mut table = TableDefinition::new(metadata.clone());
                if let Some(config) = self.tables.get(&metadata.name) {
                    table = Self::apply_table_config(table, config)?;
                }
                if schema_only.contains(metadata.name.as_str()) {
                    table = table.schema_only();
                }
                Ok(table)
            })
            .collect()
    }

    fn apply_table_config(mut table: TableDefinition, config: &TableConfig) -> Result<TableDefinition> {
        for term in &config.order_by {
            if !table.metadata().has_column(&term.column) {
                return Err(DumpError::UnknownColumn {
                    table: table.name().to_string(),
                    column: term.column.clone(),
                });
            }
        }

        table = table
            .with_schema(config.dump_schema)
            .with_data(config.dump_data);

        for (column, rule) in &config.columns {
            let transformer = rule.build().map_err(|e| {
                DumpError::Config(format!("{}.{}: {}", table.name(), column, e))
            })?;
            table = table.transform(column, transformer)?;
        }

        if let Some(modifier) = config.modifier() {
            table = table.modify_query(modifier);
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnInfo, SqlValue};
    use crate::query::SortDirection;
    use config::FileFormat;

    fn table(name: &str, columns: &[&str]) -> TableMetadata {
        TableMetadata {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|c| ColumnInfo {
                    name: c.to_string(),
                    data_type: "varchar".to_string(),
                    nullable: true,
                })
                .collect(),
            indexes: vec![],
        }
    }

    fn schema() -> Vec<TableMetadata> {
        vec![
            table("failed_jobs", &["id", "payload"]),
            table("sessions", &["id", "payload"]),
            table("users", &["id", "email", "password", "created_at"]),
        ]
    }

    const DEFINITION: &str = r#"
[definitions.default]
exclude = ["sessions"]
schema_only = ["failed_jobs"]

[definitions.default.tables.users]
where = "id > 10"
limit = 100
order_by = [{ column = "created_at", direction = "desc" }]

[definitions.default.tables.users.columns]
email = { replace = "masked@example.com" }
password = { mask = "x" }
"#;

    #[test]
    fn test_parse_definition_file() {
        let defs = DumpDefinitions::parse(DEFINITION, FileFormat::Toml).unwrap();
        let def = defs.get(DEFAULT_DEFINITION).unwrap();

        assert!(def.all_tables);
        assert_eq!(def.exclude, vec!["sessions".to_string()]);
        let users = &def.tables["users"];
        assert_eq!(users.filter.as_deref(), Some("id > 10"));
        assert_eq!(users.limit, Some(100));
        assert_eq!(users.order_by[0].direction, SortDirection::Desc);
        assert_eq!(
            users.columns["email"],
            ColumnRule::Replace("masked@example.com".to_string())
        );
    }

    #[test]
    fn test_missing_definition() {
        let defs = DumpDefinitions::parse(DEFINITION, FileFormat::Toml).unwrap();
        assert!(matches!(defs.get("staging"), Err(DumpError::Config(_))));
    }

    #[test]
    fn test_resolve_all_tables() {
        let defs = DumpDefinitions::parse(DEFINITION, FileFormat::Toml).unwrap();
        let tables = defs.get(DEFAULT_DEFINITION).unwrap().resolve(&schema()).unwrap();

        let names: Vec<&str> = tables.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["failed_jobs", "users"]);
        assert!(!tables[0].should_dump_data());
        assert!(tables[1].should_dump_data());

        let masked = tables[1]
            .find_transformer("password")
            .unwrap()
            .transform(&SqlValue::from("hunter2"))
            .unwrap();
        assert_eq!(masked, SqlValue::from("xxxxxxx"));

        let query = tables[1].select_query();
        assert_eq!(query.filters, vec!["id > 10".to_string()]);
        assert_eq!(query.limit, Some(100));
        assert!(query.has_custom_order());
    }

    #[test]
    fn test_resolve_include_order() {
        let def = DumpDefinition {
            all_tables: false,
            include: vec!["users".to_string(), "failed_jobs".to_string()],
            ..Default::default()
        };
        let tables = def.resolve(&schema()).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["users", "failed_jobs"]);
    }

    #[test]
    fn test_unknown_table_rejected() {
        let def = DumpDefinition {
            exclude: vec!["audit_log".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            def.resolve(&schema()),
            Err(DumpError::TableNotFound(name)) if name == "audit_log"
        ));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let mut columns = HashMap::new();
        columns.insert("ssn".to_string(), ColumnRule::Nullify);
        let mut tables = HashMap::new();
        tables.insert(
            "users".to_string(),
            TableConfig {
                columns,
                ..Default::default()
            },
        );
        let def = DumpDefinition {
            tables,
            ..Default::default()
        };
        assert!(matches!(
            def.resolve(&schema()),
            Err(DumpError::UnknownColumn { column, .. }) if column == "ssn"
        ));
    }

    #[test]
    fn test_configured_but_excluded_table_rejected() {
        let def = DumpDefinition {
            exclude: vec!["failed_jobs".to_string()],
            schema_only: vec!["failed_jobs".to_string()],
            ..Default::default()
        };
        assert!(matches!(def.resolve(&schema()), Err(DumpError::Config(_))));
    }

    #[test]
    fn test_include_and_exclude_conflict() {
        let def = DumpDefinition {
            all_tables: false,
            include: vec!["users".to_string()],
            exclude: vec!["users".to_string()],
            ..Default::default()
        };
        assert!(matches!(def.resolve(&schema()), Err(DumpError::Config(_))));
    }

    #[test]
    fn test_invalid_mask_rejected() {
        let mut columns = HashMap::new();
        columns.insert("password".to_string(), ColumnRule::Mask("xx".to_string()));
        let mut tables = HashMap::new();
        tables.insert(
            "users".to_string(),
            TableConfig {
                columns,
                ..Default::default()
            },
        );
        let def = DumpDefinition {
            tables,
            ..Default::default()
        };
        assert!(matches!(def.resolve(&schema()), Err(DumpError::Config(_))));
    }

    #[test]
    fn test_definition_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("masked-dump.toml");
        std::fs::write(&path, DEFINITION).unwrap();

        let defs = DumpDefinitions::from_file(&path).unwrap();
        assert!(defs.get(DEFAULT_DEFINITION).is_ok());
    }
}
