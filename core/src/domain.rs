//! Domain models shared by the dump engine and its collaborators

use serde::{Deserialize, Serialize};

/// Database platform reported by the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MySql,
    MariaDb,
    Other,
}

impl Platform {
    /// Parse the platform from a server version string such as `8.0.36` or `10.11.6-MariaDB`
    pub fn from_version(version: &str) -> Self {
        if version.to_lowercase().contains("mariadb") {
            Platform::MariaDb
        } else if version
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
        {
            Platform::MySql
        } else {
            Platform::Other
        }
    }

    /// Whether `mysqldump` understands this platform
    pub fn supports_mysqldump(&self) -> bool {
        matches!(self, Platform::MySql | Platform::MariaDb)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::MySql => write!(f, "MySQL"),
            Platform::MariaDb => write!(f, "MariaDB"),
            Platform::Other => write!(f, "other"),
        }
    }
}

/// Database-level metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub platform: Platform,
}

/// Table metadata from schema introspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
}

impl TableMetadata {
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary index, if the table has one
    pub fn primary_index(&self) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.is_primary)
    }
}

/// Column information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

/// Index information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_primary: bool,
    pub is_unique: bool,
}

/// A single column value as fetched from the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Empty text or binary value
    pub fn is_empty_string(&self) -> bool {
        match self {
            SqlValue::Text(s) => s.is_empty(),
            SqlValue::Bytes(b) => b.is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One fetched row, in the column order returned by the driver
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new(values: Vec<(String, SqlValue)>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_version() {
        assert_eq!(Platform::from_version("8.0.36"), Platform::MySql);
        assert_eq!(Platform::from_version("10.11.6-MariaDB-log"), Platform::MariaDb);
        assert_eq!(Platform::from_version("PostgreSQL 16"), Platform::Other);
        assert!(Platform::MariaDb.supports_mysqldump());
        assert!(!Platform::Other.supports_mysqldump());
    }

    #[test]
    fn test_row_preserves_driver_order() {
        let row = Row::new(vec![
            ("email".to_string(), SqlValue::from("a@x.com")),
            ("id".to_string(), SqlValue::Int(1)),
        ]);
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["email", "id"]);
        assert_eq!(row.get("id"), Some(&SqlValue::Int(1)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_empty_string_detection() {
        assert!(SqlValue::from("").is_empty_string());
        assert!(SqlValue::Bytes(vec![]).is_empty_string());
        assert!(!SqlValue::Null.is_empty_string());
        assert!(!SqlValue::Int(0).is_empty_string());
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<&str> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(5i64)), SqlValue::Int(5));
    }
}
