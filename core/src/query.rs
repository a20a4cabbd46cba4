//! Row selection model: the query builder handed to table modifiers and the
//! chunk requests sent to the connection

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::SqlValue;

/// Sort direction for an ORDER BY term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Selection over a single table before chunking is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    /// Raw SQL predicates, joined with AND
    pub filters: Vec<String>,
    pub order_by: Vec<OrderBy>,
    /// Cap on the total number of rows taken from the table
    pub limit: Option<u64>,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.filters.push(predicate.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the modifier imposed its own ordering, which rules out keyset chunking
    pub fn has_custom_order(&self) -> bool {
        !self.order_by.is_empty()
    }
}

/// Filter/ordering override applied to a table's selection
pub type QueryModifier = Arc<dyn Fn(SelectQuery) -> SelectQuery + Send + Sync>;

/// Position of the next chunk within a table
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkCursor {
    /// `WHERE (k1, k2) > (after) ORDER BY k1, k2` over the whole key
    Keyset {
        columns: Vec<String>,
        /// Key of the last row already read, one value per column
        after: Option<Vec<SqlValue>>,
    },
    /// Used only when the query carries its own ordering
    Offset { offset: u64 },
}

/// A bounded read of one table
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRequest {
    pub query: SelectQuery,
    pub cursor: ChunkCursor,
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_composition() {
        let query = SelectQuery::new("users")
            .filter("active = 1")
            .order_by("created_at", SortDirection::Desc)
            .limit(10);

        assert_eq!(query.filters, vec!["active = 1".to_string()]);
        assert_eq!(query.limit, Some(10));
        assert!(query.has_custom_order());
    }

    #[test]
    fn test_plain_query_has_no_custom_order() {
        assert!(!SelectQuery::new("users").has_custom_order());
    }

    #[test]
    fn test_sort_direction_display() {
        assert_eq!(SortDirection::Asc.to_string(), "ASC");
        assert_eq!(SortDirection::Desc.to_string(), "DESC");
    }
}
