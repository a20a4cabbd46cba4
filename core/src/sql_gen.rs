//! SQL statement generation for the MySQL dialect

use crate::domain::SqlValue;
use crate::query::{ChunkCursor, ChunkRequest};

/// SQL statement generator
pub struct SqlGenerator;

impl SqlGenerator {
    /// Backtick-quote an identifier
    pub fn quote_identifier(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Escape a string for use inside a single-quoted literal
    pub fn escape_string(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len() + 2);
        for c in value.chars() {
            match c {
                '\\' => escaped.push_str("\\\\"),
                '\'' => escaped.push_str("\\'"),
                '\0' => escaped.push_str("\\0"),
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                '\x1a' => escaped.push_str("\\Z"),
                _ => escaped.push(c),
            }
        }
        escaped
    }

    /// Render a value as a literal.
    ///
    /// `NULL` and empty strings are handled by the row serializer before this
    /// is reached, but both are still rendered correctly here.
    pub fn quote_literal(value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::UInt(u) => u.to_string(),
            SqlValue::Float(f) if f.is_finite() => f.to_string(),
            SqlValue::Float(_) => "NULL".to_string(),
            SqlValue::Text(s) => format!("'{}'", Self::escape_string(s)),
            SqlValue::Bytes(b) if b.is_empty() => "''".to_string(),
            SqlValue::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02X}", byte)).collect();
                format!("X'{}'", hex)
            }
        }
    }

    pub fn foreign_key_checks(enabled: bool) -> String {
        format!("SET FOREIGN_KEY_CHECKS={};\n", if enabled { 1 } else { 0 })
    }

    pub fn drop_table(table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};\n", Self::quote_identifier(table))
    }

    /// Terminate a DDL statement exactly once
    pub fn terminate_ddl(ddl: &str) -> String {
        let trimmed = ddl.trim_end();
        if trimmed.ends_with(';') {
            format!("{}\n", trimmed)
        } else {
            format!("{};\n", trimmed)
        }
    }

    /// Opening bracket of a table's data section in the dump
    pub fn lock_for_reload(table: &str) -> String {
        let table = Self::quote_identifier(table);
        format!(
            "LOCK TABLES {} WRITE;\nALTER TABLE {} DISABLE KEYS;\n",
            table, table
        )
    }

    /// Closing bracket of a table's data section in the dump
    pub fn unlock_after_reload(table: &str) -> String {
        format!(
            "ALTER TABLE {} ENABLE KEYS;\nUNLOCK TABLES;\n",
            Self::quote_identifier(table)
        )
    }

    /// Read lock issued against the source while a table is extracted
    pub fn lock_source_read(table: &str) -> String {
        format!("LOCK TABLES {} READ", Self::quote_identifier(table))
    }

    pub fn unlock_source() -> &'static str {
        "UNLOCK TABLES"
    }

    /// Head of a combined multi-row INSERT
    pub fn insert_prefix(table: &str) -> String {
        format!("INSERT INTO {} VALUES\n", Self::quote_identifier(table))
    }

    /// A single-row INSERT naming its columns
    pub fn insert_row(table: &str, columns: &[&str], values: &[String]) -> String {
        let columns: Vec<String> = columns.iter().map(|c| Self::quote_identifier(c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES {};\n",
            Self::quote_identifier(table),
            columns.join(","),
            Self::value_tuple(values)
        )
    }

    pub fn value_tuple(values: &[String]) -> String {
        format!("({})", values.join(","))
    }

    /// `a > ?` for a single column, a row comparison for composite keys
    fn keyset_predicate(columns: &[String]) -> String {
        if let [column] = columns {
            return format!("{} > ?", column);
        }
        let placeholders = vec!["?"; columns.len()];
        format!("({}) > ({})", columns.join(", "), placeholders.join(", "))
    }

    /// SELECT for one chunk. A keyset cursor with a known position yields one `?`
    /// placeholder per key column that the caller binds to the last seen key.
    pub fn select_chunk(request: &ChunkRequest) -> String {
        let query = &request.query;
        let mut predicates: Vec<String> = query.filters.iter().map(|f| format!("({})", f)).collect();
        let mut order_terms: Vec<String> = query
            .order_by
            .iter()
            .map(|o| format!("{} {}", Self::quote_identifier(&o.column), o.direction))
            .collect();
        let mut offset = None;

        match &request.cursor {
            ChunkCursor::Keyset { columns, after } => {
                let quoted: Vec<String> = columns.iter().map(|c| Self::quote_identifier(c)).collect();
                if after.is_some() {
                    predicates.push(Self::keyset_predicate(&quoted));
                }
                order_terms = quoted.iter().map(|c| format!("{} ASC", c)).collect();
            }
            ChunkCursor::Offset { offset: o } => offset = Some(*o),
        }

        let mut sql = format!("SELECT * FROM {}", Self::quote_identifier(&query.table));
        if !predicates.is_empty() {
            sql.push_str(&format!(" WHERE {}", predicates.join(" AND ")));
        }
        if !order_terms.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", order_terms.join(", ")));
        }
        sql.push_str(&format!(" LIMIT {}", request.limit));
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{SelectQuery, SortDirection};

    #[test]
    fn test_quote_identifier_doubles_backticks() {
        assert_eq!(SqlGenerator::quote_identifier("users"), "`users`");
        assert_eq!(SqlGenerator::quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_quote_literal_escapes_quotes() {
        let sql = SqlGenerator::quote_literal(&SqlValue::from("O'Brien"));
        assert_eq!(sql, "'O\\'Brien'");
    }

    #[test]
    fn test_quote_literal_control_characters() {
        let sql = SqlGenerator::quote_literal(&SqlValue::from("a\\b\nc\0"));
        assert_eq!(sql, "'a\\\\b\\nc\\0'");
    }

    #[test]
    fn test_quote_literal_scalars() {
        assert_eq!(SqlGenerator::quote_literal(&SqlValue::Null), "NULL");
        assert_eq!(SqlGenerator::quote_literal(&SqlValue::Int(-4)), "-4");
        assert_eq!(SqlGenerator::quote_literal(&SqlValue::Bool(true)), "1");
        assert_eq!(SqlGenerator::quote_literal(&SqlValue::Float(f64::NAN)), "NULL");
        assert_eq!(
            SqlGenerator::quote_literal(&SqlValue::Bytes(vec![0xDE, 0xAD])),
            "X'DEAD'"
        );
    }

    #[test]
    fn test_brackets() {
        assert_eq!(
            SqlGenerator::lock_for_reload("users"),
            "LOCK TABLES `users` WRITE;\nALTER TABLE `users` DISABLE KEYS;\n"
        );
        assert_eq!(
            SqlGenerator::unlock_after_reload("users"),
            "ALTER TABLE `users` ENABLE KEYS;\nUNLOCK TABLES;\n"
        );
        assert_eq!(
            SqlGenerator::foreign_key_checks(false),
            "SET FOREIGN_KEY_CHECKS=0;\n"
        );
    }

    #[test]
    fn test_terminate_ddl_once() {
        assert_eq!(
            SqlGenerator::terminate_ddl("CREATE TABLE t (id int)"),
            "CREATE TABLE t (id int);\n"
        );
        assert_eq!(
            SqlGenerator::terminate_ddl("CREATE TABLE t (id int);\n\n"),
            "CREATE TABLE t (id int);\n"
        );
    }

    #[test]
    fn test_insert_row() {
        let sql = SqlGenerator::insert_row(
            "users",
            &["id", "email"],
            &["1".to_string(), "'a@x.com'".to_string()],
        );
        assert_eq!(
            sql,
            "INSERT INTO `users` (`id`,`email`) VALUES (1,'a@x.com');\n"
        );
    }

    #[test]
    fn test_select_first_keyset_chunk() {
        let request = ChunkRequest {
            query: SelectQuery::new("users").filter("active = 1"),
            cursor: ChunkCursor::Keyset {
                columns: vec!["id".to_string()],
                after: None,
            },
            limit: 500,
        };
        assert_eq!(
            SqlGenerator::select_chunk(&request),
            "SELECT * FROM `users` WHERE (active = 1) ORDER BY `id` ASC LIMIT 500"
        );
    }

    #[test]
    fn test_select_next_keyset_chunk() {
        let request = ChunkRequest {
            query: SelectQuery::new("users"),
            cursor: ChunkCursor::Keyset {
                columns: vec!["id".to_string()],
                after: Some(vec![SqlValue::Int(500)]),
            },
            limit: 500,
        };
        assert_eq!(
            SqlGenerator::select_chunk(&request),
            "SELECT * FROM `users` WHERE `id` > ? ORDER BY `id` ASC LIMIT 500"
        );
    }

    #[test]
    fn test_select_composite_keyset_chunk() {
        let request = ChunkRequest {
            query: SelectQuery::new("role_user"),
            cursor: ChunkCursor::Keyset {
                columns: vec!["user_id".to_string(), "role_id".to_string()],
                after: Some(vec![SqlValue::Int(1), SqlValue::Int(2)]),
            },
            limit: 1,
        };
        assert_eq!(
            SqlGenerator::select_chunk(&request),
            "SELECT * FROM `role_user` WHERE (`user_id`, `role_id`) > (?, ?) \
             ORDER BY `user_id` ASC, `role_id` ASC LIMIT 1"
        );
    }

    #[test]
    fn test_select_offset_chunk_keeps_custom_order() {
        let request = ChunkRequest {
            query: SelectQuery::new("logs").order_by("created_at", SortDirection::Desc),
            cursor: ChunkCursor::Offset { offset: 1000 },
            limit: 500,
        };
        assert_eq!(
            SqlGenerator::select_chunk(&request),
            "SELECT * FROM `logs` ORDER BY `created_at` DESC LIMIT 500 OFFSET 1000"
        );
    }
}
