//! Converts fetched rows into SQL value tuples

use crate::domain::{Row, SqlValue};
use crate::error::{DumpError, Result};
use crate::table::TableDefinition;

/// Row serializer
pub struct RowSerializer;

impl RowSerializer {
    /// Apply the table's transformers to a row and render every value as a literal.
    ///
    /// Output order is the row's driver column order. A failing transformer
    /// fails the row.
    pub fn serialize<Q>(row: &Row, table: &TableDefinition, quote: Q) -> Result<Vec<(String, String)>>
    where
        Q: Fn(&SqlValue) -> String,
    {
        row.iter()
            .map(|(column, value)| {
                let literal = match table.find_transformer(column) {
                    Some(transformer) => {
                        let masked = transformer.transform(value).map_err(|e| {
                            DumpError::Transform {
                                table: table.name().to_string(),
                                column: column.to_string(),
                                message: e.to_string(),
                            }
                        })?;
                        Self::literal(&masked, &quote)
                    }
                    None => Self::literal(value, &quote),
                };
                Ok((column.to_string(), literal))
            })
            .collect()
    }

    fn literal<Q: Fn(&SqlValue) -> String>(value: &SqlValue, quote: &Q) -> String {
        if value.is_null() {
            "NULL".to_string()
        } else if value.is_empty_string() {
            "\"\"".to_string()
        } else {
            quote(value)
        }
    }
}
