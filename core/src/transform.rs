//! Column transformers: value replacement rules applied before a value is written

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::SqlValue;

/// Failure of a single transformer invocation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransformError(pub String);

/// Maps an original value to its masked replacement.
///
/// Implementations must be deterministic and may only look at the value itself.
pub trait Transformer: Send + Sync {
    fn transform(&self, value: &SqlValue) -> Result<SqlValue, TransformError>;
}

/// Replace every value with a fixed one
#[derive(Debug, Clone)]
pub struct Replace(pub SqlValue);

impl Transformer for Replace {
    fn transform(&self, _value: &SqlValue) -> Result<SqlValue, TransformError> {
        Ok(self.0.clone())
    }
}

/// Replace every character with a mask character, keeping the length
#[derive(Debug, Clone)]
pub struct Mask(pub char);

impl Transformer for Mask {
    fn transform(&self, value: &SqlValue) -> Result<SqlValue, TransformError> {
        let text = match value {
            SqlValue::Null => return Ok(SqlValue::Null),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::UInt(u) => u.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|_| TransformError("cannot mask a non UTF-8 binary value".to_string()))?,
        };
        Ok(SqlValue::Text(text.chars().map(|_| self.0).collect()))
    }
}

/// Replace every value with NULL
#[derive(Debug, Clone, Copy)]
pub struct Nullify;

impl Transformer for Nullify {
    fn transform(&self, _value: &SqlValue) -> Result<SqlValue, TransformError> {
        Ok(SqlValue::Null)
    }
}

/// Adapts a closure into a transformer
pub struct FnTransformer<F>(pub F);

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(&SqlValue) -> Result<SqlValue, TransformError> + Send + Sync,
{
    fn transform(&self, value: &SqlValue) -> Result<SqlValue, TransformError> {
        (self.0)(value)
    }
}

/// Shared handle to a transformer
pub type TransformerRef = Arc<dyn Transformer>;

/// Declarative column rule as written in a masking definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRule {
    Replace(String),
    Mask(String),
    Nullify,
    Empty,
}

impl ColumnRule {
    /// Build the transformer for this rule, rejecting rules that can never apply
    pub fn build(&self) -> Result<TransformerRef, String> {
        match self {
            ColumnRule::Replace(text) => Ok(Arc::new(Replace(SqlValue::Text(text.clone())))),
            ColumnRule::Mask(mask) => {
                let mut chars = mask.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Arc::new(Mask(c))),
                    _ => Err(format!(
                        "mask must be exactly one character, got {:?}",
                        mask
                    )),
                }
            }
            ColumnRule::Nullify => Ok(Arc::new(Nullify)),
            ColumnRule::Empty => Ok(Arc::new(Replace(SqlValue::Text(String::new())))),
        }
    }
}
