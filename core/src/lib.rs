//! Masked Dump Core Library
//!
//! Streams a MySQL database into a SQL dump with sensitive columns
//! replaced on the way out. Contains the schema model, database adapters,
//! column transformers and the dump engine.

pub mod adapter;
pub mod definition;
pub mod domain;
pub mod engine;
pub mod error;
pub mod query;
pub mod schema;
pub mod schema_export;
pub mod serializer;
pub mod sink;
pub mod sql_gen;
pub mod table;
pub mod transform;

#[cfg(test)]
mod fixtures;

pub use engine::{DumpEngine, DumpOptions, DumpProgress, InsertStyle, ProgressObserver};
pub use error::{DumpError, Result};
pub use schema::DumpSchema;
