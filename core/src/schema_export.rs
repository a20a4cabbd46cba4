//! Whole-database DDL export through a native dump utility
//!
//! The native path is an optimisation: any failure here is reported as
//! `DumpError::SchemaExport` and the engine falls back to per-table DDL from
//! the introspector.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{DumpError, Result};

/// Produces CREATE TABLE statements for many tables at once
#[async_trait]
pub trait SchemaExporter: Send + Sync {
    /// DDL for the given tables as one text blob
    async fn export_schema(&self, tables: &[String]) -> Result<String>;
}

/// Credentials handed to `mysqldump`
#[derive(Debug, Clone)]
pub struct MysqldumpExporter {
    binary: PathBuf,
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    database: String,
}

impl MysqldumpExporter {
    pub fn new(
        binary: impl Into<PathBuf>,
        host: String,
        port: u16,
        user: String,
        password: Option<String>,
        database: String,
    ) -> Self {
        Self {
            binary: binary.into(),
            host,
            port,
            user,
            password,
            database,
        }
    }

    /// Check that the binary can be executed
    pub async fn probe(&self) -> bool {
        match Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                debug!(
                    "Found {}",
                    String::from_utf8_lossy(&output.stdout).trim()
                );
                true
            }
            _ => false,
        }
    }

    fn args(&self, tables: &[String]) -> Vec<String> {
        let mut args = vec![
            format!("--host={}", self.host),
            format!("--port={}", self.port),
            format!("--user={}", self.user),
            "--no-data".to_string(),
            "--skip-lock-tables".to_string(),
            "--skip-comments".to_string(),
            self.database.clone(),
        ];
        args.extend(tables.iter().cloned());
        args
    }
}

#[async_trait]
impl SchemaExporter for MysqldumpExporter {
    async fn export_schema(&self, tables: &[String]) -> Result<String> {
        info!(
            "Exporting schema of {} tables with {}",
            tables.len(),
            self.binary.display()
        );

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args(tables))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Keeps the password off the process list
        if let Some(ref password) = self.password {
            cmd.env("MYSQL_PWD", password);
        }

        let output = cmd.output().await.map_err(|e| {
            DumpError::SchemaExport(format!(
                "failed to execute {}: {}",
                self.binary.display(),
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DumpError::SchemaExport(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| DumpError::SchemaExport(format!("output is not valid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exporter(binary: &str) -> MysqldumpExporter {
        MysqldumpExporter::new(
            binary,
            "db.internal".to_string(),
            3306,
            "dumper".to_string(),
            Some("secret".to_string()),
            "app".to_string(),
        )
    }

    #[test]
    fn test_args_never_contain_password() {
        let args = exporter("mysqldump").args(&["users".to_string(), "orders".to_string()]);

        assert!(args.contains(&"--no-data".to_string()));
        assert!(args.contains(&"--host=db.internal".to_string()));
        assert!(!args.iter().any(|a| a.contains("secret")));
        assert_eq!(&args[args.len() - 3..], &["app", "users", "orders"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_schema_export_error() {
        let exporter = exporter("/nonexistent/bin/mysqldump");
        assert!(!exporter.probe().await);

        let err = exporter.export_schema(&["users".to_string()]).await.unwrap_err();
        assert!(matches!(err, DumpError::SchemaExport(_)));
        assert!(!err.is_fatal_for_run());
    }
}
