//! CLI configuration

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use masked_dump_core::engine::{DEFAULT_BATCH_SIZE, DEFAULT_ROWS_PER_INSERT};
use masked_dump_core::{DumpOptions, InsertStyle};
use sqlx::mysql::MySqlConnectOptions;

/// Connection and engine settings read from the environment
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Full connection URL, takes precedence over the individual parts
    pub database_url: Option<String>,
    pub db_host: String,
    pub db_port: u16,
    pub db_database: Option<String>,
    pub db_username: String,
    pub db_password: Option<String>,
    /// Rows per chunk
    pub batch_size: u64,
    pub insert_style: InsertStyle,
    /// Rows per combined INSERT, 0 for one statement per table
    pub rows_per_insert: u64,
    /// Export DDL with mysqldump when the server and binary allow it
    pub use_mysqldump: bool,
    pub mysqldump_path: String,
    /// Hold a READ lock on each source table while it is read
    pub lock_source: bool,
}

impl CliConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let insert_style = match var("MASKED_DUMP_INSERT_STYLE") {
            Some(style) => style
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid MASKED_DUMP_INSERT_STYLE")?,
            None => InsertStyle::default(),
        };

        let batch_size: u64 = var("MASKED_DUMP_BATCH_SIZE")
            .unwrap_or_else(|| DEFAULT_BATCH_SIZE.to_string())
            .parse()
            .context("Invalid MASKED_DUMP_BATCH_SIZE")?;
        if batch_size == 0 {
            bail!("MASKED_DUMP_BATCH_SIZE must be at least 1");
        }

        let rows_per_insert: u64 = var("MASKED_DUMP_ROWS_PER_INSERT")
            .unwrap_or_else(|| DEFAULT_ROWS_PER_INSERT.to_string())
            .parse()
            .context("Invalid MASKED_DUMP_ROWS_PER_INSERT")?;

        Ok(Self {
            database_url: var("DATABASE_URL").filter(|url| !url.is_empty()),
            db_host: var("DB_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            db_port: var("DB_PORT")
                .unwrap_or_else(|| "3306".to_string())
                .parse()
                .context("Invalid DB_PORT")?,
            db_database: var("DB_DATABASE"),
            db_username: var("DB_USERNAME").unwrap_or_else(|| "root".to_string()),
            db_password: var("DB_PASSWORD").filter(|p| !p.is_empty()),
            batch_size,
            insert_style,
            rows_per_insert,
            use_mysqldump: parse_flag(var("USE_MYSQLDUMP"), true).context("Invalid USE_MYSQLDUMP")?,
            mysqldump_path: var("MYSQLDUMP_PATH").unwrap_or_else(|| "mysqldump".to_string()),
            lock_source: parse_flag(var("MASKED_DUMP_LOCK_SOURCE"), false)
                .context("Invalid MASKED_DUMP_LOCK_SOURCE")?,
        })
    }

    /// Connect options for the source database
    pub fn connect_options(&self) -> Result<MySqlConnectOptions> {
        if let Some(ref url) = self.database_url {
            return MySqlConnectOptions::from_str(url).context("Invalid DATABASE_URL");
        }
        let database = self
            .db_database
            .as_deref()
            .context("DATABASE_URL or DB_DATABASE is required")?;

        let mut options = MySqlConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .database(database)
            .username(&self.db_username);
        if let Some(ref password) = self.db_password {
            options = options.password(password);
        }
        Ok(options)
    }

    /// Whether the individual connection parts describe the source.
    ///
    /// mysqldump is handed those parts, so it is only usable when no URL
    /// overrides them.
    pub fn has_connection_parts(&self) -> bool {
        self.database_url.is_none()
    }

    pub fn dump_options(&self) -> DumpOptions {
        DumpOptions {
            batch_size: self.batch_size,
            insert_style: self.insert_style,
            rows_per_insert: self.rows_per_insert,
            lock_source: self.lock_source,
        }
    }
}

fn parse_flag(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("") => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => bail!("expected a boolean, got '{}'", other),
    }
}
