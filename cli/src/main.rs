//! Masked Dump CLI
//!
//! Writes a SQL dump of a MySQL database with the columns named in a
//! masking definition replaced on the way out.

mod config;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use masked_dump_core::adapter::MySqlAdapter;
use masked_dump_core::definition::{DumpDefinitions, DEFAULT_DEFINITION};
use masked_dump_core::schema_export::MysqldumpExporter;
use masked_dump_core::{DumpEngine, DumpSchema, ProgressObserver};

use crate::config::CliConfig;
use crate::output::StagedOutput;

#[derive(Parser, Debug)]
#[command(name = "masked-dump")]
#[command(about = "Write a masked SQL dump of a MySQL database")]
#[command(version)]
struct Cli {
    /// Path of the dump file to write
    output: PathBuf,

    /// Masking definition to apply
    #[arg(long, default_value = DEFAULT_DEFINITION)]
    definition: String,

    /// File holding the masking definitions
    #[arg(long, env = "MASKED_DUMP_CONFIG", default_value = "masked-dump.toml")]
    config: PathBuf,

    /// Compress the dump with gzip (adds a .gz suffix)
    #[arg(long)]
    gzip: bool,
}

/// Logs one line per finished table
struct LogProgress;

impl ProgressObserver for LogProgress {
    fn table_dumped(&self, table: &str, completed: usize, total: usize) {
        info!("[{}/{}] {}", completed, total, table);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,masked_dump_core=info,masked_dump_cli=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = CliConfig::from_env()?;

    if let Err(e) = run(cli, config).await {
        error!("Masked dump failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli, config: CliConfig) -> Result<()> {
    let definitions = DumpDefinitions::from_file(&cli.config)
        .with_context(|| format!("Failed to load masking definitions from {}", cli.config.display()))?;
    let definition = definitions.get(&cli.definition)?;

    let adapter = Arc::new(MySqlAdapter::connect(config.connect_options()?).await?);
    let schema = DumpSchema::load(adapter, definition).await?;

    let mut engine = DumpEngine::new(&schema, config.dump_options()).with_observer(Arc::new(LogProgress));
    if let Some(exporter) = native_exporter(&config, &schema).await {
        engine = engine.with_schema_exporter(Arc::new(exporter));
    }

    let mut output = StagedOutput::create(&cli.output, cli.gzip)?;
    info!(
        "Dumping {} with definition '{}' to {}",
        schema.database().name,
        cli.definition,
        output.target().display()
    );

    // On failure the staging file is dropped and removed
    engine.dump(output.sink()).await?;
    let path = output.commit()?;

    info!("Wrote masked dump to {}", path.display());
    Ok(())
}

/// mysqldump exporter for the source, when it can be used
async fn native_exporter(config: &CliConfig, schema: &DumpSchema) -> Option<MysqldumpExporter> {
    if !config.use_mysqldump {
        return None;
    }

    let database = schema.database();
    if !database.platform.supports_mysqldump() {
        info!("{} server, rendering DDL per table", database.platform);
        return None;
    }
    if !config.has_connection_parts() {
        info!("DATABASE_URL is set, rendering DDL per table");
        return None;
    }

    let exporter = MysqldumpExporter::new(
        &config.mysqldump_path,
        config.db_host.clone(),
        config.db_port,
        config.db_username.clone(),
        config.db_password.clone(),
        database.name.clone(),
    );
    if exporter.probe().await {
        Some(exporter)
    } else {
        warn!(
            "{} is not available, rendering DDL per table",
            config.mysqldump_path
        );
        None
    }
}
