//! dagmem CLI - serve and inspect the DAG document store

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use dagmem::config::{self, DagmemConfig, Overrides, Settings};
use dagmem::document;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dagmem")]
#[command(version)]
#[command(about = "DAG document store - saves submitted DAGs to SQLite and a JSON export tree")]
#[command(long_about = r#"
dagmem accepts DAG documents (nodes, edges, metadata), assigns each a fresh
identifier and writes it both to a SQLite table and to <export-dir>/<id>.json.

Example usage:
  dagmem init
  dagmem serve --port 8000
  dagmem save --file pipeline.json
  dagmem stats
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (defaults to ./dagmem.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Store locations shared by every subcommand
#[derive(clap::Args)]
struct StoreArgs {
    /// Path to the database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Directory receiving <dag_id>.json exports
    #[arg(short, long)]
    export_dir: Option<PathBuf>,

    /// Reject duplicate node ids and edges to unknown nodes
    #[arg(long, overrides_with = "no_strict")]
    strict: bool,

    /// Accept any document even if the config enables strict mode
    #[arg(long, overrides_with = "strict")]
    no_strict: bool,
}

impl StoreArgs {
    fn strict_override(&self) -> Option<bool> {
        match (self.strict, self.no_strict) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        #[command(flatten)]
        store: StoreArgs,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Save a DAG document from a JSON file
    Save {
        /// JSON document to save
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show how many DAGs are stored
    Stats {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

fn resolve_settings(cli_config: Option<&PathBuf>, store: StoreArgs, host: Option<String>, port: Option<u16>) -> anyhow::Result<Settings> {
    let config = config::load_config(cli_config.map(PathBuf::as_path))?.unwrap_or_default();
    let strict = store.strict_override();
    Ok(config.resolve(Overrides {
        database: store.database,
        export_dir: store.export_dir,
        host,
        port,
        strict,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { store, host, port } => {
            let settings = resolve_settings(cli.config.as_ref(), store, host, port)?;
            dagmem::server::start_server(settings).await?;
        }

        Commands::Save { file, store } => {
            let settings = resolve_settings(cli.config.as_ref(), store, None, None)?;
            let raw = std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;

            let dag = document::parse(&raw)?;
            if settings.strict {
                dag.validate()?;
            }

            let persister = Arc::new(dagmem::server::open_persister(&settings)?);
            let dag_id = tokio::task::spawn_blocking(move || persister.persist(&dag)).await??;

            println!("✅ Saved '{}' as {}", file.display(), dag_id);
            println!("   Export: {}", settings.export_dir.join(format!("{dag_id}.json")).display());
        }

        Commands::Stats { store } => {
            let settings = resolve_settings(cli.config.as_ref(), store, None, None)?;
            let stats = dagmem::stats::collect(&settings)?;

            println!("📊 dagmem Statistics");
            println!("------------------------------------");
            println!("  Database: {} ({} DAGs)", settings.database.display(), stats.rows);
            println!("  Exports:  {} ({} files)", settings.export_dir.display(), stats.exports);
            if !stats.is_consistent() {
                tracing::warn!("Row count ({}) and export count ({}) differ", stats.rows, stats.exports);
            }
        }

        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            config::write_config(&path, &DagmemConfig::with_defaults(), force)?;
            println!("📝 Wrote {}", path.display());
        }
    }

    Ok(())
}
