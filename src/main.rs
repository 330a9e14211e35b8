// src/main.rs
// query-output CLI

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use query_output::backend::SqliteBackend;
use query_output::{OutputConfig, OutputError, OutputOrchestrator, OutputRequest};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "query-output")]
#[command(about = "Run a query and return its result inline or as a CSV/JSON file")]
#[command(version)]
struct Cli {
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite::memory:", global = true)]
    database: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and route its output
    Run(RunArgs),

    /// Estimate the token size of a query result (advisory)
    Estimate {
        /// Query text
        query: String,
    },

    /// Validate and print the loaded configuration
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Query text
    query: String,

    /// auto, screen or file
    #[arg(long)]
    mode: Option<String>,

    /// csv or json
    #[arg(long)]
    format: Option<String>,

    /// Destination directory (relative paths need QUERY_OUTPUT_CLIENT_ROOT)
    #[arg(long)]
    location: Option<String>,

    /// Output file name (extension added if missing)
    #[arg(long)]
    filename: Option<String>,

    /// Rows fetched and written per batch
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(debug: bool) -> Result<()> {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn user_error(err: OutputError) -> anyhow::Error {
    anyhow::anyhow!(err.to_user_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = OutputConfig::from_env().map_err(user_error)?;
    init_tracing(config.debug_logging)?;
    for warning in config.validate().warnings {
        warn!(key = warning.key, "{}", warning.message);
    }
    let config = Arc::new(config);

    match cli.command {
        Commands::Config => {
            println!("{:#?}", config);
            println!("{}", config.validate().report());
        }
        Commands::Estimate { query } => {
            let backend = SqliteBackend::connect(&cli.database).await.map_err(user_error)?;
            let orchestrator = OutputOrchestrator::new(config);
            let estimate = orchestrator.estimate(&query, &backend).await.map_err(user_error)?;
            println!("{}", serde_json::to_string_pretty(&estimate)?);
        }
        Commands::Run(args) => {
            let backend = SqliteBackend::connect(&cli.database).await.map_err(user_error)?;
            let orchestrator = OutputOrchestrator::new(config);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, cancelling output");
                    on_signal.cancel();
                }
            });

            let request = OutputRequest {
                query: args.query,
                mode: args.mode,
                format: args.format,
                location: args.location,
                filename: args.filename,
                chunk_size: args.chunk_size,
            };
            let outcome = orchestrator
                .execute_with_cancel(request, &backend, cancel)
                .await
                .map_err(user_error)?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.summary());
            }
        }
    }

    Ok(())
}
