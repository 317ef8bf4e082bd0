use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use mediakeep_worker::commands;
use mediakeep_worker::config::WorkerConfig;
use mediakeep_worker::factory::build_engine;

/// Retention sweeper and maintenance tasks for mediakeep.
#[derive(Parser, Debug)]
#[command(name = "mediakeep-worker", about = "Media retention worker for mediakeep")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "mediakeep.toml")]
    config: PathBuf,

    /// Override the store backend (`memory` or `postgres`).
    #[arg(long)]
    store: Option<String>,

    /// Override the store connection URL.
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Purge every soft-deleted asset whose retention window has elapsed, then exit.
    Sweep {
        /// List what would be purged without deleting anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// List retention records that are due for purge.
    Pending,
    /// Report groups of active assets with identical content.
    Duplicates,
    /// Sweep on the configured interval until interrupted.
    Run {
        /// Override `[sweeper] interval_seconds`.
        #[arg(long)]
        interval_seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = WorkerConfig::load(&cli.config)?;
    if let Some(backend) = cli.store {
        config.store.backend = backend;
    }
    if let Some(url) = cli.database_url {
        config.store.url = Some(url);
    }
    if let Commands::Run {
        interval_seconds: Some(secs),
    } = cli.command
    {
        config.sweeper.interval_seconds = secs;
    }
    config.validate()?;

    info!(config = %cli.config.display(), "mediakeep-worker starting");
    let engine = build_engine(&config).await?;

    match cli.command {
        Commands::Sweep { dry_run } => {
            let output = commands::sweep(&engine, dry_run).await?;
            println!("{}", commands::render(&output)?);
        }
        Commands::Pending => {
            let pending = commands::pending(&engine).await?;
            println!("{}", commands::render(&pending)?);
        }
        Commands::Duplicates => {
            let report = commands::duplicates(&engine).await?;
            println!("{}", commands::render(&report)?);
        }
        Commands::Run { .. } => {
            commands::run(&engine, config.sweep_config(), shutdown_signal()).await?;
        }
    }

    info!("mediakeep-worker shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
