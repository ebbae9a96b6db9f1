mod detect;
mod load;
mod pipeline;
mod stats;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::detect::DetectCommands;
use crate::load::LoadCommands;
use crate::pipeline::PipelineCommands;

#[derive(Debug, Parser)]
#[command(name = "medwh")]
#[command(about = "Telegram medical warehouse pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database connectivity and schema management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run the full pipeline once or on its schedule
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Run a single loader against the raw tables
    Load {
        #[command(subcommand)]
        command: LoadCommands,
    },
    /// Work with detector output without touching the database
    Detect {
        #[command(subcommand)]
        command: DetectCommands,
    },
    /// Print raw table statistics
    Stats,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Verify the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = medwh_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Db { command } => {
            let pool = connect(&config).await?;
            match command {
                DbCommands::Ping => {
                    medwh_db::health_check(&pool).await?;
                    println!("database ok");
                }
                DbCommands::Migrate => {
                    let applied = medwh_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
            }
        }
        Commands::Pipeline { command } => pipeline::run(command, &config).await?,
        Commands::Load { command } => load::run(command, &config).await?,
        Commands::Detect { command } => detect::run(command, &config)?,
        Commands::Stats => {
            let pool = connect(&config).await?;
            stats::run_stats(&pool).await?;
        }
    }

    Ok(())
}

pub(crate) async fn connect(config: &medwh_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = medwh_db::PoolConfig::from_app_config(config);
    let pool = medwh_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}

pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping scheduler");
}
