mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::AnalyticsView;
use promocast::analytics::DEFAULT_TOP_LIMIT;
use promocast::ledger::DEFAULT_HISTORY_LIMIT;

#[derive(Parser)]
#[command(
    name = "promocast",
    version,
    about = "Scheduled multi-platform promotional content distribution",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trigger, insights and housekeeping loops until Ctrl-C
    Run {
        /// Also serve the read API
        #[arg(long)]
        serve: bool,
    },

    /// Run one schedule's cycle now
    Tick {
        /// Schedule name
        #[arg(short, long)]
        schedule: String,
    },

    /// Show recent delivery attempts
    History {
        /// Number of rows to show
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },

    /// Show pool, ledger and schedule statistics
    Stats,

    /// Show engagement analytics
    Analytics {
        #[arg(value_enum)]
        view: AnalyticsView,

        /// Number of entries for top-N views
        #[arg(short, long, default_value_t = DEFAULT_TOP_LIMIT)]
        limit: usize,
    },

    /// Import content items and images from a TOML seed file
    Import {
        /// Seed file path
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Run { serve } => {
            tracing::info!(serve = %serve, "Starting run command");
            commands::run(config, serve).await?;
        }

        Commands::Tick { schedule } => {
            tracing::info!(schedule = %schedule, "Starting tick command");
            commands::tick(config, &schedule).await?;
        }

        Commands::History { limit } => {
            commands::history(config, limit).await?;
        }

        Commands::Stats => {
            commands::stats(config).await?;
        }

        Commands::Analytics { view, limit } => {
            commands::analytics(config, view, limit).await?;
        }

        Commands::Import { file } => {
            tracing::info!(file = %file.display(), "Starting import command");
            commands::import(config, &file).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("promocast=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("promocast=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
