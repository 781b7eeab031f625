//! On-chain signal generator
//!
//! Runs the analyzer pipeline over block contexts and persists the resulting
//! signals for downstream publication.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use onchain_signals::cli::commands;
use onchain_signals::config::Config;

/// On-chain signal generator
#[derive(Parser)]
#[command(name = "signals")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the most recent blocks in a block file
    Run {
        /// JSON file with block contexts
        #[arg(short, long)]
        blocks: String,

        /// Only process the latest N blocks (default: all)
        #[arg(long)]
        latest: Option<usize>,

        /// Keep signals in memory instead of writing the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Replay a historical date range
    Backfill {
        /// JSON file with block contexts
        #[arg(short, long)]
        blocks: String,

        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: String,

        /// Last day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        end: String,

        /// Comma-separated signal types to generate (default: all enabled)
        #[arg(long)]
        types: Option<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,

        /// Keep signals in memory instead of writing the store
        #[arg(long)]
        dry_run: bool,
    },

    /// List unprocessed signals ranked for publication
    Pending {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Mark signals as processed
    Ack {
        /// Signal ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(json: bool) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "onchain_signals=info".parse() {
        filter = filter.add_directive(directive);
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    startup_checks(&config);

    let result = match cli.command {
        Commands::Run {
            blocks,
            latest,
            dry_run,
        } => commands::run(&config, &blocks, latest, dry_run, cli.json).await,
        Commands::Backfill {
            blocks,
            start,
            end,
            types,
            force,
            dry_run,
        } => {
            commands::backfill(&config, &blocks, &start, &end, types, force, dry_run, cli.json)
                .await
        }
        Commands::Pending { limit } => commands::pending(&config, limit, cli.json).await,
        Commands::Ack { ids } => commands::ack(&config, &ids).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Log the settings that change what reaches the store
fn startup_checks(config: &Config) {
    if !config.pipeline.quiet_mode_enabled {
        warn!("Quiet mode disabled - signals persist even under anomalous conditions");
    }

    info!(
        store = %config.store.path,
        max_retries = config.store.max_retries,
        timeout_ms = config.pipeline.analyzer_timeout_ms,
        "Startup checks passed"
    );
}
