// AMPL Ladder Manager - CLI
// Drives the ladder reconciler on demand or on a fixed interval

use std::path::Path;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ampl_ladder::{LadderConfig, LadderError};

#[path = "../cli/ladder_commands.rs"]
mod ladder_commands;

#[derive(Parser)]
#[command(name = "ampl-ladder")]
#[command(version)]
#[command(about = "Laddered AMPL buy orders with rebase-protected sells", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "ladder.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Detect existing ladder orders on the exchange
    Detect,

    /// Place buy orders for missing ladder levels
    Reconcile,

    /// Check tracked buys for fills and place protected sells
    Monitor,

    /// Show ladder, balance and order health
    Status,

    /// Enable the ladder (places the full ladder if none exists)
    Enable,

    /// Disable the ladder and cancel its buy orders
    Disable,

    /// Reconcile and monitor on the configured interval until Ctrl-C
    Run {
        /// Enable the ladder if detection did not find it running
        #[arg(long)]
        enable: bool,
    },

    /// Run the ladder against a simulated paper exchange
    Simulate {
        /// Number of price ticks
        #[arg(short, long, default_value = "200")]
        ticks: usize,

        /// RNG seed for the random walk
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Maximum fractional price move per tick
        #[arg(long, default_value = "0.01")]
        volatility: f64,

        /// Apply a random rebase every N ticks (0 disables)
        #[arg(long, default_value = "24")]
        rebase_every: usize,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        init_logging(if cli.verbose { "debug" } else { "info" });
        return init_config(&cli.config, force).map_err(Into::into);
    }

    // Load config before logging so its log level applies; report errors after
    let loaded = LadderConfig::from_file(&cli.config);
    let level = match (&loaded, cli.verbose) {
        (_, true) => "debug".to_string(),
        (Ok(config), false) => config.monitoring.log_level.clone(),
        (Err(_), false) => "info".to_string(),
    };
    init_logging(&level);

    info!("🚀 AMPL Ladder v{}", env!("CARGO_PKG_VERSION"));
    info!("📁 Config: {}", cli.config);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            let err = if Path::new(&cli.config).exists() {
                LadderError::from(e)
            } else {
                LadderError::ConfigNotFound(cli.config.clone())
            };
            error!("❌ {}", err.user_message());
            return Err(err.into());
        }
    };

    let result = match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Detect => ladder_commands::detect(&config).await,
        Commands::Reconcile => ladder_commands::reconcile(&config).await,
        Commands::Monitor => ladder_commands::monitor(&config).await,
        Commands::Status => ladder_commands::status(&config).await,
        Commands::Enable => ladder_commands::toggle(&config, true).await,
        Commands::Disable => ladder_commands::toggle(&config, false).await,
        Commands::Run { enable } => ladder_commands::run(&config, enable).await,
        Commands::Simulate { ticks, seed, volatility, rebase_every } => {
            ladder_commands::simulate(&config, ticks, seed, volatility, rebase_every).await
        }
    };

    if let Err(e) = result {
        error!("❌ {}", e.user_message());
        return Err(e.into());
    }

    Ok(())
}

fn init_config(path: &str, force: bool) -> Result<(), LadderError> {
    if Path::new(path).exists() && !force {
        info!("📁 {} already exists (use --force to overwrite)", path);
        return Ok(());
    }

    LadderConfig::default().to_file(path)?;
    info!("📁 Wrote default config to {}", path);
    info!("💡 Set exchange.kind = \"kucoin\" and export KUCOIN_API_KEY / KUCOIN_API_SECRET / KUCOIN_API_PASSPHRASE for live trading");
    Ok(())
}
