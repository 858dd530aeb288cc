use clap::{Parser, Subcommand};

mod commands;

use commands::{DiscoverArgs, MonitorArgs};
use updown_arb_core::{ConfigLoader, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "updown-arb")]
#[command(about = "Parity arbitrage for Polymarket 15-minute Up/Down markets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the market feed and one parity monitor per symbol
    Monitor(MonitorArgs),
    /// Resolve the current window's Up/Down markets
    Discover(DiscoverArgs),
    /// Print the resolved configuration and exit
    ShowConfig {
        /// Config file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Monitor(MonitorArgs {
            log_file: Some(path),
            ..
        }) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(env_filter()).init();
        }
    }

    match cli.command {
        Commands::Monitor(args) => commands::run_monitor(args).await?,
        Commands::Discover(args) => commands::run_discover(args).await?,
        Commands::ShowConfig { config } => {
            let config = ConfigLoader::load_from(&config)?;
            for monitor in config.monitor_configs() {
                println!("{monitor:#?}");
            }
            println!("{:#?}", config.quiet_window);
            println!("{:#?}", config.execution);
            println!("{:#?}", config.feed);
        }
    }

    Ok(())
}
