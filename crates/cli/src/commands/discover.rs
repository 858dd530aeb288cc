//! CLI command that resolves the current window's Up/Down markets.

use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use updown_arb_core::{ConfigLoader, DEFAULT_CONFIG_PATH};
use updown_arb_polymarket::GammaClient;

/// Arguments for the discover command.
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Config file path.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Symbols to resolve, comma separated (overrides the config file).
    #[arg(long, value_delimiter = ',')]
    pub symbols: Option<Vec<String>>,

    /// Resolve the window this many windows ahead (0 = current).
    #[arg(long, default_value = "0")]
    pub ahead: u32,

    /// Print the resolved markets as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Resolves and prints markets for each configured symbol.
pub async fn run_discover(args: DiscoverArgs) -> Result<()> {
    let config = ConfigLoader::load_from(&args.config)?;
    let symbols: Vec<String> = args
        .symbols
        .unwrap_or(config.symbols)
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    let at = Utc::now() + Duration::minutes(15 * i64::from(args.ahead));
    let gamma = GammaClient::new().with_base_url(config.feed.gamma_url.clone());
    let markets = gamma.find_markets(&symbols, at).await;

    if markets.is_empty() {
        bail!("no markets resolved for {}", symbols.join(","));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&markets)?);
        return Ok(());
    }

    for market in &markets {
        info!(
            symbol = %market.symbol,
            slug = %market.slug,
            condition_id = %market.condition_id,
            up_token = %market.up_token_id,
            down_token = %market.down_token_id,
            window_start = %market.window_start,
            window_end = %market.window_end(),
            "Market"
        );
    }
    Ok(())
}
