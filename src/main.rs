//! dexroute CLI
//!
//! One-shot quote tool: loads the chain config, asks the engine for the
//! best route and prints the winning quote as JSON.

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dexroute::{QuotePreference, RouterConfig, RouterEngine};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dexroute", about = "DEX aggregator routing engine")]
struct Cli {
    /// Path to the chains/engine TOML configuration
    #[arg(long, env = "DEXROUTE_CONFIG", default_value = "dexroute.toml")]
    config: PathBuf,

    /// Chain key from the configuration ("polygon", "base", ...)
    #[arg(long)]
    chain: String,

    /// Input token address (0xEe...Ee for the native coin)
    #[arg(long)]
    token_in: Address,

    /// Output token address
    #[arg(long)]
    token_out: Address,

    /// Input amount in the token's smallest unit (decimal)
    #[arg(long)]
    amount_in: String,

    #[arg(long, value_enum, default_value = "auto")]
    preference: Preference,

    /// Skip the direct pass and route only through intermediates
    #[arg(long)]
    force_multi_hop: bool,

    /// Allow splitting the input across parallel routes
    #[arg(long)]
    split: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preference {
    Auto,
    V2,
    V3,
}

impl From<Preference> for QuotePreference {
    fn from(value: Preference) -> Self {
        match value {
            Preference::Auto => QuotePreference::Auto,
            Preference::V2 => QuotePreference::V2,
            Preference::V3 => QuotePreference::V3,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = RouterConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let engine = RouterEngine::new(config)?;

    let amount_in =
        U256::from_str_radix(&cli.amount_in, 10).context("amount-in must be a decimal integer")?;

    let quote = engine
        .get_best_quote(
            &cli.chain,
            cli.token_in,
            cli.token_out,
            amount_in,
            cli.preference.into(),
            cli.force_multi_hop,
            cli.split,
        )
        .await?;

    match quote {
        Some(quote) => println!("{}", serde_json::to_string_pretty(&quote)?),
        None => println!("null"),
    }
    Ok(())
}
