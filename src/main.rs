use anyhow::Result;
use clap::Parser;

use swapcycle::app;
use swapcycle::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Cross-DEX cycle arbitrage engine for Solana")]
struct Args {
    /// Path to config file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// RPC endpoint URL (overrides config)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Trade size in native units of the start token (overrides config)
    #[arg(long)]
    amount_in: Option<u64>,

    /// Minimum profit in native units of the start token (overrides config)
    #[arg(long)]
    min_profit: Option<u64>,

    /// Slippage tolerance in basis points (overrides config)
    #[arg(long)]
    slippage_bps: Option<u16>,

    /// Only simulate composed transactions without submitting
    #[arg(long)]
    simulate_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut cfg = Config::from_file(&args.config)?;
    if let Some(rpc_url) = args.rpc_url {
        cfg.rpc.url = rpc_url;
    }
    if let Some(amount_in) = args.amount_in {
        cfg.engine.amount_in = amount_in;
    }
    if let Some(min_profit) = args.min_profit {
        cfg.engine.min_profit = min_profit;
    }
    if let Some(slippage_bps) = args.slippage_bps {
        cfg.submission.slippage_bps = slippage_bps;
    }
    if args.simulate_only {
        cfg.submission.simulate_only = true;
    }
    cfg.validate()?;

    app::run(cfg).await
}
