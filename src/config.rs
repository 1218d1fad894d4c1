use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCfg {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletCfg {
    pub keypair: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineCfg {
    /// Start token of every cycle, native smallest units for amounts.
    pub start_token: String,
    pub amount_in: u64,
    pub min_profit: u64,
    pub max_hops: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: u64,
    #[serde(default = "default_validator_budget_ms")]
    pub validator_budget_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenuesCfg {
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolsCfg {
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramsCfg {
    pub swap_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionCfg {
    pub slippage_bps: u16,
    pub compute_unit_limit: u32,
    pub compute_unit_price_microlamports: u64,
    /// Optional bundle relay endpoint; direct RPC always races.
    pub bundle_relay_url: Option<String>,
    #[serde(default = "default_late_drain_ms")]
    pub late_drain_ms: u64,
    /// Simulate the composed transaction and stop short of submitting.
    #[serde(default)]
    pub simulate_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorCfg {
    pub enabled: bool,
    pub base_url: String,
    pub tolerance_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportCfg {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcCfg,
    pub wallet: WalletCfg,
    pub engine: EngineCfg,
    pub venues: VenuesCfg,
    pub pools: PoolsCfg,
    pub programs: ProgramsCfg,
    pub submission: SubmissionCfg,
    pub aggregator: AggregatorCfg,
    pub report: ReportCfg,
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    400
}

fn default_staleness_ms() -> u64 {
    5_000
}

fn default_validator_budget_ms() -> u64 {
    25
}

fn default_late_drain_ms() -> u64 {
    500
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())?;
        let cfg: Self = toml::from_str(&s).context("parse Config.toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.amount_in == 0 {
            bail!("engine.amount_in must be positive");
        }
        if !(2..=4).contains(&self.engine.max_hops) {
            bail!("engine.max_hops must be between 2 and 4");
        }
        if self.engine.workers == 0 {
            bail!("engine.workers must be at least 1");
        }
        if self.submission.slippage_bps > 1_000 {
            bail!("submission.slippage_bps above 1000 (10%) is not sane");
        }
        if self.pools.addresses.is_empty() {
            bail!("pools.addresses must not be empty");
        }
        if self.venues.enabled.is_empty() {
            bail!("venues.enabled must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[rpc]
url = "https://api.mainnet-beta.solana.com"

[wallet]
keypair = "/home/bot/keypair.json"

[engine]
start_token = "So11111111111111111111111111111111111111112"
amount_in = 10000000
min_profit = 50000
max_hops = 3

[venues]
enabled = ["raydium", "meteora", "phoenix"]

[pools]
addresses = ["58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2"]

[programs]
swap_agent = "Agent111111111111111111111111111111111111111"

[submission]
slippage_bps = 50
compute_unit_limit = 400000
compute_unit_price_microlamports = 1000

[aggregator]
enabled = true
base_url = "https://quote-api.jup.ag/v6"
tolerance_bps = 50

[report]
path = "submissions.jsonl"
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.engine.workers, 2);
        assert_eq!(cfg.engine.poll_interval_ms, 400);
        assert_eq!(cfg.engine.validator_budget_ms, 25);
        assert_eq!(cfg.submission.late_drain_ms, 500);
        assert!(cfg.submission.bundle_relay_url.is_none());
    }

    #[test]
    fn rejects_excessive_slippage() {
        let mut cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.submission.slippage_bps = 2_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_hop_bound() {
        let mut cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.engine.max_hops = 1;
        assert!(cfg.validate().is_err());
        cfg.engine.max_hops = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_pools() {
        let mut cfg: Config = toml::from_str(SAMPLE).unwrap();
        cfg.pools.addresses.clear();
        assert!(cfg.validate().is_err());
    }
}
