//! Reference pricing against an external aggregator
//!
//! A cross-check before submission: if the engine's own quote for the first
//! hop drifts too far from what the aggregator sees, the engine's view of
//! the pool is wrong and the opportunity must not be traded.

use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::shared::errors::EngineError;
use crate::shared::types::BPS_DENOMINATOR;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceQuote {
    pub in_amount: String,
    pub out_amount: String,
    #[serde(default)]
    pub price_impact_pct: Option<String>,
}

impl ReferenceQuote {
    pub fn out_amount(&self) -> Result<u64, EngineError> {
        self.out_amount
            .parse()
            .map_err(|_| EngineError::RejectedLocally(format!(
                "unparseable reference quote amount: {}",
                self.out_amount
            )))
    }
}

pub struct AggregatorClient {
    http: reqwest::Client,
    base_url: String,
    tolerance_bps: u32,
}

impl AggregatorClient {
    pub fn new(base_url: String, tolerance_bps: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            tolerance_bps,
        }
    }

    pub async fn fetch_quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount_in: u64,
    ) -> Result<ReferenceQuote, EngineError> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps=0",
            self.base_url, input_mint, output_mint, amount_in
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::RejectedLocally(format!("aggregator request: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| EngineError::RejectedLocally(format!("aggregator response: {e}")))
    }

    /// Compare the engine's quoted output with the aggregator's for the
    /// same swap. Deviation beyond the tolerance is a pricing mismatch,
    /// which is systemic and halts the trade.
    pub fn cross_check(&self, engine_out: u64, reference_out: u64) -> Result<(), EngineError> {
        let deviation = deviation_bps(engine_out, reference_out);
        debug!(engine_out, reference_out, deviation, "aggregator cross-check");
        if deviation > self.tolerance_bps {
            return Err(EngineError::PricingMismatch {
                engine_out,
                reference_out,
                deviation_bps: deviation,
            });
        }
        Ok(())
    }
}

fn deviation_bps(engine_out: u64, reference_out: u64) -> u32 {
    if reference_out == 0 {
        return u32::MAX;
    }
    let diff = engine_out.abs_diff(reference_out) as u128;
    (diff * BPS_DENOMINATOR as u128 / reference_out as u128).min(u32::MAX as u128) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(tolerance_bps: u32) -> AggregatorClient {
        AggregatorClient::new("http://localhost".to_string(), tolerance_bps)
    }

    #[test]
    fn matching_quotes_pass() {
        client(50).cross_check(1_000_000, 1_000_000).unwrap();
        // 30 bps off, inside a 50 bps tolerance.
        client(50).cross_check(1_003_000, 1_000_000).unwrap();
    }

    #[test]
    fn large_deviation_is_a_mismatch() {
        let err = client(50).cross_check(1_100_000, 1_000_000).unwrap_err();
        match err {
            EngineError::PricingMismatch {
                engine_out,
                reference_out,
                deviation_bps,
            } => {
                assert_eq!(engine_out, 1_100_000);
                assert_eq!(reference_out, 1_000_000);
                assert_eq!(deviation_bps, 1_000);
            }
            other => panic!("expected pricing mismatch, got {other}"),
        }
        assert!(client(50)
            .cross_check(1_100_000, 1_000_000)
            .unwrap_err()
            .is_systemic());
    }

    #[test]
    fn deviation_is_symmetric_enough() {
        // Engine under reference trips the same check.
        assert!(client(50).cross_check(900_000, 1_000_000).is_err());
    }

    #[test]
    fn zero_reference_never_passes() {
        assert!(client(10_000).cross_check(1, 0).is_err());
    }

    #[test]
    fn reference_quote_amounts_parse() {
        let quote: ReferenceQuote = serde_json::from_str(
            r#"{"inAmount":"1000000","outAmount":"1003000","priceImpactPct":"0.01"}"#,
        )
        .unwrap();
        assert_eq!(quote.out_amount().unwrap(), 1_003_000);
    }
}
