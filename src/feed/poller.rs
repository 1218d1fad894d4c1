//! RPC polling source that pushes pool updates into the graph channel
//!
//! One batched `getMultipleAccounts` read per tick keeps all pool states on
//! a single response slot, so every update carries a consistent read.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::{AdapterRegistry, PoolUpdate};
use crate::shared::errors::FeedError;

/// Consecutive failed ticks before the poller pauses.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const FAILURE_PAUSE: Duration = Duration::from_secs(30);

pub struct FeedPoller {
    rpc: Arc<RpcClient>,
    registry: Arc<AdapterRegistry>,
    pools: Vec<Pubkey>,
    interval: Duration,
    updates: mpsc::Sender<PoolUpdate>,
}

impl FeedPoller {
    pub fn new(
        rpc: Arc<RpcClient>,
        registry: Arc<AdapterRegistry>,
        pools: Vec<Pubkey>,
        interval: Duration,
        updates: mpsc::Sender<PoolUpdate>,
    ) -> Self {
        Self {
            rpc,
            registry,
            pools,
            interval,
            updates,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            pools = self.pools.len(),
            interval_ms = self.interval.as_millis() as u64,
            "feed poller started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("feed poller stopping");
                    return;
                }
            }

            match self.poll_once().await {
                Ok(sent) => {
                    consecutive_failures = 0;
                    debug!(updates = sent, "feed tick complete");
                }
                Err(FeedError::Rpc(reason)) => {
                    consecutive_failures += 1;
                    warn!(consecutive_failures, %reason, "feed tick failed");
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        error!("too many consecutive feed failures, pausing");
                        tokio::time::sleep(FAILURE_PAUSE).await;
                        consecutive_failures = 0;
                    } else {
                        tokio::time::sleep(backoff(consecutive_failures)).await;
                    }
                }
                Err(other) => {
                    warn!(error = %other, "feed tick failed");
                }
            }

            if self.updates.is_closed() {
                info!("update channel closed, feed poller stopping");
                return;
            }
        }
    }

    /// One batched read of every tracked pool account.
    async fn poll_once(&self) -> Result<usize, FeedError> {
        let response = self
            .rpc
            .get_multiple_accounts_with_commitment(&self.pools, CommitmentConfig::confirmed())
            .await
            .map_err(|e| FeedError::Rpc(e.to_string()))?;
        let slot = response.context.slot;

        let mut sent = 0usize;
        for (address, maybe_account) in self.pools.iter().zip(response.value) {
            let Some(account) = maybe_account else {
                warn!(pool = %address, "pool account missing");
                continue;
            };
            match self.registry.decode_account(address, &account, slot) {
                Ok(update) => {
                    if self.updates.send(update).await.is_err() {
                        return Ok(sent);
                    }
                    sent += 1;
                }
                Err(err) => warn!(pool = %address, error = %err, "skipping undecodable pool"),
            }
        }
        Ok(sent)
    }
}

/// Exponential backoff with jitter, capped at the failure pause.
fn backoff(consecutive_failures: u32) -> Duration {
    let base = Duration::from_secs(1 << consecutive_failures.min(5));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
    (base + jitter).min(FAILURE_PAUSE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert!(backoff(1) >= Duration::from_secs(2));
        assert!(backoff(2) >= Duration::from_secs(4));
        assert!(backoff(10) <= FAILURE_PAUSE);
    }
}
